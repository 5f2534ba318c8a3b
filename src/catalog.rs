//! Harmonic pattern catalog
//!
//! A catalog is a static table of named pattern definitions. Each definition
//! carries a direction, a family (ABCD or XABCD) and one percentage range per
//! ratio leg of that family. Catalogs are built once and shared by reference
//! (usually behind an `Arc`) across every detection run.
//!
//! # Example
//!
//! ```rust
//! use yahpd::catalog::{Leg, PatternCatalog};
//! use yahpd::{Direction, PatternType};
//!
//! let catalog = PatternCatalog::builtin();
//! for def in catalog.definitions(PatternType::Abcd, Direction::Bullish) {
//!   let bc = def.range(Leg::BcRetracement).unwrap();
//!   println!("{}: retracement {}..{}", def.name(), bc.min(), bc.max());
//! }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Direction, PatternError, PatternType, Result};

// ============================================================
// LEGS
// ============================================================

/// Named ratio leg of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
  /// ABCD: BC as a percentage of AB
  BcRetracement,
  /// ABCD: CD as a percentage of BC
  CdProjection,
  /// XABCD: AB as a percentage of XA
  AbXa,
  /// XABCD: BC as a percentage of AB
  BcAb,
  /// XABCD: CD as a percentage of BC
  CdBc,
  /// XABCD: AD as a percentage of XA
  AdXa,
}

impl Leg {
  pub const COUNT: usize = 6;

  #[inline]
  const fn slot(self) -> usize {
    self as usize
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Leg::BcRetracement => "bc_retracement",
      Leg::CdProjection => "cd_projection",
      Leg::AbXa => "ab_xa",
      Leg::BcAb => "bc_ab",
      Leg::CdBc => "cd_bc",
      Leg::AdXa => "ad_xa",
    }
  }
}

// ============================================================
// RATIO RANGE
// ============================================================

/// Inclusive percentage band `[min, max]` for one leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioRange {
  min: f64,
  max: f64,
}

impl RatioRange {
  /// Create a range, validating `0 <= min <= max` and finiteness
  pub fn new(min: f64, max: f64) -> Result<Self> {
    if !min.is_finite() || !max.is_finite() {
      return Err(PatternError::InvalidValue("RatioRange bounds must be finite"));
    }
    if min < 0.0 {
      return Err(PatternError::OutOfRange { field: "RatioRange.min", value: min, min: 0.0, max });
    }
    if min > max {
      return Err(PatternError::OutOfRange {
        field: "RatioRange.max",
        value: max,
        min,
        max: f64::INFINITY,
      });
    }
    Ok(Self { min, max })
  }

  /// Library internal constant constructor
  #[doc(hidden)]
  pub const fn new_const(min: f64, max: f64) -> Self {
    Self { min, max }
  }

  /// Symmetric band around `center`
  pub fn around(center: f64, band: f64) -> Result<Self> {
    Self::new(center - band, center + band)
  }

  #[inline]
  pub fn min(self) -> f64 {
    self.min
  }

  #[inline]
  pub fn max(self) -> f64 {
    self.max
  }

  #[inline]
  pub fn mid(self) -> f64 {
    (self.min + self.max) / 2.0
  }

  #[inline]
  pub fn contains(self, value: f64) -> bool {
    value >= self.min && value <= self.max
  }

  #[inline]
  pub fn clamp(self, value: f64) -> f64 {
    value.clamp(self.min, self.max)
  }
}

impl Serialize for RatioRange {
  fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
    (self.min, self.max).serialize(s)
  }
}

impl<'de> Deserialize<'de> for RatioRange {
  fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
    let (min, max) = <(f64, f64)>::deserialize(d)?;
    RatioRange::new(min, max).map_err(serde::de::Error::custom)
  }
}

// ============================================================
// PATTERN DEFINITION
// ============================================================

/// One named catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DefinitionRecord", into = "DefinitionRecord")]
pub struct PatternDefinition {
  name: String,
  direction: Direction,
  family: PatternType,
  ranges: [Option<RatioRange>; Leg::COUNT],
}

/// Serialized form of a definition: ranges keyed by leg name
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefinitionRecord {
  name: String,
  direction: Direction,
  family: PatternType,
  ratios: BTreeMap<Leg, RatioRange>,
}

impl PatternDefinition {
  /// Create a definition. The leg set must be exactly the legs of `family`.
  pub fn new(
    name: impl Into<String>,
    direction: Direction,
    family: PatternType,
    ratios: impl IntoIterator<Item = (Leg, RatioRange)>,
  ) -> Result<Self> {
    let name = name.into();
    if name.trim().is_empty() {
      return Err(PatternError::InvalidCatalog { name, reason: "empty pattern name" });
    }

    let mut ranges = [None; Leg::COUNT];
    for (leg, range) in ratios {
      if !family.legs().contains(&leg) {
        return Err(PatternError::InvalidCatalog { name, reason: "leg not used by family" });
      }
      if ranges[leg.slot()].replace(range).is_some() {
        return Err(PatternError::InvalidCatalog { name, reason: "duplicate leg" });
      }
    }
    if family.legs().iter().any(|leg| ranges[leg.slot()].is_none()) {
      return Err(PatternError::InvalidCatalog { name, reason: "missing leg range" });
    }

    Ok(Self { name, direction, family, ranges })
  }

  fn from_parts(
    name: String,
    direction: Direction,
    family: PatternType,
    ratios: &[(Leg, RatioRange)],
  ) -> Self {
    let mut ranges = [None; Leg::COUNT];
    for &(leg, range) in ratios {
      ranges[leg.slot()] = Some(range);
    }
    Self { name, direction, family, ranges }
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[inline]
  pub fn direction(&self) -> Direction {
    self.direction
  }

  #[inline]
  pub fn family(&self) -> PatternType {
    self.family
  }

  #[inline]
  pub fn range(&self, leg: Leg) -> Option<RatioRange> {
    self.ranges[leg.slot()]
  }

  /// True when `value` lies inside this entry's range for `leg`.
  /// A leg the entry does not carry never admits anything.
  #[inline]
  pub fn admits(&self, leg: Leg, value: f64) -> bool {
    self.ranges[leg.slot()].is_some_and(|r| r.contains(value))
  }
}

impl TryFrom<DefinitionRecord> for PatternDefinition {
  type Error = PatternError;

  fn try_from(record: DefinitionRecord) -> Result<Self> {
    PatternDefinition::new(record.name, record.direction, record.family, record.ratios)
  }
}

impl From<PatternDefinition> for DefinitionRecord {
  fn from(def: PatternDefinition) -> Self {
    let ratios = def
      .family
      .legs()
      .iter()
      .filter_map(|&leg| def.range(leg).map(|r| (leg, r)))
      .collect();
    Self { name: def.name, direction: def.direction, family: def.family, ratios }
  }
}

// ============================================================
// CATALOG
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
  patterns: Vec<PatternDefinition>,
}

/// Immutable catalog indexed by (family, direction)
#[derive(Debug, Clone)]
pub struct PatternCatalog {
  entries: Vec<PatternDefinition>,
  index: [Vec<usize>; 4],
}

#[inline]
fn bucket(family: PatternType, direction: Direction) -> usize {
  let f = match family {
    PatternType::Abcd => 0,
    PatternType::Xabcd => 2,
  };
  f + usize::from(direction.is_bearish())
}

impl PatternCatalog {
  /// Build a catalog, rejecting duplicate (name, direction, family) entries
  pub fn new(entries: Vec<PatternDefinition>) -> Result<Self> {
    let mut seen = HashSet::new();
    for def in &entries {
      if !seen.insert((def.name.as_str(), def.direction, def.family)) {
        return Err(PatternError::InvalidCatalog {
          name: def.name.clone(),
          reason: "duplicate entry",
        });
      }
    }
    Ok(Self::indexed(entries))
  }

  fn indexed(entries: Vec<PatternDefinition>) -> Self {
    let mut index: [Vec<usize>; 4] = Default::default();
    for (i, def) in entries.iter().enumerate() {
      index[bucket(def.family, def.direction)].push(i);
    }
    Self { entries, index }
  }

  /// Parse a catalog from its JSON form: `{"patterns": [...]}`
  pub fn from_json(json: &str) -> Result<Self> {
    let file: CatalogFile =
      serde_json::from_str(json).map_err(|e| PatternError::CatalogParse(e.to_string()))?;
    Self::new(file.patterns)
  }

  pub fn to_json(&self) -> Result<String> {
    let file = CatalogFile { patterns: self.entries.clone() };
    serde_json::to_string_pretty(&file).map_err(|e| PatternError::CatalogParse(e.to_string()))
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &PatternDefinition> {
    self.entries.iter()
  }

  /// Entries of one family and direction, in catalog order
  pub fn definitions(
    &self,
    family: PatternType,
    direction: Direction,
  ) -> impl ExactSizeIterator<Item = &PatternDefinition> + '_ {
    self.index[bucket(family, direction)].iter().map(move |&i| &self.entries[i])
  }

  pub fn get(&self, name: &str, direction: Direction) -> Option<&PatternDefinition> {
    self.entries.iter().find(|d| d.name == name && d.direction == direction)
  }

  /// The builtin table: ABCD retracement/projection pairs and the classic
  /// XABCD families, each in both directions.
  pub fn builtin() -> Self {
    let mut entries = Vec::with_capacity(2 * (ABCD_PAIRS.len() + XABCD_TABLE.len()));

    for direction in [Direction::Bullish, Direction::Bearish] {
      for &(retracement, projection) in ABCD_PAIRS {
        entries.push(PatternDefinition::from_parts(
          format!("AB=CD {retracement}/{projection}"),
          direction,
          PatternType::Abcd,
          &[
            (
              Leg::BcRetracement,
              RatioRange::new_const(retracement - ABCD_BAND, retracement + ABCD_BAND),
            ),
            (
              Leg::CdProjection,
              RatioRange::new_const(projection - ABCD_BAND, projection + ABCD_BAND),
            ),
          ],
        ));
      }
    }

    for direction in [Direction::Bullish, Direction::Bearish] {
      for row in XABCD_TABLE {
        entries.push(PatternDefinition::from_parts(
          row.name.to_string(),
          direction,
          PatternType::Xabcd,
          &[
            (Leg::AbXa, RatioRange::new_const(row.ab_xa.0, row.ab_xa.1)),
            (Leg::BcAb, RatioRange::new_const(row.bc_ab.0, row.bc_ab.1)),
            (Leg::CdBc, RatioRange::new_const(row.cd_bc.0, row.cd_bc.1)),
            (Leg::AdXa, RatioRange::new_const(row.ad_xa.0, row.ad_xa.1)),
          ],
        ));
      }
    }

    Self::indexed(entries)
  }
}

impl Default for PatternCatalog {
  fn default() -> Self {
    Self::builtin()
  }
}

// ============================================================
// BUILTIN TABLE
// ============================================================

/// Half-width (percentage points) of both ABCD bands
pub const ABCD_BAND: f64 = 8.0;

/// (retracement, projection) centres of the ABCD entries
static ABCD_PAIRS: &[(f64, f64)] = &[
  (38.2, 261.8),
  (38.2, 224.0),
  (50.0, 200.0),
  (61.8, 161.8),
  (70.7, 141.4),
  (78.6, 127.2),
  (88.6, 112.8),
];

struct XabcdRow {
  name: &'static str,
  ab_xa: (f64, f64),
  bc_ab: (f64, f64),
  cd_bc: (f64, f64),
  ad_xa: (f64, f64),
}

static XABCD_TABLE: &[XabcdRow] = &[
  XabcdRow {
    name: "Gartley",
    ab_xa: (56.8, 66.8),
    bc_ab: (38.2, 88.6),
    cd_bc: (127.2, 161.8),
    ad_xa: (73.6, 83.6),
  },
  XabcdRow {
    name: "Bat",
    ab_xa: (38.2, 50.0),
    bc_ab: (38.2, 88.6),
    cd_bc: (161.8, 261.8),
    ad_xa: (83.6, 93.6),
  },
  XabcdRow {
    name: "Alternate Bat",
    ab_xa: (33.0, 38.2),
    bc_ab: (38.2, 88.6),
    cd_bc: (200.0, 361.8),
    ad_xa: (108.0, 118.0),
  },
  XabcdRow {
    name: "Butterfly",
    ab_xa: (73.6, 83.6),
    bc_ab: (38.2, 88.6),
    cd_bc: (161.8, 261.8),
    ad_xa: (127.0, 161.8),
  },
  XabcdRow {
    name: "Crab",
    ab_xa: (38.2, 61.8),
    bc_ab: (38.2, 88.6),
    cd_bc: (224.0, 361.8),
    ad_xa: (156.8, 166.8),
  },
  XabcdRow {
    name: "Deep Crab",
    ab_xa: (83.6, 93.6),
    bc_ab: (38.2, 88.6),
    cd_bc: (200.0, 361.8),
    ad_xa: (156.8, 166.8),
  },
  XabcdRow {
    name: "Navarro 200",
    ab_xa: (38.2, 78.6),
    bc_ab: (88.6, 112.8),
    cd_bc: (88.6, 361.8),
    ad_xa: (88.6, 112.8),
  },
];

// ============================================================
// TESTS
// ============================================================
