//! Output records and ranking
//!
//! Turns surviving candidates into [`PatternMatch`] / [`UnformedPatternMatch`]
//! values and orders them for consumers.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{Leg, PatternDefinition};
use crate::projection::PriceZone;
use crate::series::Extremum;
use crate::{Direction, PatternType, Role};

/// Measured leg ratios, in percent
pub type MeasuredRatios = BTreeMap<Leg, f64>;

/// One realized pattern point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternPoint {
    pub role: Role,
    pub timestamp: i64,
    pub price: f64,
    pub bar_index: usize,
}

impl PatternPoint {
    pub fn new(role: Role, extremum: &Extremum) -> Self {
        Self {
            role,
            timestamp: extremum.timestamp,
            price: extremum.price,
            bar_index: extremum.bar_index,
        }
    }
}

/// How thoroughly a match was validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    /// Ratios only; containment was disabled
    RatioOnly,
    /// Ratios plus segment containment
    Containment,
    /// Containment with C held through the last bar (unformed only)
    HeldC,
}

/// A completed pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub name: String,
    pub pattern_type: PatternType,
    pub direction: Direction,
    pub points: Vec<PatternPoint>,
    pub measured_ratios: MeasuredRatios,
    pub validation_kind: ValidationKind,
    /// Zone D was verified against
    pub completion_zone: PriceZone,
    /// Number of catalog entries this point tuple satisfied
    pub confluence: usize,
}

/// ABCD potential reversal zone, tagged with the entry that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrzZone {
    pub min: f64,
    pub max: f64,
    pub source_pattern_name: String,
}

impl PrzZone {
    #[inline]
    pub fn zone(&self) -> PriceZone {
        PriceZone {
            min: self.min,
            max: self.max,
        }
    }
}

/// Where an unformed pattern expects D
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Projection {
    /// ABCD: one zone per matching entry, ascending by `min`
    Zones(Vec<PrzZone>),
    /// XABCD: merged candidate D prices, ascending
    Lines(Vec<f64>),
}

/// A pattern still waiting for D
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnformedPatternMatch {
    pub name: String,
    pub pattern_type: PatternType,
    pub direction: Direction,
    pub points: Vec<PatternPoint>,
    pub measured_ratios: MeasuredRatios,
    pub validation_kind: ValidationKind,
    pub projection: Projection,
    /// Every catalog entry that matched, in catalog order
    pub matched_names: Vec<String>,
}

impl UnformedPatternMatch {
    pub fn prz_zones(&self) -> &[PrzZone] {
        match &self.projection {
            Projection::Zones(zones) => zones,
            Projection::Lines(_) => &[],
        }
    }

    pub fn d_lines(&self) -> &[f64] {
        match &self.projection {
            Projection::Lines(lines) => lines,
            Projection::Zones(_) => &[],
        }
    }
}

// ============================================================
// CONSTRUCTION
// ============================================================

pub(crate) fn formed(
    definition: &PatternDefinition,
    points: Vec<PatternPoint>,
    measured_ratios: MeasuredRatios,
    validation_kind: ValidationKind,
    completion_zone: PriceZone,
    confluence: usize,
) -> PatternMatch {
    PatternMatch {
        name: definition.name().to_string(),
        pattern_type: definition.family(),
        direction: definition.direction(),
        points,
        measured_ratios,
        validation_kind,
        completion_zone,
        confluence,
    }
}

/// `definitions` must be non-empty and in catalog order; the first names the match
pub(crate) fn unformed(
    definitions: &[&PatternDefinition],
    points: Vec<PatternPoint>,
    measured_ratios: MeasuredRatios,
    validation_kind: ValidationKind,
    projection: Projection,
) -> Option<UnformedPatternMatch> {
    let lead = definitions.first()?;
    Some(UnformedPatternMatch {
        name: lead.name().to_string(),
        pattern_type: lead.family(),
        direction: lead.direction(),
        points,
        measured_ratios,
        validation_kind,
        projection,
        matched_names: definitions.iter().map(|d| d.name().to_string()).collect(),
    })
}

/// Recompute the leg ratios of a point list in role order.
///
/// Covers whichever legs the realized points allow; `None` for a
/// zero-length denominator.
pub fn measure(
    family: PatternType,
    direction: Direction,
    prices: &[f64],
) -> Option<MeasuredRatios> {
    use crate::detectors::{leg, percent};

    let high = |role: Role| role.is_high(direction);
    let mut ratios = MeasuredRatios::new();

    match family {
        PatternType::Abcd => {
            let (&a, &b, &c) = (prices.first()?, prices.get(1)?, prices.get(2)?);
            let ab = leg(a, b, high(Role::A));
            let bc = leg(c, b, high(Role::C));
            ratios.insert(Leg::BcRetracement, percent(bc, ab)?);
            if let Some(&d) = prices.get(3) {
                ratios.insert(Leg::CdProjection, percent(leg(c, d, high(Role::C)), bc)?);
            }
        }
        PatternType::Xabcd => {
            let (&x, &a, &b, &c) = (
                prices.first()?,
                prices.get(1)?,
                prices.get(2)?,
                prices.get(3)?,
            );
            let xa = leg(a, x, high(Role::A));
            let ab = leg(a, b, high(Role::A));
            let bc = leg(c, b, high(Role::C));
            ratios.insert(Leg::AbXa, percent(ab, xa)?);
            ratios.insert(Leg::BcAb, percent(bc, ab)?);
            if let Some(&d) = prices.get(4) {
                ratios.insert(Leg::CdBc, percent(leg(c, d, high(Role::C)), bc)?);
                ratios.insert(Leg::AdXa, percent(leg(a, d, high(Role::A)), xa)?);
            }
        }
    }

    Some(ratios)
}

// ============================================================
// QUALITY ORDERING
// ============================================================

/// Fields the quality ordering reads
pub trait Ranked {
    fn confluence(&self) -> usize;
    fn name(&self) -> &str;
    fn direction(&self) -> Direction;
    fn points(&self) -> &[PatternPoint];
    fn measured_ratios(&self) -> &MeasuredRatios;

    /// Distance of the BC retracement from 50%; closer reads as cleaner
    fn retracement_offset(&self) -> f64 {
        let ratios = self.measured_ratios();
        ratios
            .get(&Leg::BcRetracement)
            .or_else(|| ratios.get(&Leg::BcAb))
            .map_or(f64::INFINITY, |r| (r - 50.0).abs())
    }
}

impl Ranked for PatternMatch {
    fn confluence(&self) -> usize {
        self.confluence
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn points(&self) -> &[PatternPoint] {
        &self.points
    }

    fn measured_ratios(&self) -> &MeasuredRatios {
        &self.measured_ratios
    }
}

impl Ranked for UnformedPatternMatch {
    fn confluence(&self) -> usize {
        self.matched_names.len()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn points(&self) -> &[PatternPoint] {
        &self.points
    }

    fn measured_ratios(&self) -> &MeasuredRatios {
        &self.measured_ratios
    }
}

/// Total order: confluence desc, retracement offset asc, then terminal bar,
/// name, direction and point bars so equal-quality matches never tie.
pub fn quality_cmp<M: Ranked>(a: &M, b: &M) -> Ordering {
    let terminal = |m: &M| m.points().last().map_or(0, |p| p.bar_index);
    let bars = |m: &M| m.points().iter().map(|p| p.bar_index).collect::<Vec<_>>();

    b.confluence()
        .cmp(&a.confluence())
        .then_with(|| a.retracement_offset().total_cmp(&b.retracement_offset()))
        .then_with(|| terminal(a).cmp(&terminal(b)))
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| a.direction().cmp(&b.direction()))
        .then_with(|| bars(a).cmp(&bars(b)))
}

pub fn sort_by_quality<M: Ranked>(matches: &mut [M]) {
    matches.sort_by(quality_cmp);
}
