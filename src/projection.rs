//! Completion projections
//!
//! Where D should land: ABCD gets one potential reversal zone (PRZ) per
//! catalog entry, XABCD gets a merged set of candidate D price lines built
//! from the XA and BC legs.

use crate::catalog::{Leg, PatternDefinition, RatioRange};
use crate::containment::beyond_b;
use crate::Direction;

/// Relative slack for inclusive price comparisons
pub const PRICE_TOLERANCE: f64 = 1e-9;

/// Inclusive price interval, `min <= max`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceZone {
    pub min: f64,
    pub max: f64,
}

impl PriceZone {
    /// Zone between two prices in either order
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        let slack = PRICE_TOLERANCE * price.abs().max(1.0);
        price >= self.min - slack && price <= self.max + slack
    }

    /// Overlap of two zones, `None` when disjoint
    pub fn intersect(&self, other: &PriceZone) -> Option<PriceZone> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(PriceZone { min, max })
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Realized X, A, B, C prices of an XABCD candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XabcPrices {
    pub x: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Projection arithmetic for one scan
#[derive(Debug, Clone, Copy)]
pub struct ProjectionEngine {
    merge_tolerance: f64,
}

impl ProjectionEngine {
    pub fn new(merge_tolerance: f64) -> Self {
        Self { merge_tolerance }
    }

    /// Price reached by extending `leg` from `origin` toward D by `ratio` percent
    #[inline]
    fn extend(origin: f64, leg: f64, ratio: f64, direction: Direction) -> f64 {
        origin + direction.completion_sign() * leg * ratio / 100.0
    }

    /// ABCD PRZ: `C ∓ BC × projection / 100` over the projection range.
    ///
    /// Bullish: `[C − BC·max/100, C − BC·min/100]`, bearish mirrors above C.
    pub fn abcd_prz(
        &self,
        c: f64,
        bc: f64,
        projection: RatioRange,
        direction: Direction,
    ) -> PriceZone {
        PriceZone::new(
            Self::extend(c, bc, projection.min(), direction),
            Self::extend(c, bc, projection.max(), direction),
        )
    }

    /// Zones for every ABCD definition with a projection range, ascending by `min`
    pub fn abcd_zones<'d>(
        &self,
        c: f64,
        bc: f64,
        definitions: impl IntoIterator<Item = &'d PatternDefinition>,
        direction: Direction,
    ) -> Vec<(&'d PatternDefinition, PriceZone)> {
        let mut zones: Vec<(&PatternDefinition, PriceZone)> = definitions
            .into_iter()
            .filter_map(|def| {
                let range = def.range(Leg::CdProjection)?;
                Some((def, self.abcd_prz(c, bc, range, direction)))
            })
            .collect();
        zones.sort_by(|a, b| a.1.min.total_cmp(&b.1.min));
        zones
    }

    /// Zone a formed XABCD D must sit in: the AD/XA band intersected with the
    /// CD/BC band. `None` for zero-length XA or BC legs or disjoint bands.
    pub fn xabcd_zone(
        &self,
        points: XabcPrices,
        definition: &PatternDefinition,
        direction: Direction,
    ) -> Option<PriceZone> {
        let (xa, bc) = legs(points)?;
        let ad = definition.range(Leg::AdXa)?;
        let cd = definition.range(Leg::CdBc)?;

        let from_xa = PriceZone::new(
            Self::extend(points.a, xa, ad.min(), direction),
            Self::extend(points.a, xa, ad.max(), direction),
        );
        let from_bc = PriceZone::new(
            Self::extend(points.c, bc, cd.min(), direction),
            Self::extend(points.c, bc, cd.max(), direction),
        );
        from_xa.intersect(&from_bc)
    }

    /// Candidate D lines for an unformed XABCD.
    ///
    /// Two methods, three ratios each (mid, max, min):
    /// 1. D from the AD/XA ratio, its implied CD/BC clamped into range, D
    ///    recomputed from BC.
    /// 2. D from the CD/BC ratio, its implied AD/XA clamped into range, D
    ///    recomputed from XA.
    ///
    /// Lines closer than the merge tolerance collapse into one. Lines not
    /// beyond B are discarded. Returned ascending; `None` for zero-length legs.
    pub fn xabcd_lines(
        &self,
        points: XabcPrices,
        definition: &PatternDefinition,
        direction: Direction,
    ) -> Option<Vec<f64>> {
        let (xa, bc) = legs(points)?;
        let ad = definition.range(Leg::AdXa)?;
        let cd = definition.range(Leg::CdBc)?;
        let sign = direction.completion_sign();

        let mut raw = Vec::with_capacity(6);
        for ratio in [ad.mid(), ad.max(), ad.min()] {
            let d = Self::extend(points.a, xa, ratio, direction);
            let implied = (d - points.c) * sign / bc * 100.0;
            raw.push(Self::extend(points.c, bc, cd.clamp(implied), direction));
        }
        for ratio in [cd.mid(), cd.max(), cd.min()] {
            let d = Self::extend(points.c, bc, ratio, direction);
            let implied = (d - points.a) * sign / xa * 100.0;
            raw.push(Self::extend(points.a, xa, ad.clamp(implied), direction));
        }

        raw.retain(|p| p.is_finite());
        raw.sort_by(f64::total_cmp);

        let mut lines: Vec<f64> = Vec::with_capacity(raw.len());
        for price in raw {
            match lines.last() {
                Some(&kept) if price - kept <= self.merge_tolerance => {}
                _ => lines.push(price),
            }
        }
        lines.retain(|&d| beyond_b(points.b, d, direction));

        Some(lines)
    }
}

fn legs(points: XabcPrices) -> Option<(f64, f64)> {
    let xa = (points.a - points.x).abs();
    let bc = (points.c - points.b).abs();
    (xa != 0.0 && bc != 0.0).then_some((xa, bc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PatternCatalog;
    use crate::PatternType;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn gartley(direction: Direction) -> PatternDefinition {
        PatternCatalog::builtin()
            .get("Gartley", direction)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_abcd_prz_bullish_and_bearish() {
        let engine = ProjectionEngine::new(0.1);
        let range = RatioRange::new(192.0, 208.0).unwrap();

        let bull = engine.abcd_prz(95.0, 5.0, range, Direction::Bullish);
        assert!(approx(bull.min, 84.6));
        assert!(approx(bull.max, 85.4));

        let bear = engine.abcd_prz(105.0, 5.0, range, Direction::Bearish);
        assert!(approx(bear.min, 114.6));
        assert!(approx(bear.max, 115.4));
    }

    #[test]
    fn test_abcd_zones_sorted() {
        let engine = ProjectionEngine::new(0.1);
        let catalog = PatternCatalog::builtin();
        let zones = engine.abcd_zones(
            95.0,
            5.0,
            catalog.definitions(PatternType::Abcd, Direction::Bullish),
            Direction::Bullish,
        );
        assert_eq!(zones.len(), 7);
        assert!(zones.windows(2).all(|w| w[0].1.min <= w[1].1.min));
    }

    #[test]
    fn test_zone_contains_with_tolerance() {
        let zone = PriceZone::new(85.4, 84.6);
        assert_eq!(zone.min, 84.6);
        assert!(zone.contains(85.0));
        assert!(zone.contains(85.4 + 1e-12));
        assert!(!zone.contains(85.5));
    }

    #[test]
    fn test_xabcd_zone_contains_gartley_d() {
        let engine = ProjectionEngine::new(0.1);
        let points = XabcPrices {
            x: 100.0,
            a: 200.0,
            b: 138.0,
            c: 175.0,
        };
        let zone = engine
            .xabcd_zone(points, &gartley(Direction::Bullish), Direction::Bullish)
            .unwrap();
        assert!(zone.contains(121.0));
        assert!(!zone.contains(110.0));
    }

    #[test]
    fn test_xabcd_lines_beyond_b_and_merged() {
        let engine = ProjectionEngine::new(0.1);
        let points = XabcPrices {
            x: 100.0,
            a: 200.0,
            b: 138.0,
            c: 175.0,
        };
        let lines = engine
            .xabcd_lines(points, &gartley(Direction::Bullish), Direction::Bullish)
            .unwrap();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|&d| d < 138.0));
        assert!(lines.windows(2).all(|w| w[1] - w[0] > 0.1));
    }

    #[test]
    fn test_xabcd_zero_leg() {
        let engine = ProjectionEngine::new(0.1);
        let points = XabcPrices {
            x: 100.0,
            a: 100.0,
            b: 90.0,
            c: 95.0,
        };
        let def = gartley(Direction::Bullish);
        assert!(engine.xabcd_lines(points, &def, Direction::Bullish).is_none());
        assert!(engine.xabcd_zone(points, &def, Direction::Bullish).is_none());
    }
}
