//! Segment containment validation
//!
//! A ratio-valid candidate is only a real pattern if every point is the
//! extreme of the price action around it. Each point bounds the bars of the
//! segment between its neighbours: a high point may not be exceeded, a low
//! point may not be undercut.

use crate::detectors::RangeExtrema;
use crate::{Completion, Direction, PatternType};

/// Bound a point imposes on a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    /// Every bar's high must stay at or below the price
    HighAtMost(f64),
    /// Every bar's low must stay at or above the price
    LowAtLeast(f64),
}

/// Half-open bar range `(after, through]` with the bound its bars must obey
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub after: usize,
    pub through: usize,
    pub bound: Bound,
}

impl Segment {
    pub fn new(after: usize, through: usize, bound: Bound) -> Self {
        Self {
            after,
            through,
            bound,
        }
    }
}

/// Containment checks over one candle series
#[derive(Debug, Clone, Copy)]
pub struct ContainmentValidator<'a> {
    ranges: &'a RangeExtrema,
    require_c_hold: bool,
}

impl<'a> ContainmentValidator<'a> {
    pub fn new(ranges: &'a RangeExtrema, require_c_hold: bool) -> Self {
        Self {
            ranges,
            require_c_hold,
        }
    }

    /// Number of bars in the underlying series
    #[inline]
    pub fn bars(&self) -> usize {
        self.ranges.len()
    }

    /// Whether every bar in the segment obeys its bound.
    ///
    /// An empty segment holds vacuously. A segment reaching past the last bar,
    /// or running backwards, fails.
    pub fn segment_holds(&self, segment: Segment) -> bool {
        if segment.through >= self.ranges.len() || segment.after > segment.through {
            return false;
        }
        if segment.after == segment.through {
            return true;
        }
        let (first, last) = (segment.after + 1, segment.through);
        match segment.bound {
            Bound::HighAtMost(price) => self
                .ranges
                .max_high(first, last)
                .is_some_and(|high| high <= price),
            Bound::LowAtLeast(price) => self
                .ranges
                .min_low(first, last)
                .is_some_and(|low| low >= price),
        }
    }

    /// Segments a candidate's realized points must satisfy.
    ///
    /// `bars` and `prices` list the realized points in role order (X first
    /// for XABCD). `None` when the shape is malformed: wrong point count or
    /// bar indices not strictly increasing.
    pub fn segments(
        &self,
        family: PatternType,
        completion: Completion,
        bars: &[usize],
        prices: &[f64],
        direction: Direction,
    ) -> Option<Vec<Segment>> {
        let n = match completion {
            Completion::Formed => family.points(),
            Completion::Unformed => family.points() - 1,
        };
        if bars.len() != n || prices.len() != n || n < 2 {
            return None;
        }
        if bars.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }

        let roles = &family.roles()[..n];
        let mut segments = Vec::with_capacity(n);

        for (i, role) in roles.iter().enumerate() {
            let bound = if role.is_high(direction) {
                Bound::HighAtMost(prices[i])
            } else {
                Bound::LowAtLeast(prices[i])
            };

            let (after, through) = if i == 0 {
                // X spans to B, so XA and AB are both covered
                match family {
                    PatternType::Abcd => (bars[0], bars[1]),
                    PatternType::Xabcd => (bars[0], bars[2]),
                }
            } else if i + 1 < n {
                (bars[i - 1], bars[i + 1])
            } else if completion == Completion::Unformed && self.require_c_hold {
                (bars[i - 1], self.ranges.len().saturating_sub(1))
            } else {
                (bars[i - 1], bars[i])
            };

            segments.push(Segment::new(after, through, bound));
        }

        Some(segments)
    }

    /// Full containment check: every segment holds and the structure rules pass.
    pub fn validate(
        &self,
        family: PatternType,
        completion: Completion,
        bars: &[usize],
        prices: &[f64],
        direction: Direction,
    ) -> bool {
        if !structure_holds(family, prices, direction) {
            return false;
        }
        match self.segments(family, completion, bars, prices, direction) {
            Some(segments) => segments.iter().all(|&s| self.segment_holds(s)),
            None => false,
        }
    }
}

/// XABCD structure rules; always true for ABCD.
///
/// B must sit strictly inside X (above X for bullish), and a realized D must
/// extend strictly beyond B in the completing direction.
pub fn structure_holds(family: PatternType, prices: &[f64], direction: Direction) -> bool {
    if family != PatternType::Xabcd {
        return true;
    }
    let sign = direction.completion_sign();
    if let (Some(&x), Some(&b)) = (prices.first(), prices.get(2)) {
        if (b - x) * sign >= 0.0 {
            return false;
        }
    }
    if let (Some(&b), Some(&d)) = (prices.get(2), prices.get(4)) {
        if !beyond_b(b, d, direction) {
            return false;
        }
    }
    true
}

/// Whether a D price extends strictly beyond B in the completing direction
#[inline]
pub fn beyond_b(b: f64, d: f64, direction: Direction) -> bool {
    (d - b) * direction.completion_sign() > 0.0
}
