//! Common helpers for harmonic pattern detection
//!
//! Leg arithmetic and the O(1) bar-range extrema index shared by the
//! detectors, the containment validator and the invalidation checker.

use crate::OHLCV;

// ============================================================
// THRESHOLDS
// ============================================================

/// Floor for ratio denominators. Near-zero legs still classify.
pub const LEG_EPSILON: f64 = 1e-10;

// ============================================================
// LEG ARITHMETIC
// ============================================================

/// Signed length of the leg between two points, measured from the point
/// sitting on the high side. Positive when the geometry is right.
#[inline]
pub fn leg(from: f64, to: f64, from_is_high: bool) -> f64 {
    if from_is_high {
        from - to
    } else {
        to - from
    }
}

/// `num / den` as a percentage.
///
/// `None` only for a true zero-length denominator; tiny legs are divided by
/// [`LEG_EPSILON`] instead.
#[inline]
pub fn percent(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        return None;
    }
    Some(num / den.abs().max(LEG_EPSILON) * 100.0)
}

/// Ratio of two pattern legs, in percent.
///
/// `None` when either leg has zero length: a point sitting on its
/// predecessor's price never forms a leg.
#[inline]
pub fn leg_ratio(num: f64, den: f64) -> Option<f64> {
    if num == 0.0 {
        return None;
    }
    percent(num, den)
}

// ============================================================
// RANGE EXTREMA
// ============================================================

/// Sparse table over bar highs and lows.
///
/// Built once per scan in O(n log n); answers max-high / min-low over any
/// inclusive bar range in O(1).
#[derive(Debug, Clone, Default)]
pub struct RangeExtrema {
    highs: Vec<Vec<f64>>,
    lows: Vec<Vec<f64>>,
}

impl RangeExtrema {
    pub fn new<T: OHLCV>(bars: &[T]) -> Self {
        let n = bars.len();
        if n == 0 {
            return Self::default();
        }

        let mut highs = vec![bars.iter().map(|b| b.high()).collect::<Vec<f64>>()];
        let mut lows = vec![bars.iter().map(|b| b.low()).collect::<Vec<f64>>()];

        let mut width = 1;
        while width * 2 <= n {
            let level = highs.len() - 1;
            let next_highs: Vec<f64> = {
                let prev = &highs[level];
                (0..=n - width * 2)
                    .map(|i| prev[i].max(prev[i + width]))
                    .collect()
            };
            let next_lows: Vec<f64> = {
                let prev = &lows[level];
                (0..=n - width * 2)
                    .map(|i| prev[i].min(prev[i + width]))
                    .collect()
            };
            highs.push(next_highs);
            lows.push(next_lows);
            width *= 2;
        }

        Self { highs, lows }
    }

    /// Number of bars indexed
    #[inline]
    pub fn len(&self) -> usize {
        self.highs.first().map_or(0, Vec::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn span(&self, first: usize, last: usize) -> Option<(usize, usize, usize)> {
        if first > last || last >= self.len() {
            return None;
        }
        let width = last - first + 1;
        let level = (usize::BITS - 1 - width.leading_zeros()) as usize;
        Some((level, first, last + 1 - (1 << level)))
    }

    /// Highest high over bars `first..=last`; `None` when out of bounds
    #[inline]
    pub fn max_high(&self, first: usize, last: usize) -> Option<f64> {
        let (level, l, r) = self.span(first, last)?;
        Some(self.highs[level][l].max(self.highs[level][r]))
    }

    /// Lowest low over bars `first..=last`; `None` when out of bounds
    #[inline]
    pub fn min_low(&self, first: usize, last: usize) -> Option<f64> {
        let (level, l, r) = self.span(first, last)?;
        Some(self.lows[level][l].min(self.lows[level][r]))
    }
}
