//! Extremum input series
//!
//! Extrema are produced upstream (fractals, zigzag, swing detection). This
//! module only normalizes them into the ordered high/low views the search
//! walks.

use std::collections::HashSet;

use crate::{PatternError, Result};

/// A swing point: the bar it sits on and whether it is a high or a low.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Extremum {
    #[serde(default)]
    pub timestamp: i64,
    pub price: f64,
    pub is_high: bool,
    pub bar_index: usize,
}

impl Extremum {
    pub fn new(timestamp: i64, price: f64, is_high: bool, bar_index: usize) -> Self {
        Self {
            timestamp,
            price,
            is_high,
            bar_index,
        }
    }

    /// Swing high at `bar_index`; timestamp defaults to the bar index
    pub fn high(bar_index: usize, price: f64) -> Self {
        Self::new(bar_index as i64, price, true, bar_index)
    }

    /// Swing low at `bar_index`; timestamp defaults to the bar index
    pub fn low(bar_index: usize, price: f64) -> Self {
        Self::new(bar_index as i64, price, false, bar_index)
    }
}

/// Ordered extrema split into highs and lows
#[derive(Debug, Clone, Default)]
pub struct ExtremumSeries {
    all: Vec<Extremum>,
    highs: Vec<Extremum>,
    lows: Vec<Extremum>,
}

impl ExtremumSeries {
    /// Normalize raw extrema.
    ///
    /// Bar indices must be non-decreasing (a single bar may carry both a high
    /// and a low). Repeated `(bar_index, is_high)` entries keep the first.
    pub fn new(extrema: &[Extremum]) -> Result<Self> {
        let mut seen: HashSet<(usize, bool)> = HashSet::with_capacity(extrema.len());
        let mut all = Vec::with_capacity(extrema.len());

        for (i, e) in extrema.iter().enumerate() {
            if i > 0 && e.bar_index < extrema[i - 1].bar_index {
                return Err(PatternError::UnorderedExtrema { index: i });
            }
            if !e.price.is_finite() {
                return Err(PatternError::InvalidValue("extremum price must be finite"));
            }
            if seen.insert((e.bar_index, e.is_high)) {
                all.push(*e);
            }
        }

        let (highs, lows) = all.iter().copied().partition(|e| e.is_high);
        Ok(Self { all, highs, lows })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    #[inline]
    pub fn all(&self) -> &[Extremum] {
        &self.all
    }

    #[inline]
    pub fn highs(&self) -> &[Extremum] {
        &self.highs
    }

    #[inline]
    pub fn lows(&self) -> &[Extremum] {
        &self.lows
    }

    #[inline]
    pub fn side(&self, is_high: bool) -> &[Extremum] {
        if is_high {
            &self.highs
        } else {
            &self.lows
        }
    }

    /// Extrema of one side strictly after `bar`, within `window` bars of it.
    pub fn after(
        &self,
        is_high: bool,
        bar: usize,
        window: Option<usize>,
    ) -> impl Iterator<Item = &Extremum> + '_ {
        let side = self.side(is_high);
        let start = side.partition_point(|e| e.bar_index <= bar);
        side[start..]
            .iter()
            .take_while(move |e| window.map_or(true, |w| e.bar_index - bar <= w))
    }
}
