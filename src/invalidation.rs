//! Post-pattern invalidation
//!
//! Price action after a pattern can void it: a formed D that was later
//! crossed, an XABCD line already traded through, an ABCD zone price already
//! entered. Projections are probed with pure functions of the candle series,
//! so results are memoized for the duration of one scan.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::trace;

use crate::detectors::RangeExtrema;
use crate::projection::PriceZone;
use crate::{Direction, OHLCVExt, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Probe {
    Crossed,
    Touched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemoKey {
    bar: usize,
    price: u64,
    direction: Direction,
    probe: Probe,
}

/// Run-scoped invalidation checks with a shared memo.
///
/// Safe to share across worker threads; the memo sits behind an `RwLock`
/// and the counters are atomics.
pub struct InvalidationChecker<'a, T> {
    candles: &'a [T],
    ranges: &'a RangeExtrema,
    memo: RwLock<HashMap<MemoKey, bool>>,
    hits: AtomicUsize,
    scans: AtomicUsize,
}

impl<'a, T: OHLCV + Sync> InvalidationChecker<'a, T> {
    pub fn new(candles: &'a [T], ranges: &'a RangeExtrema) -> Self {
        Self {
            candles,
            ranges,
            memo: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
        }
    }

    /// Memo lookups answered without probing
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Probes actually run against the candles
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Whether price moved beyond a formed D after its bar.
    ///
    /// Bullish: any later low under D. Bearish: any later high over D.
    /// A D bar outside the series counts as crossed.
    pub fn is_crossed(&self, d_bar: usize, d_price: f64, direction: Direction) -> bool {
        let key = MemoKey {
            bar: d_bar,
            price: d_price.to_bits(),
            direction,
            probe: Probe::Crossed,
        };
        self.memoized(key, || {
            let len = self.ranges.len();
            if d_bar >= len {
                return true;
            }
            if d_bar + 1 == len {
                return false;
            }
            match direction {
                Direction::Bullish => self
                    .ranges
                    .min_low(d_bar + 1, len - 1)
                    .map_or(true, |low| low < d_price),
                Direction::Bearish => self
                    .ranges
                    .max_high(d_bar + 1, len - 1)
                    .map_or(true, |high| high > d_price),
            }
        })
    }

    /// Whether any bar after `from_bar` traded through `price`.
    ///
    /// Scans candle by candle; results are memoized per `(bar, price,
    /// direction)`.
    pub fn is_touched(&self, from_bar: usize, price: f64, direction: Direction) -> bool {
        let key = MemoKey {
            bar: from_bar,
            price: price.to_bits(),
            direction,
            probe: Probe::Touched,
        };
        self.memoized(key, || match self.candles.get(from_bar + 1..) {
            Some(later) => later.iter().any(|bar| bar.spans(price)),
            None => true,
        })
    }

    /// Whether price reached into `zone` after `from_bar`.
    ///
    /// Bullish: a later low at or under the zone top. Bearish: a later high at
    /// or over the zone bottom.
    pub fn zone_entered(&self, from_bar: usize, zone: PriceZone, direction: Direction) -> bool {
        let len = self.ranges.len();
        if from_bar >= len {
            return true;
        }
        if from_bar + 1 == len {
            return false;
        }
        match direction {
            Direction::Bullish => self
                .ranges
                .min_low(from_bar + 1, len - 1)
                .map_or(true, |low| low <= zone.max),
            Direction::Bearish => self
                .ranges
                .max_high(from_bar + 1, len - 1)
                .map_or(true, |high| high >= zone.min),
        }
    }

    fn memoized(&self, key: MemoKey, probe: impl FnOnce() -> bool) -> bool {
        if let Some(&cached) = self
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        let outcome = probe();
        self.scans.fetch_add(1, Ordering::Relaxed);
        trace!(bar = key.bar, probe = ?key.probe, outcome, "invalidation probe");

        *self
            .memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(outcome)
    }
}
