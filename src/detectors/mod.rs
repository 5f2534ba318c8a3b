//! Harmonic pattern detectors
//!
//! Each detector walks the extremum series from one anchor point at a time,
//! extending candidates level by level and pruning on the catalog's ratio
//! ranges before anything touches the candles.
//!
//! # Detectors
//!
//! - **ABCD**: anchored on A, formed (A, B, C, D) or unformed (A, B, C)
//! - **XABCD**: anchored on X, formed (X, A, B, C, D) or unformed (X, A, B, C)

pub mod helpers;

/// Debug-trace a candidate decision when `log_details` is on.
macro_rules! detail {
  ($ctx:expr, $($arg:tt)+) => {
    if $ctx.config.log_details {
      tracing::debug!($($arg)+);
    }
  };
}

pub mod abcd;
pub mod xabcd;

pub use abcd::AbcdDetector;
pub use helpers::*;
pub use xabcd::XabcdDetector;

use crate::assembly::{PatternMatch, UnformedPatternMatch, ValidationKind};
use crate::catalog::PatternCatalog;
use crate::containment::ContainmentValidator;
use crate::invalidation::InvalidationChecker;
use crate::projection::ProjectionEngine;
use crate::series::{Extremum, ExtremumSeries};
use crate::{
    Cancellation, Completion, Diagnostics, Direction, EngineConfig, PatternKind, OHLCV,
};

/// Starting point of one search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub direction: Direction,
    /// Position in the anchor side's list (highs or lows)
    pub position: usize,
}

/// Everything a search needs, shared read-only across anchors
pub struct SearchContext<'a, T> {
    pub(crate) series: &'a ExtremumSeries,
    pub(crate) catalog: &'a PatternCatalog,
    pub(crate) config: &'a EngineConfig,
    pub(crate) validator: ContainmentValidator<'a>,
    pub(crate) projector: ProjectionEngine,
    pub(crate) checker: &'a InvalidationChecker<'a, T>,
    pub(crate) cancel: &'a Cancellation,
}

impl<'a, T: OHLCV + Sync> SearchContext<'a, T> {
    #[inline]
    pub(crate) fn window(&self) -> Option<usize> {
        self.config.max_search_window.map(|w| w.get())
    }

    /// All points sit on a bar of the candle series
    #[inline]
    pub(crate) fn in_range(&self, points: &[&Extremum]) -> bool {
        let bars = self.validator.bars();
        points.iter().all(|p| p.bar_index < bars)
    }

    pub(crate) fn validation_kind(&self, completion: Completion) -> ValidationKind {
        if !self.config.strict_validation {
            ValidationKind::RatioOnly
        } else if completion == Completion::Unformed && self.config.require_c_hold {
            ValidationKind::HeldC
        } else {
            ValidationKind::Containment
        }
    }
}

/// Matches and tallies from one or more anchors
#[derive(Debug, Default)]
pub struct Findings {
    pub formed: Vec<PatternMatch>,
    pub unformed: Vec<UnformedPatternMatch>,
    pub diagnostics: Diagnostics,
    limit: Option<usize>,
}

impl Findings {
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.formed.len() + self.unformed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The match cap has been reached
    #[inline]
    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|cap| self.len() >= cap)
    }

    pub(crate) fn absorb(&mut self, other: Findings) {
        self.formed.extend(other.formed);
        self.unformed.extend(other.unformed);
        self.diagnostics.absorb(&other.diagnostics);
    }

    /// Drop matches past the cap, keeping discovery order.
    ///
    /// Reaching the cap flags `truncated`, whether or not anything is
    /// dropped: a full sequential search stops early and cannot tell.
    pub(crate) fn enforce_limit(&mut self) {
        let Some(cap) = self.limit else { return };
        if self.len() < cap {
            return;
        }
        self.diagnostics.truncated = true;
        self.formed.truncate(cap);
        let room = cap - self.formed.len();
        self.unformed.truncate(room);
    }
}

/// Core harmonic detector trait
pub trait HarmonicDetector: Send + Sync {
    fn kind(&self) -> PatternKind;

    /// Minimum number of extrema this detector can use
    fn min_extrema(&self) -> usize {
        self.kind().realized_points()
    }

    /// One anchor per extremum on the side the first role sits on, both directions
    fn anchors(&self, series: &ExtremumSeries) -> Vec<Anchor> {
        let first = self.kind().family().roles()[0];
        [Direction::Bullish, Direction::Bearish]
            .into_iter()
            .flat_map(|direction| {
                let count = series.side(first.is_high(direction)).len();
                (0..count).map(move |position| Anchor {
                    direction,
                    position,
                })
            })
            .collect()
    }

    /// Extend every candidate rooted at `anchor` into `found`
    fn search<T: OHLCV + Sync>(
        &self,
        ctx: &SearchContext<'_, T>,
        anchor: Anchor,
        found: &mut Findings,
    );
}

// ============================================================
// BUILTIN DETECTOR ENUM (zero-cost dispatch)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinDetector {
    Abcd(AbcdDetector),
    Xabcd(XabcdDetector),
}

impl BuiltinDetector {
    pub fn for_kind(kind: PatternKind) -> Self {
        match kind {
            PatternKind::FormedAbcd => Self::Abcd(AbcdDetector::formed()),
            PatternKind::UnformedAbcd => Self::Abcd(AbcdDetector::unformed()),
            PatternKind::FormedXabcd => Self::Xabcd(XabcdDetector::formed()),
            PatternKind::UnformedXabcd => Self::Xabcd(XabcdDetector::unformed()),
        }
    }
}

impl HarmonicDetector for BuiltinDetector {
    fn kind(&self) -> PatternKind {
        match self {
            Self::Abcd(d) => d.kind(),
            Self::Xabcd(d) => d.kind(),
        }
    }

    fn min_extrema(&self) -> usize {
        match self {
            Self::Abcd(d) => d.min_extrema(),
            Self::Xabcd(d) => d.min_extrema(),
        }
    }

    fn anchors(&self, series: &ExtremumSeries) -> Vec<Anchor> {
        match self {
            Self::Abcd(d) => d.anchors(series),
            Self::Xabcd(d) => d.anchors(series),
        }
    }

    fn search<T: OHLCV + Sync>(
        &self,
        ctx: &SearchContext<'_, T>,
        anchor: Anchor,
        found: &mut Findings,
    ) {
        match self {
            Self::Abcd(d) => d.search(ctx, anchor, found),
            Self::Xabcd(d) => d.search(ctx, anchor, found),
        }
    }
}
