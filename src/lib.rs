//! # YAHPD - Yet Another Harmonic Pattern Detector
//!
//! Harmonic pattern detection over price extrema: 4-point ABCD and 5-point
//! XABCD families, both fully formed and still waiting for their D point.
//!
//! ## Quick Start
//!
//! ```rust
//! use yahpd::prelude::*;
//!
//! // Candles: any type implementing OHLCV, bar index = slice position
//! let candles: Vec<Candle> = vec![Candle::new(100.0, 101.0, 99.0, 100.5)];
//!
//! // Extrema come from an upstream pivot detector
//! let extrema: Vec<Extremum> = vec![Extremum::high(0, 101.0)];
//!
//! let engine = EngineBuilder::new()
//!     .max_search_window(50)
//!     .build()
//!     .unwrap();
//!
//! let report = engine.scan(&candles, &extrema).unwrap();
//! assert!(report.is_empty());
//! ```

pub mod assembly;
pub mod catalog;
pub mod containment;
pub mod detectors;
pub mod invalidation;
pub mod projection;
pub mod series;

pub mod prelude {
    pub use crate::{
        // Output
        assembly::{
            sort_by_quality, PatternMatch, PatternPoint, Projection, PrzZone,
            UnformedPatternMatch, ValidationKind,
        },
        // Catalog
        catalog::{Leg, PatternCatalog, PatternDefinition, RatioRange},
        // Detectors
        detectors::{AbcdDetector, BuiltinDetector, HarmonicDetector, XabcdDetector},
        projection::PriceZone,
        // Parallel
        scan_parallel,
        series::{Extremum, ExtremumSeries},
        Candle,
        Cancellation,
        Completion,
        Diagnostics,
        Direction,
        EngineBuilder,
        EngineConfig,
        OHLCVExt,
        // Errors
        PatternError,
        PatternEngine,
        PatternKind,
        PatternType,
        Result,
        Role,
        ScanError,
        ScanReport,
        ScanResult,
        SearchWindow,
        OHLCV,
    };
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::assembly::{PatternMatch, UnformedPatternMatch};
use crate::catalog::{Leg, PatternCatalog};
use crate::containment::ContainmentValidator;
use crate::detectors::{BuiltinDetector, Findings, HarmonicDetector, RangeExtrema, SearchContext};
use crate::invalidation::InvalidationChecker;
use crate::projection::ProjectionEngine;
use crate::series::{Extremum, ExtremumSeries};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur while configuring or running a scan.
///
/// Per-candidate problems (degenerate legs, containment failures, stale
/// projections) are never errors; they are tallied in [`Diagnostics`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid catalog entry {name:?}: {reason}")]
    InvalidCatalog { name: String, reason: &'static str },

    #[error("Catalog parse error: {0}")]
    CatalogParse(String),

    #[error("Empty candle series")]
    EmptyCandles,

    #[error("Extrema not ordered by bar index at position {index}")]
    UnorderedExtrema { index: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Maximum bar-index distance between consecutive pattern points (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchWindow(usize);

impl SearchWindow {
    /// Create a new SearchWindow, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("SearchWindow must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for SearchWindow {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for SearchWindow {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        SearchWindow::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn volume(&self) -> f64 {
        0.0
    }

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// True when `price` lies inside this bar's `[low, high]`
    #[inline]
    fn spans(&self, price: f64) -> bool {
        self.low() <= price && price <= self.high()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Plain OHLCV row
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    #[serde(default)]
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp: 0,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// PATTERN VOCABULARY
// ============================================================

/// Direction of the reversal a pattern anticipates.
///
/// Bullish patterns complete on a low (D is a trough), bearish ones on a high.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    /// Sign of the move from C into D: -1 for bullish, +1 for bearish
    #[inline]
    pub fn completion_sign(self) -> f64 {
        match self {
            Direction::Bullish => -1.0,
            Direction::Bearish => 1.0,
        }
    }
}

/// Pattern family
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternType {
    Abcd,
    Xabcd,
}

impl PatternType {
    /// Ordered roles of a fully formed pattern
    pub fn roles(self) -> &'static [Role] {
        match self {
            PatternType::Abcd => &[Role::A, Role::B, Role::C, Role::D],
            PatternType::Xabcd => &[Role::X, Role::A, Role::B, Role::C, Role::D],
        }
    }

    #[inline]
    pub fn points(self) -> usize {
        self.roles().len()
    }

    /// Ratio legs a catalog entry of this family must define
    pub fn legs(self) -> &'static [Leg] {
        match self {
            PatternType::Abcd => &[Leg::BcRetracement, Leg::CdProjection],
            PatternType::Xabcd => &[Leg::AbXa, Leg::BcAb, Leg::CdBc, Leg::AdXa],
        }
    }
}

/// Whether the terminal D point has been realized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    Formed,
    Unformed,
}

/// Point role within a pattern
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Role {
    X,
    A,
    B,
    C,
    D,
}

impl Role {
    /// Whether this role sits on a high for the given direction.
    /// Bullish: A and C are highs; X, B and D are lows. Bearish mirrors.
    #[inline]
    pub fn is_high(self, direction: Direction) -> bool {
        matches!(self, Role::A | Role::C) == direction.is_bullish()
    }
}

/// One searchable (family, completion) combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    FormedAbcd,
    UnformedAbcd,
    FormedXabcd,
    UnformedXabcd,
}

impl PatternKind {
    pub const ALL: [PatternKind; 4] = [
        PatternKind::FormedAbcd,
        PatternKind::UnformedAbcd,
        PatternKind::FormedXabcd,
        PatternKind::UnformedXabcd,
    ];

    pub fn new(family: PatternType, completion: Completion) -> Self {
        match (family, completion) {
            (PatternType::Abcd, Completion::Formed) => PatternKind::FormedAbcd,
            (PatternType::Abcd, Completion::Unformed) => PatternKind::UnformedAbcd,
            (PatternType::Xabcd, Completion::Formed) => PatternKind::FormedXabcd,
            (PatternType::Xabcd, Completion::Unformed) => PatternKind::UnformedXabcd,
        }
    }

    #[inline]
    pub fn family(self) -> PatternType {
        match self {
            PatternKind::FormedAbcd | PatternKind::UnformedAbcd => PatternType::Abcd,
            PatternKind::FormedXabcd | PatternKind::UnformedXabcd => PatternType::Xabcd,
        }
    }

    #[inline]
    pub fn completion(self) -> Completion {
        match self {
            PatternKind::FormedAbcd | PatternKind::FormedXabcd => Completion::Formed,
            PatternKind::UnformedAbcd | PatternKind::UnformedXabcd => Completion::Unformed,
        }
    }

    /// Number of realized points (extrema) a candidate of this kind consumes
    #[inline]
    pub fn realized_points(self) -> usize {
        match self.completion() {
            Completion::Formed => self.family().points(),
            Completion::Unformed => self.family().points() - 1,
        }
    }
}

// ============================================================
// CANCELLATION
// ============================================================

/// Caller-supplied stop signal, checked once per search anchor.
///
/// A tripped scan returns whatever matches were already assembled.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    flag: Option<Arc<AtomicBool>>,
}

impl Cancellation {
    pub fn none() -> Self {
        Self::default()
    }

    /// Stop at `at`; keeps the earlier deadline if one is already set
    pub fn with_deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(at, |d| d.min(at)));
        self
    }

    pub fn with_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn is_tripped(&self) -> bool {
        if let Some(flag) = &self.flag {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ============================================================
// SCAN REPORT
// ============================================================

/// Per-scan tallies. Diagnostic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostics {
    /// Tuples whose ratios matched at least one catalog entry
    pub candidates: usize,
    pub catalog_misses: usize,
    pub degenerate_legs: usize,
    pub out_of_range: usize,
    pub containment_rejections: usize,
    pub projection_rejections: usize,
    pub invalidation_rejections: usize,
    pub cache_hits: usize,
    pub cache_scans: usize,
    /// `max_patterns` was reached and the search stopped there, so
    /// candidates past the cap were not explored. Set even when the cap
    /// happens to equal the number of matches that exist.
    pub truncated: bool,
    /// Cancellation or deadline tripped before the search finished
    pub cancelled: bool,
}

impl Diagnostics {
    pub(crate) fn absorb(&mut self, other: &Diagnostics) {
        self.candidates += other.candidates;
        self.catalog_misses += other.catalog_misses;
        self.degenerate_legs += other.degenerate_legs;
        self.out_of_range += other.out_of_range;
        self.containment_rejections += other.containment_rejections;
        self.projection_rejections += other.projection_rejections;
        self.invalidation_rejections += other.invalidation_rejections;
        self.cache_hits += other.cache_hits;
        self.cache_scans += other.cache_scans;
        self.truncated |= other.truncated;
        self.cancelled |= other.cancelled;
    }
}

/// Result of one detection run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScanReport {
    pub formed: Vec<PatternMatch>,
    pub unformed: Vec<UnformedPatternMatch>,
    pub diagnostics: Diagnostics,
}

impl ScanReport {
    #[inline]
    pub fn len(&self) -> usize {
        self.formed.len() + self.unformed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn absorb(&mut self, found: Findings) {
        self.formed.extend(found.formed);
        self.unformed.extend(found.unformed);
        self.diagnostics.absorb(&found.diagnostics);
    }
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stop after this many matches (formed + unformed), in discovery order
    pub max_patterns: Option<usize>,
    /// Bar-index distance bound between consecutive points; `None` = unbounded
    pub max_search_window: Option<SearchWindow>,
    /// Run the containment validator on ratio-valid candidates
    pub strict_validation: bool,
    /// Drop formed patterns whose D was crossed, and touched XABCD lines
    pub validate_d_crossing: bool,
    /// Drop unformed ABCD matches once later price entered any PRZ zone
    pub require_untouched_projection: bool,
    /// Unformed patterns: C must hold from B through the last bar
    pub require_c_hold: bool,
    /// Trace every candidate decision at debug level
    pub log_details: bool,
    /// Parallel map over search anchors
    pub parallel: bool,
    pub sort_by_quality: bool,
    /// XABCD lines closer than this (price units) are merged
    pub line_merge_tolerance: f64,
    pub time_budget: Option<Duration>,
    pub validate_data: bool,
    pub kinds: Vec<PatternKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_patterns: None,
            max_search_window: None,
            strict_validation: true,
            validate_d_crossing: true,
            require_untouched_projection: false,
            require_c_hold: false,
            log_details: false,
            parallel: false,
            sort_by_quality: false,
            line_merge_tolerance: 0.1,
            time_budget: None,
            validate_data: false,
            kinds: PatternKind::ALL.to_vec(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.max_patterns == Some(0) {
            return Err(PatternError::InvalidConfig(
                "max_patterns must be > 0".to_string(),
            ));
        }
        if !self.line_merge_tolerance.is_finite() || self.line_merge_tolerance < 0.0 {
            return Err(PatternError::OutOfRange {
                field: "line_merge_tolerance",
                value: self.line_merge_tolerance,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if self.kinds.is_empty() {
            return Err(PatternError::InvalidConfig(
                "at least one pattern kind must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main harmonic detection engine
pub struct PatternEngine {
    catalog: Arc<PatternCatalog>,
    detectors: Vec<BuiltinDetector>,
    config: EngineConfig,
}

impl PatternEngine {
    #[inline]
    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scan one instrument for every enabled pattern kind.
    pub fn scan<T: OHLCV + Sync>(&self, candles: &[T], extrema: &[Extremum]) -> Result<ScanReport> {
        self.scan_with(candles, extrema, &Cancellation::none())
    }

    /// Scan honoring a cancellation token / deadline.
    ///
    /// Fails only when the inputs themselves are unusable: empty candles,
    /// extrema out of bar order, or invalid rows when `validate_data` is set.
    pub fn scan_with<T: OHLCV + Sync>(
        &self,
        candles: &[T],
        extrema: &[Extremum],
        cancel: &Cancellation,
    ) -> Result<ScanReport> {
        if candles.is_empty() {
            return Err(PatternError::EmptyCandles);
        }
        if self.config.validate_data {
            validate_bars(candles)?;
        }

        let series = ExtremumSeries::new(extrema)?;
        let mut report = ScanReport::default();

        let fewest = self
            .detectors
            .iter()
            .map(|d| d.min_extrema())
            .min()
            .unwrap_or(usize::MAX);
        if series.len() < fewest {
            debug!(extrema = series.len(), "too few extrema for any enabled pattern");
            return Ok(report);
        }

        let cancel = match self.config.time_budget {
            Some(budget) => cancel.clone().with_deadline(Instant::now() + budget),
            None => cancel.clone(),
        };
        let ranges = RangeExtrema::new(candles);
        let checker = InvalidationChecker::new(candles, &ranges);
        let ctx = SearchContext {
            series: &series,
            catalog: &self.catalog,
            config: &self.config,
            validator: ContainmentValidator::new(&ranges, self.config.require_c_hold),
            projector: ProjectionEngine::new(self.config.line_merge_tolerance),
            checker: &checker,
            cancel: &cancel,
        };

        for detector in &self.detectors {
            let remaining = self
                .config
                .max_patterns
                .map(|cap| cap.saturating_sub(report.len()));
            if remaining == Some(0) {
                report.diagnostics.truncated = true;
                break;
            }
            if cancel.is_tripped() {
                report.diagnostics.cancelled = true;
                break;
            }
            if series.len() < detector.min_extrema() {
                continue;
            }
            let found = self.run_detector(detector, &ctx, remaining);
            report.absorb(found);
        }

        report.diagnostics.cache_hits = checker.hits();
        report.diagnostics.cache_scans = checker.scans();

        if self.config.sort_by_quality {
            assembly::sort_by_quality(&mut report.formed);
            assembly::sort_by_quality(&mut report.unformed);
        }

        if report.diagnostics.cancelled {
            warn!(
                assembled = report.len(),
                "harmonic scan cancelled, returning partial results"
            );
        }
        debug!(
            formed = report.formed.len(),
            unformed = report.unformed.len(),
            candidates = report.diagnostics.candidates,
            containment_rejections = report.diagnostics.containment_rejections,
            projection_rejections = report.diagnostics.projection_rejections,
            invalidation_rejections = report.diagnostics.invalidation_rejections,
            "harmonic scan finished"
        );

        Ok(report)
    }

    fn run_detector<T: OHLCV + Sync>(
        &self,
        detector: &BuiltinDetector,
        ctx: &SearchContext<'_, T>,
        limit: Option<usize>,
    ) -> Findings {
        let anchors = detector.anchors(ctx.series);

        let mut total = Findings::with_limit(limit);
        if self.config.parallel {
            let parts: Vec<Findings> = anchors
                .par_iter()
                .map(|&anchor| {
                    let mut found = Findings::with_limit(limit);
                    if ctx.cancel.is_tripped() {
                        found.diagnostics.cancelled = true;
                    } else {
                        detector.search(ctx, anchor, &mut found);
                    }
                    found
                })
                .collect();
            for part in parts {
                total.absorb(part);
            }
        } else {
            for &anchor in &anchors {
                if ctx.cancel.is_tripped() {
                    total.diagnostics.cancelled = true;
                    break;
                }
                detector.search(ctx, anchor, &mut total);
                if total.is_full() {
                    break;
                }
            }
        }

        total.enforce_limit();
        total
    }
}

fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            PatternError::InvalidOHLCV { reason, .. } => {
                PatternError::InvalidOHLCV { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
pub struct EngineBuilder {
    catalog: Option<Arc<PatternCatalog>>,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            catalog: None,
            config: EngineConfig::default(),
        }
    }

    /// Use a shared catalog instead of the builtin one
    pub fn catalog(mut self, catalog: Arc<PatternCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_patterns(mut self, cap: usize) -> Self {
        self.config.max_patterns = Some(cap);
        self
    }

    /// Bound consecutive points to `bars` bar indices apart (0 is rejected by `build`)
    pub fn max_search_window(mut self, bars: usize) -> Self {
        self.config.max_search_window = Some(SearchWindow::new_const(bars));
        self
    }

    pub fn strict_validation(mut self, enable: bool) -> Self {
        self.config.strict_validation = enable;
        self
    }

    pub fn validate_d_crossing(mut self, enable: bool) -> Self {
        self.config.validate_d_crossing = enable;
        self
    }

    pub fn require_untouched_projection(mut self, enable: bool) -> Self {
        self.config.require_untouched_projection = enable;
        self
    }

    pub fn require_c_hold(mut self, enable: bool) -> Self {
        self.config.require_c_hold = enable;
        self
    }

    pub fn log_details(mut self, enable: bool) -> Self {
        self.config.log_details = enable;
        self
    }

    pub fn parallel(mut self, enable: bool) -> Self {
        self.config.parallel = enable;
        self
    }

    pub fn sort_by_quality(mut self, enable: bool) -> Self {
        self.config.sort_by_quality = enable;
        self
    }

    pub fn line_merge_tolerance(mut self, tolerance: f64) -> Self {
        self.config.line_merge_tolerance = tolerance;
        self
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.config.time_budget = Some(budget);
        self
    }

    /// Enable/disable OHLC data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Search only the given pattern kinds
    pub fn only_kinds(mut self, kinds: impl IntoIterator<Item = PatternKind>) -> Self {
        self.config.kinds = kinds.into_iter().collect();
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        if let Some(window) = self.config.max_search_window {
            SearchWindow::new(window.get())?;
        }
        self.config.validate()?;

        let mut detectors: Vec<BuiltinDetector> = Vec::with_capacity(self.config.kinds.len());
        for &kind in &self.config.kinds {
            let detector = BuiltinDetector::for_kind(kind);
            if !detectors.iter().any(|d| d.kind() == kind) {
                detectors.push(detector);
            }
        }

        Ok(PatternEngine {
            catalog: self
                .catalog
                .unwrap_or_else(|| Arc::new(PatternCatalog::builtin())),
            detectors,
            config: self.config,
        })
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub report: ScanReport,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of multiple instruments: `(symbol, candles, extrema)`
pub fn scan_parallel<'a, T, I>(
    engine: &PatternEngine,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T], &'a [Extremum])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, candles, extrema)| {
            engine
                .scan(candles, extrema)
                .map(|report| {
                    debug!(symbol, matches = report.len(), "instrument scanned");
                    ScanResult {
                        symbol: symbol.to_string(),
                        report,
                    }
                })
                .map_err(|error| {
                    debug!(symbol, %error, "instrument rejected");
                    ScanError {
                        symbol: symbol.to_string(),
                        error,
                    }
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
