//! Integration tests for YAHPD harmonic pattern detection library.
//!
//! These tests drive the engine end to end over hand-built price paths.

use std::sync::Arc;

use yahpd::prelude::*;

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
}

impl TestBar {
    fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
        Self { o, h, l, c }
    }
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn volume(&self) -> f64 {
        1000.0
    }
}

/// Bars walking linearly between `(bar, price)` waypoints; each bar spans
/// its open (previous close) and close.
fn zigzag(points: &[(usize, f64)]) -> Vec<TestBar> {
    let last = points.last().map_or(0, |p| p.0);
    let price_at = |bar: usize| -> f64 {
        for w in points.windows(2) {
            let ((b0, p0), (b1, p1)) = (w[0], w[1]);
            if bar >= b0 && bar <= b1 {
                let t = (bar - b0) as f64 / (b1 - b0) as f64;
                return p0 + (p1 - p0) * t;
            }
        }
        points[0].1
    };
    (0..=last)
        .map(|i| {
            let close = price_at(i);
            let open = if i == 0 { close } else { price_at(i - 1) };
            TestBar::new(open, open.max(close), open.min(close), close)
        })
        .collect()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn engine_for(kind: PatternKind) -> PatternEngine {
    EngineBuilder::new().only_kinds([kind]).build().unwrap()
}

fn bullish_abcd() -> (Vec<TestBar>, Vec<Extremum>) {
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (15, 85.0), (20, 90.0)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 95.0),
        Extremum::low(15, 85.0),
    ];
    (bars, extrema)
}

fn wide_abcd_engine(kind: PatternKind) -> PatternEngine {
    let catalog = PatternCatalog::from_json(
        r#"{"patterns":[
            {"name":"wide","direction":"bullish","family":"ABCD",
             "ratios":{"bc_retracement":[0,1000],"cd_projection":[0,1000]}},
            {"name":"wide","direction":"bearish","family":"ABCD",
             "ratios":{"bc_retracement":[0,1000],"cd_projection":[0,1000]}}
        ]}"#,
    )
    .unwrap();
    EngineBuilder::new()
        .catalog(Arc::new(catalog))
        .only_kinds([kind])
        .strict_validation(false)
        .validate_d_crossing(false)
        .build()
        .unwrap()
}

fn bullish_gartley() -> (Vec<TestBar>, Vec<Extremum>) {
    let bars = zigzag(&[
        (0, 100.0),
        (10, 200.0),
        (20, 138.0),
        (30, 175.0),
        (40, 121.0),
        (50, 140.0),
    ]);
    let extrema = vec![
        Extremum::low(0, 100.0),
        Extremum::high(10, 200.0),
        Extremum::low(20, 138.0),
        Extremum::high(30, 175.0),
        Extremum::low(40, 121.0),
    ];
    (bars, extrema)
}

// ============================================================
// FORMED ABCD
// ============================================================

#[test]
fn test_formed_abcd_bullish() {
    let (bars, extrema) = bullish_abcd();
    let report = engine_for(PatternKind::FormedAbcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.formed.len(), 1);
    let m = &report.formed[0];
    assert_eq!(m.name, "AB=CD 50/200");
    assert_eq!(m.pattern_type, PatternType::Abcd);
    assert_eq!(m.direction, Direction::Bullish);
    assert_eq!(m.validation_kind, ValidationKind::Containment);
    assert_eq!(m.confluence, 1);

    let roles: Vec<Role> = m.points.iter().map(|p| p.role).collect();
    assert_eq!(roles, vec![Role::A, Role::B, Role::C, Role::D]);
    assert!(approx(m.measured_ratios[&Leg::BcRetracement], 50.0));
    assert!(approx(m.measured_ratios[&Leg::CdProjection], 200.0));
    assert!(approx(m.completion_zone.min, 84.6));
    assert!(approx(m.completion_zone.max, 85.4));
}

#[test]
fn test_formed_abcd_bearish_mirror() {
    let bars = zigzag(&[(0, 100.0), (5, 110.0), (10, 105.0), (15, 115.0), (20, 110.0)]);
    let extrema = vec![
        Extremum::low(0, 100.0),
        Extremum::high(5, 110.0),
        Extremum::low(10, 105.0),
        Extremum::high(15, 115.0),
    ];
    let report = engine_for(PatternKind::FormedAbcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.formed.len(), 1);
    let m = &report.formed[0];
    assert_eq!(m.direction, Direction::Bearish);
    assert_eq!(m.name, "AB=CD 50/200");
    assert!(approx(m.completion_zone.min, 114.6));
    assert!(approx(m.completion_zone.max, 115.4));
}

#[test]
fn test_containment_violation_rejects() {
    let (mut bars, extrema) = bullish_abcd();
    // bar 7 pokes above C
    bars[7].h = 96.0;

    let report = engine_for(PatternKind::FormedAbcd).scan(&bars, &extrema).unwrap();
    assert!(report.formed.is_empty());
    assert_eq!(report.diagnostics.containment_rejections, 1);

    let loose = EngineBuilder::new()
        .only_kinds([PatternKind::FormedAbcd])
        .strict_validation(false)
        .build()
        .unwrap();
    let report = loose.scan(&bars, &extrema).unwrap();
    assert_eq!(report.formed.len(), 1);
    assert_eq!(report.formed[0].validation_kind, ValidationKind::RatioOnly);
}

#[test]
fn test_crossed_d_rejects() {
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (15, 85.0), (20, 80.0)]);
    let (_, extrema) = bullish_abcd();

    let report = engine_for(PatternKind::FormedAbcd).scan(&bars, &extrema).unwrap();
    assert!(report.formed.is_empty());
    assert_eq!(report.diagnostics.invalidation_rejections, 1);

    let unchecked = EngineBuilder::new()
        .only_kinds([PatternKind::FormedAbcd])
        .validate_d_crossing(false)
        .build()
        .unwrap();
    assert_eq!(unchecked.scan(&bars, &extrema).unwrap().formed.len(), 1);
}

#[test]
fn test_search_window_bounds_candidates() {
    let (bars, extrema) = bullish_abcd();
    let narrow = EngineBuilder::new()
        .only_kinds([PatternKind::FormedAbcd])
        .max_search_window(4)
        .build()
        .unwrap();
    assert!(narrow.scan(&bars, &extrema).unwrap().is_empty());

    let exact = EngineBuilder::new()
        .only_kinds([PatternKind::FormedAbcd])
        .max_search_window(5)
        .build()
        .unwrap();
    assert_eq!(exact.scan(&bars, &extrema).unwrap().formed.len(), 1);
}

#[test]
fn test_extrema_past_candles_dropped() {
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (14, 86.0)]);
    let (_, extrema) = bullish_abcd();
    let report = engine_for(PatternKind::FormedAbcd).scan(&bars, &extrema).unwrap();
    assert!(report.formed.is_empty());
    assert_eq!(report.diagnostics.out_of_range, 1);
}

#[test]
fn test_zero_length_cd_leg_is_degenerate() {
    // D sits exactly on C
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (15, 95.0), (20, 96.0)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 95.0),
        Extremum::low(15, 95.0),
    ];
    let report = wide_abcd_engine(PatternKind::FormedAbcd).scan(&bars, &extrema).unwrap();
    assert!(report.formed.is_empty());
    assert!(report.diagnostics.degenerate_legs >= 1);
}

// ============================================================
// UNFORMED ABCD
// ============================================================

#[test]
fn test_zero_length_bc_leg_is_degenerate() {
    // C sits exactly on B
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 90.0), (12, 91.0)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 90.0),
    ];
    let report = wide_abcd_engine(PatternKind::UnformedAbcd).scan(&bars, &extrema).unwrap();
    assert!(report.unformed.is_empty());
    assert!(report.diagnostics.degenerate_legs >= 1);
}

#[test]
fn test_unformed_abcd_projects_prz() {
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (12, 94.0)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 95.0),
    ];
    let report = engine_for(PatternKind::UnformedAbcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.unformed.len(), 1);
    let m = &report.unformed[0];
    assert_eq!(m.points.len(), 3);
    assert_eq!(m.name, "AB=CD 50/200");
    assert_eq!(m.matched_names, vec!["AB=CD 50/200".to_string()]);

    let zones = m.prz_zones();
    assert_eq!(zones.len(), 1);
    assert!(approx(zones[0].min, 84.6));
    assert!(approx(zones[0].max, 85.4));
    assert_eq!(zones[0].source_pattern_name, "AB=CD 50/200");
    assert!(m.d_lines().is_empty());
}

#[test]
fn test_unformed_abcd_c_hold_is_optional() {
    // price revisits above C after the pattern
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (12, 96.0)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 95.0),
    ];

    let permissive = engine_for(PatternKind::UnformedAbcd);
    let report = permissive.scan(&bars, &extrema).unwrap();
    assert_eq!(report.unformed.len(), 1);
    assert_eq!(report.unformed[0].validation_kind, ValidationKind::Containment);

    let strict = EngineBuilder::new()
        .only_kinds([PatternKind::UnformedAbcd])
        .require_c_hold(true)
        .build()
        .unwrap();
    assert!(strict.scan(&bars, &extrema).unwrap().unformed.is_empty());
}

#[test]
fn test_unformed_abcd_entered_zone_filter() {
    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (14, 85.2)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 95.0),
    ];

    let report = engine_for(PatternKind::UnformedAbcd).scan(&bars, &extrema).unwrap();
    assert_eq!(report.unformed.len(), 1);

    let untouched = EngineBuilder::new()
        .only_kinds([PatternKind::UnformedAbcd])
        .require_untouched_projection(true)
        .build()
        .unwrap();
    let report = untouched.scan(&bars, &extrema).unwrap();
    assert!(report.unformed.is_empty());
    assert_eq!(report.diagnostics.invalidation_rejections, 1);
}

#[test]
fn test_unformed_abcd_merges_names() {
    let catalog = PatternCatalog::from_json(
        r#"{"patterns":[
            {"name":"wide","direction":"bullish","family":"ABCD",
             "ratios":{"bc_retracement":[40,60],"cd_projection":[150,250]}},
            {"name":"narrow","direction":"bullish","family":"ABCD",
             "ratios":{"bc_retracement":[45,55],"cd_projection":[190,210]}}
        ]}"#,
    )
    .unwrap();
    let engine = EngineBuilder::new()
        .catalog(Arc::new(catalog))
        .only_kinds([PatternKind::UnformedAbcd])
        .build()
        .unwrap();

    let bars = zigzag(&[(0, 100.0), (5, 90.0), (10, 95.0), (12, 94.0)]);
    let extrema = vec![
        Extremum::high(0, 100.0),
        Extremum::low(5, 90.0),
        Extremum::high(10, 95.0),
    ];
    let report = engine.scan(&bars, &extrema).unwrap();

    assert_eq!(report.unformed.len(), 1);
    let m = &report.unformed[0];
    assert_eq!(m.name, "wide");
    assert_eq!(m.matched_names, vec!["wide".to_string(), "narrow".to_string()]);
    let zones = m.prz_zones();
    assert_eq!(zones.len(), 2);
    assert!(zones[0].min <= zones[1].min);
    // wide: 95 - 5 * [1.5, 2.5]
    assert_eq!(zones[0].source_pattern_name, "wide");
    assert!(approx(zones[0].min, 82.5));
}

// ============================================================
// XABCD
// ============================================================

#[test]
fn test_formed_gartley() {
    let (bars, extrema) = bullish_gartley();
    let report = engine_for(PatternKind::FormedXabcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.formed.len(), 1);
    let m = &report.formed[0];
    assert_eq!(m.name, "Gartley");
    assert_eq!(m.pattern_type, PatternType::Xabcd);
    assert_eq!(m.points.len(), 5);
    assert!(approx(m.measured_ratios[&Leg::AbXa], 62.0));
    assert!(approx(m.measured_ratios[&Leg::BcAb], 37.0 / 62.0 * 100.0));
    assert!(approx(m.measured_ratios[&Leg::CdBc], 54.0 / 37.0 * 100.0));
    assert!(approx(m.measured_ratios[&Leg::AdXa], 79.0));
    assert!(m.completion_zone.contains(121.0));
}

#[test]
fn test_formed_gartley_bearish_mirror() {
    let bars = zigzag(&[
        (0, 200.0),
        (10, 100.0),
        (20, 162.0),
        (30, 125.0),
        (40, 179.0),
        (50, 160.0),
    ]);
    let extrema = vec![
        Extremum::high(0, 200.0),
        Extremum::low(10, 100.0),
        Extremum::high(20, 162.0),
        Extremum::low(30, 125.0),
        Extremum::high(40, 179.0),
    ];
    let report = engine_for(PatternKind::FormedXabcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.formed.len(), 1);
    let m = &report.formed[0];
    assert_eq!(m.name, "Gartley");
    assert_eq!(m.direction, Direction::Bearish);
    let roles: Vec<Role> = m.points.iter().map(|p| p.role).collect();
    assert_eq!(roles, vec![Role::X, Role::A, Role::B, Role::C, Role::D]);
    assert!(approx(m.measured_ratios[&Leg::AbXa], 62.0));
    assert!(approx(m.measured_ratios[&Leg::AdXa], 79.0));
    assert!(m.completion_zone.contains(179.0));
}

#[test]
fn test_unformed_gartley_bearish_lines() {
    let bars = zigzag(&[
        (0, 200.0),
        (10, 100.0),
        (20, 162.0),
        (30, 125.0),
        (32, 129.0),
    ]);
    let extrema = vec![
        Extremum::high(0, 200.0),
        Extremum::low(10, 100.0),
        Extremum::high(20, 162.0),
        Extremum::low(30, 125.0),
    ];
    let report = engine_for(PatternKind::UnformedXabcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.unformed.len(), 1);
    let m = &report.unformed[0];
    assert_eq!(m.name, "Gartley");
    assert_eq!(m.direction, Direction::Bearish);
    let lines = m.d_lines();
    // mirror of the bullish lines around 150
    assert!(lines.iter().all(|&d| d > 162.0));
    assert!(lines.iter().any(|&d| approx(d, 178.6)));
    assert!(lines.iter().any(|&d| approx(d, 183.6)));
}

#[test]
fn test_xabcd_d_must_pass_b() {
    // D above B: ratios can still fit a wide entry, structure cannot
    let catalog = PatternCatalog::from_json(
        r#"{"patterns":[
            {"name":"loose","direction":"bullish","family":"XABCD",
             "ratios":{"ab_xa":[0,100],"bc_ab":[0,100],"cd_bc":[0,300],"ad_xa":[0,100]}}
        ]}"#,
    )
    .unwrap();
    let engine = EngineBuilder::new()
        .catalog(Arc::new(catalog))
        .only_kinds([PatternKind::FormedXabcd])
        .build()
        .unwrap();

    let bars = zigzag(&[
        (0, 100.0),
        (10, 200.0),
        (20, 138.0),
        (30, 175.0),
        (40, 150.0),
        (50, 160.0),
    ]);
    let extrema = vec![
        Extremum::low(0, 100.0),
        Extremum::high(10, 200.0),
        Extremum::low(20, 138.0),
        Extremum::high(30, 175.0),
        Extremum::low(40, 150.0),
    ];
    let report = engine.scan(&bars, &extrema).unwrap();
    assert!(report.formed.is_empty());
    assert_eq!(report.diagnostics.containment_rejections, 1);
}

#[test]
fn test_unformed_gartley_lines() {
    let bars = zigzag(&[
        (0, 100.0),
        (10, 200.0),
        (20, 138.0),
        (30, 175.0),
        (32, 171.0),
    ]);
    let extrema = vec![
        Extremum::low(0, 100.0),
        Extremum::high(10, 200.0),
        Extremum::low(20, 138.0),
        Extremum::high(30, 175.0),
    ];
    let report = engine_for(PatternKind::UnformedXabcd).scan(&bars, &extrema).unwrap();

    assert_eq!(report.unformed.len(), 1);
    let m = &report.unformed[0];
    assert_eq!(m.name, "Gartley");
    assert_eq!(m.matched_names.len(), 1);
    let lines = m.d_lines();
    assert!(!lines.is_empty());
    assert!(lines.iter().all(|&d| d < 138.0));
    assert!(lines.iter().any(|&d| approx(d, 121.4)));
    assert!(m.prz_zones().is_empty());
}

#[test]
fn test_unformed_touched_lines_dropped() {
    // price already fell through every Gartley line after C
    let bars = zigzag(&[
        (0, 100.0),
        (10, 200.0),
        (20, 138.0),
        (30, 175.0),
        (40, 110.0),
    ]);
    let extrema = vec![
        Extremum::low(0, 100.0),
        Extremum::high(10, 200.0),
        Extremum::low(20, 138.0),
        Extremum::high(30, 175.0),
    ];
    let report = engine_for(PatternKind::UnformedXabcd).scan(&bars, &extrema).unwrap();
    assert!(report.unformed.is_empty());
    assert_eq!(report.diagnostics.invalidation_rejections, 1);
}

// ============================================================
// ENGINE BEHAVIOUR
// ============================================================

#[test]
fn test_all_kinds_together() {
    let (bars, extrema) = bullish_abcd();
    let engine = EngineBuilder::new().build().unwrap();
    let report = engine.scan(&bars, &extrema).unwrap();

    assert_eq!(report.formed.len(), 1);
    // A, B, C of the formed pattern is itself an unformed one
    assert_eq!(report.unformed.len(), 1);
    assert!(report.diagnostics.cache_scans >= 1);
}

#[test]
fn test_sorted_parallel_equals_sequential() {
    let (bars, extrema) = bullish_gartley();
    let sequential = EngineBuilder::new().sort_by_quality(true).build().unwrap();
    let parallel = EngineBuilder::new()
        .sort_by_quality(true)
        .parallel(true)
        .build()
        .unwrap();

    let a = sequential.scan(&bars, &extrema).unwrap();
    let b = parallel.scan(&bars, &extrema).unwrap();
    assert_eq!(a.formed, b.formed);
    assert_eq!(a.unformed, b.unformed);
    assert_eq!(a.diagnostics.candidates, b.diagnostics.candidates);
}

#[test]
fn test_report_serializes() {
    let (bars, extrema) = bullish_abcd();
    let report = EngineBuilder::new().build().unwrap().scan(&bars, &extrema).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let formed = &json["formed"][0];
    assert_eq!(formed["name"], "AB=CD 50/200");
    assert_eq!(formed["pattern_type"], "ABCD");
    assert_eq!(formed["direction"], "bullish");
    assert!(formed["measured_ratios"]["bc_retracement"].is_number());

    let unformed = &json["unformed"][0];
    assert_eq!(unformed["projection"]["kind"], "zones");
    assert!(unformed["projection"]["values"].is_array());
}

#[test]
fn test_candle_struct_deserializes() {
    let candles: Vec<Candle> = serde_json::from_str(
        r#"[{"timestamp":1,"open":1.0,"high":2.0,"low":0.5,"close":1.5},
            {"open":1.5,"high":2.5,"low":1.0,"close":2.0,"volume":10.0}]"#,
    )
    .unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[1].timestamp, 0);
    assert_eq!(candles[1].volume(), 10.0);
}

#[test]
fn test_multi_instrument_scan() {
    let engine = EngineBuilder::new().build().unwrap();
    let (abcd_bars, abcd_extrema) = bullish_abcd();
    let (gartley_bars, gartley_extrema) = bullish_gartley();
    let empty: Vec<TestBar> = vec![];

    let instruments: Vec<(&str, &[TestBar], &[Extremum])> = vec![
        ("ABCD", &abcd_bars[..], &abcd_extrema[..]),
        ("GARTLEY", &gartley_bars[..], &gartley_extrema[..]),
        ("EMPTY", &empty[..], &abcd_extrema[..]),
    ];
    let (results, errors) = scan_parallel(&engine, instruments);

    assert_eq!(results.len(), 2);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, PatternError::EmptyCandles));
    assert!(results.iter().all(|r| !r.report.formed.is_empty()));
}
