//! XABCD detector (Gartley, Bat, Butterfly, Crab and relatives)
//!
//! Bullish: X low, A high, B low, C high, D low. Bearish mirrors.
//!
//! A candidate must satisfy every leg of one named definition; names are
//! never merged.

use std::collections::BTreeMap;

use super::{leg, leg_ratio, Anchor, Findings, HarmonicDetector, SearchContext};
use crate::assembly::{self, PatternPoint, Projection};
use crate::catalog::{Leg, PatternDefinition};
use crate::projection::XabcPrices;
use crate::series::Extremum;
use crate::{Completion, Direction, PatternKind, PatternType, Role, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XabcdDetector {
    completion: Completion,
}

impl XabcdDetector {
    pub fn formed() -> Self {
        Self {
            completion: Completion::Formed,
        }
    }

    pub fn unformed() -> Self {
        Self {
            completion: Completion::Unformed,
        }
    }
}

/// A ratio-valid X, A, B, C prefix
struct Xabc<'s> {
    x: &'s Extremum,
    a: &'s Extremum,
    b: &'s Extremum,
    c: &'s Extremum,
    xa: f64,
    bc: f64,
    ratios: [f64; 2],
    direction: Direction,
}

impl Xabc<'_> {
    fn prices(&self) -> XabcPrices {
        XabcPrices {
            x: self.x.price,
            a: self.a.price,
            b: self.b.price,
            c: self.c.price,
        }
    }
}

impl HarmonicDetector for XabcdDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::new(PatternType::Xabcd, self.completion)
    }

    fn search<T: OHLCV + Sync>(
        &self,
        ctx: &SearchContext<'_, T>,
        anchor: Anchor,
        found: &mut Findings,
    ) {
        let direction = anchor.direction;
        let a_high = Role::A.is_high(direction);
        let Some(x) = ctx.series.side(!a_high).get(anchor.position) else {
            return;
        };

        let definitions: Vec<&PatternDefinition> = ctx
            .catalog
            .definitions(PatternType::Xabcd, direction)
            .collect();
        if definitions.is_empty() {
            return;
        }

        let window = ctx.window();
        let mut by_ab: Vec<&PatternDefinition> = Vec::with_capacity(definitions.len());
        let mut by_bc: Vec<&PatternDefinition> = Vec::with_capacity(definitions.len());

        for a in ctx.series.after(a_high, x.bar_index, window) {
            let xa = leg(a.price, x.price, a_high);
            if xa <= 0.0 {
                if xa == 0.0 {
                    found.diagnostics.degenerate_legs += 1;
                }
                continue;
            }

            for b in ctx.series.after(!a_high, a.bar_index, window) {
                let ab = leg(a.price, b.price, a_high);
                let Some(ab_xa) = leg_ratio(ab, xa) else {
                    found.diagnostics.degenerate_legs += 1;
                    continue;
                };
                by_ab.clear();
                by_ab.extend(
                    definitions
                        .iter()
                        .copied()
                        .filter(|d| d.admits(Leg::AbXa, ab_xa)),
                );
                if by_ab.is_empty() {
                    found.diagnostics.catalog_misses += 1;
                    continue;
                }

                for c in ctx.series.after(a_high, b.bar_index, window) {
                    let bc = leg(c.price, b.price, a_high);
                    let Some(bc_ab) = leg_ratio(bc, ab) else {
                        found.diagnostics.degenerate_legs += 1;
                        continue;
                    };
                    by_bc.clear();
                    by_bc.extend(
                        by_ab
                            .iter()
                            .copied()
                            .filter(|d| d.admits(Leg::BcAb, bc_ab)),
                    );
                    if by_bc.is_empty() {
                        found.diagnostics.catalog_misses += 1;
                        continue;
                    }

                    let xabc = Xabc {
                        x,
                        a,
                        b,
                        c,
                        xa,
                        bc,
                        ratios: [ab_xa, bc_ab],
                        direction,
                    };
                    match self.completion {
                        Completion::Formed => search_d(ctx, &xabc, &by_bc, found),
                        Completion::Unformed => emit_unformed(ctx, &xabc, &by_bc, found),
                    }
                    if found.is_full() {
                        return;
                    }
                }
            }
        }
    }
}

fn search_d<T: OHLCV + Sync>(
    ctx: &SearchContext<'_, T>,
    xabc: &Xabc<'_>,
    retained: &[&PatternDefinition],
    found: &mut Findings,
) {
    let Xabc {
        x,
        a,
        b,
        c,
        xa,
        bc,
        ratios: [ab_xa, bc_ab],
        direction,
    } = *xabc;
    let a_high = Role::A.is_high(direction);
    let c_high = Role::C.is_high(direction);

    for d in ctx.series.after(!c_high, c.bar_index, ctx.window()) {
        let Some(cd_bc) = leg_ratio(leg(c.price, d.price, c_high), bc) else {
            found.diagnostics.degenerate_legs += 1;
            continue;
        };
        let Some(ad_xa) = leg_ratio(leg(a.price, d.price, a_high), xa) else {
            found.diagnostics.degenerate_legs += 1;
            continue;
        };

        let names: Vec<&PatternDefinition> = retained
            .iter()
            .copied()
            .filter(|def| def.admits(Leg::CdBc, cd_bc) && def.admits(Leg::AdXa, ad_xa))
            .collect();
        if names.is_empty() {
            found.diagnostics.catalog_misses += 1;
            continue;
        }
        found.diagnostics.candidates += 1;

        if !ctx.in_range(&[x, a, b, c, d]) {
            found.diagnostics.out_of_range += 1;
            continue;
        }

        let bars = [x.bar_index, a.bar_index, b.bar_index, c.bar_index, d.bar_index];
        let prices = [x.price, a.price, b.price, c.price, d.price];
        if ctx.config.strict_validation
            && !ctx
                .validator
                .validate(PatternType::Xabcd, Completion::Formed, &bars, &prices, direction)
        {
            found.diagnostics.containment_rejections += 1;
            detail!(ctx, ?bars, ?direction, "XABCD rejected: containment");
            continue;
        }

        let accepted: Vec<(&PatternDefinition, crate::projection::PriceZone)> = names
            .iter()
            .filter_map(|def| {
                let zone = ctx.projector.xabcd_zone(xabc.prices(), def, direction)?;
                zone.contains(d.price).then_some((*def, zone))
            })
            .collect();
        if accepted.is_empty() {
            found.diagnostics.projection_rejections += 1;
            detail!(ctx, ?bars, d = d.price, "XABCD rejected: D outside completion zone");
            continue;
        }

        if ctx.config.validate_d_crossing && ctx.checker.is_crossed(d.bar_index, d.price, direction)
        {
            found.diagnostics.invalidation_rejections += 1;
            detail!(ctx, ?bars, d = d.price, "XABCD rejected: D crossed");
            continue;
        }

        let ratios = BTreeMap::from([
            (Leg::AbXa, ab_xa),
            (Leg::BcAb, bc_ab),
            (Leg::CdBc, cd_bc),
            (Leg::AdXa, ad_xa),
        ]);
        let points = vec![
            PatternPoint::new(Role::X, x),
            PatternPoint::new(Role::A, a),
            PatternPoint::new(Role::B, b),
            PatternPoint::new(Role::C, c),
            PatternPoint::new(Role::D, d),
        ];
        let confluence = accepted.len();
        let kind = ctx.validation_kind(Completion::Formed);

        for (def, zone) in accepted {
            detail!(ctx, name = def.name(), ?bars, "XABCD formed");
            found.formed.push(assembly::formed(
                def,
                points.clone(),
                ratios.clone(),
                kind,
                zone,
                confluence,
            ));
            if found.is_full() {
                return;
            }
        }
    }
}

fn emit_unformed<T: OHLCV + Sync>(
    ctx: &SearchContext<'_, T>,
    xabc: &Xabc<'_>,
    retained: &[&PatternDefinition],
    found: &mut Findings,
) {
    let Xabc {
        x,
        a,
        b,
        c,
        ratios: [ab_xa, bc_ab],
        direction,
        ..
    } = *xabc;
    found.diagnostics.candidates += 1;

    if !ctx.in_range(&[x, a, b, c]) {
        found.diagnostics.out_of_range += 1;
        return;
    }

    let bars = [x.bar_index, a.bar_index, b.bar_index, c.bar_index];
    let prices = [x.price, a.price, b.price, c.price];
    if ctx.config.strict_validation
        && !ctx
            .validator
            .validate(PatternType::Xabcd, Completion::Unformed, &bars, &prices, direction)
    {
        found.diagnostics.containment_rejections += 1;
        detail!(ctx, ?bars, ?direction, "unformed XABCD rejected: containment");
        return;
    }

    let kind = ctx.validation_kind(Completion::Unformed);
    for &def in retained {
        let Some(mut lines) = ctx.projector.xabcd_lines(xabc.prices(), def, direction) else {
            found.diagnostics.degenerate_legs += 1;
            continue;
        };
        if lines.is_empty() {
            found.diagnostics.projection_rejections += 1;
            continue;
        }

        if ctx.config.validate_d_crossing {
            lines.retain(|&price| !ctx.checker.is_touched(c.bar_index, price, direction));
            if lines.is_empty() {
                found.diagnostics.invalidation_rejections += 1;
                detail!(ctx, name = def.name(), ?bars, "unformed XABCD rejected: lines touched");
                continue;
            }
        }

        let points = vec![
            PatternPoint::new(Role::X, x),
            PatternPoint::new(Role::A, a),
            PatternPoint::new(Role::B, b),
            PatternPoint::new(Role::C, c),
        ];
        let ratios = BTreeMap::from([(Leg::AbXa, ab_xa), (Leg::BcAb, bc_ab)]);
        let projection = Projection::Lines(lines);
        if let Some(m) = assembly::unformed(&[def], points, ratios, kind, projection) {
            detail!(ctx, name = %m.name, ?bars, lines = m.d_lines().len(), "XABCD unformed");
            found.unformed.push(m);
        }
        if found.is_full() {
            return;
        }
    }
}
