//! ABCD detector
//!
//! Bullish: A high, B low, C high, D low. Bearish mirrors.
//!
//! Ratios: `bc_retracement = BC / AB`, `cd_projection = CD / BC`, in percent.

use std::collections::BTreeMap;

use super::{leg, leg_ratio, Anchor, Findings, HarmonicDetector, SearchContext};
use crate::assembly::{self, PatternPoint, Projection, PrzZone};
use crate::catalog::{Leg, PatternDefinition};
use crate::series::Extremum;
use crate::{Completion, Direction, PatternKind, PatternType, Role, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbcdDetector {
    completion: Completion,
}

impl AbcdDetector {
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

impl HarmonicDetector for AbcdDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::new(PatternType::Abcd, self.completion)
    }

    fn search<T: OHLCV + Sync>(
        &self,
        ctx: &SearchContext<'_, T>,
        anchor: Anchor,
        found: &mut Findings,
    ) {
        let direction = anchor.direction;
        let a_high = Role::A.is_high(direction);
        let Some(a) = ctx.series.side(a_high).get(anchor.position) else {
            return;
        };

        let definitions: Vec<&PatternDefinition> = ctx
            .catalog
            .definitions(PatternType::Abcd, direction)
            .collect();
        if definitions.is_empty() {
            return;
        }

        let window = ctx.window();
        let mut retained: Vec<&PatternDefinition> = Vec::with_capacity(definitions.len());

        for b in ctx.series.after(!a_high, a.bar_index, window) {
            let ab = leg(a.price, b.price, a_high);
            if ab <= 0.0 {
                if ab == 0.0 {
                    found.diagnostics.degenerate_legs += 1;
                }
                continue;
            }

            for c in ctx.series.after(a_high, b.bar_index, window) {
                let bc = leg(c.price, b.price, a_high);
                let Some(retracement) = leg_ratio(bc, ab) else {
                    found.diagnostics.degenerate_legs += 1;
                    continue;
                };

                retained.clear();
                retained.extend(
                    definitions
                        .iter()
                        .copied()
                        .filter(|d| d.admits(Leg::BcRetracement, retracement)),
                );
                if retained.is_empty() {
                    found.diagnostics.catalog_misses += 1;
                    continue;
                }

                let abc = Abc {
                    a,
                    b,
                    c,
                    bc,
                    retracement,
                    direction,
                };
                match self.completion {
                    Completion::Formed => search_d(ctx, &abc, &retained, found),
                    Completion::Unformed => emit_unformed(ctx, &abc, &retained, found),
                }
                if found.is_full() {
                    return;
                }
            }
        }
    }
}

/// A ratio-valid A, B, C prefix
struct Abc<'s> {
    a: &'s Extremum,
    b: &'s Extremum,
    c: &'s Extremum,
    bc: f64,
    retracement: f64,
    direction: Direction,
}

fn search_d<T: OHLCV + Sync>(
    ctx: &SearchContext<'_, T>,
    abc: &Abc<'_>,
    retained: &[&PatternDefinition],
    found: &mut Findings,
) {
    let Abc {
        a,
        b,
        c,
        bc,
        retracement,
        direction,
    } = *abc;
    let c_high = Role::C.is_high(direction);

    for d in ctx.series.after(!c_high, c.bar_index, ctx.window()) {
        let cd = leg(c.price, d.price, c_high);
        let Some(projection) = leg_ratio(cd, bc) else {
            found.diagnostics.degenerate_legs += 1;
            continue;
        };

        let names: Vec<&PatternDefinition> = retained
            .iter()
            .copied()
            .filter(|def| def.admits(Leg::CdProjection, projection))
            .collect();
        if names.is_empty() {
            found.diagnostics.catalog_misses += 1;
            continue;
        }
        found.diagnostics.candidates += 1;

        if !ctx.in_range(&[a, b, c, d]) {
            found.diagnostics.out_of_range += 1;
            continue;
        }

        let bars = [a.bar_index, b.bar_index, c.bar_index, d.bar_index];
        let prices = [a.price, b.price, c.price, d.price];
        if ctx.config.strict_validation
            && !ctx
                .validator
                .validate(PatternType::Abcd, Completion::Formed, &bars, &prices, direction)
        {
            found.diagnostics.containment_rejections += 1;
            detail!(ctx, ?bars, ?direction, "ABCD rejected: containment");
            continue;
        }

        let accepted: Vec<(&PatternDefinition, crate::projection::PriceZone)> = names
            .iter()
            .filter_map(|def| {
                let zone = ctx
                    .projector
                    .abcd_prz(c.price, bc, def.range(Leg::CdProjection)?, direction);
                zone.contains(d.price).then_some((*def, zone))
            })
            .collect();
        if accepted.is_empty() {
            found.diagnostics.projection_rejections += 1;
            detail!(ctx, ?bars, d = d.price, "ABCD rejected: D outside PRZ");
            continue;
        }

        if ctx.config.validate_d_crossing && ctx.checker.is_crossed(d.bar_index, d.price, direction)
        {
            found.diagnostics.invalidation_rejections += 1;
            detail!(ctx, ?bars, d = d.price, "ABCD rejected: D crossed");
            continue;
        }

        let ratios = BTreeMap::from([
            (Leg::BcRetracement, retracement),
            (Leg::CdProjection, projection),
        ]);
        let points = vec![
            PatternPoint::new(Role::A, a),
            PatternPoint::new(Role::B, b),
            PatternPoint::new(Role::C, c),
            PatternPoint::new(Role::D, d),
        ];
        let confluence = accepted.len();
        let kind = ctx.validation_kind(Completion::Formed);

        for (def, zone) in accepted {
            detail!(ctx, name = def.name(), ?bars, "ABCD formed");
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
    abc: &Abc<'_>,
    retained: &[&PatternDefinition],
    found: &mut Findings,
) {
    let Abc {
        a,
        b,
        c,
        bc,
        retracement,
        direction,
    } = *abc;
    found.diagnostics.candidates += 1;

    if !ctx.in_range(&[a, b, c]) {
        found.diagnostics.out_of_range += 1;
        return;
    }

    let bars = [a.bar_index, b.bar_index, c.bar_index];
    let prices = [a.price, b.price, c.price];
    if ctx.config.strict_validation
        && !ctx
            .validator
            .validate(PatternType::Abcd, Completion::Unformed, &bars, &prices, direction)
    {
        found.diagnostics.containment_rejections += 1;
        detail!(ctx, ?bars, ?direction, "unformed ABCD rejected: containment");
        return;
    }

    let zones = ctx
        .projector
        .abcd_zones(c.price, bc, retained.iter().copied(), direction);
    if zones.is_empty() {
        found.diagnostics.projection_rejections += 1;
        return;
    }

    if ctx.config.require_untouched_projection
        && zones
            .iter()
            .any(|(_, zone)| ctx.checker.zone_entered(c.bar_index, *zone, direction))
    {
        found.diagnostics.invalidation_rejections += 1;
        detail!(ctx, ?bars, "unformed ABCD rejected: PRZ already entered");
        return;
    }

    let zones: Vec<PrzZone> = zones
        .into_iter()
        .map(|(def, zone)| PrzZone {
            min: zone.min,
            max: zone.max,
            source_pattern_name: def.name().to_string(),
        })
        .collect();
    let points = vec![
        PatternPoint::new(Role::A, a),
        PatternPoint::new(Role::B, b),
        PatternPoint::new(Role::C, c),
    ];
    let ratios = BTreeMap::from([(Leg::BcRetracement, retracement)]);

    if let Some(m) = assembly::unformed(
        retained,
        points,
        ratios,
        ctx.validation_kind(Completion::Unformed),
        Projection::Zones(zones),
    ) {
        detail!(ctx, name = %m.name, ?bars, zones = m.prz_zones().len(), "ABCD unformed");
        found.unformed.push(m);
    }
}
