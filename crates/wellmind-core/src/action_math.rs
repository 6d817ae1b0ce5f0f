//! Pricing and preview math for player actions. Nothing here mutates state.
//!
//! Two flux models coexist. Simulation flux (`amount * spin`) drives the push
//! applied to the opposite well and is never special-cased. Cost flux uses the
//! same product for previews, but the zero-pair price substitutes a spin of
//! exactly `0` with `1` ("zero rule"). The asymmetry is a pricing floor and is
//! kept as-is.

use serde::{Deserialize, Serialize};

use crate::config::WellConfig;
use crate::state::Well;
use crate::{CHANGE_EPSILON, WELL_COUNT, opposite};

/// Opposite wells at or below this amount do not receive a push.
pub const OPPOSITE_AMOUNT_EPSILON: f64 = 0.001;

/// Outcome of pricing a proposed `(amount, spin)` for one well.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplyPreview {
    pub index: usize,
    /// Raw energy cost before trait multipliers; `0` unless `changed`.
    pub cost: f64,
    pub changed: bool,
    /// Simulation flux delta, `A1*S1 - A0*S0`.
    pub impulse_sim: f64,
    /// Cost flux delta.
    pub impulse_cost: f64,
    /// One-time flux nudge for the opposite well, `-push_k * impulse_sim`.
    pub push: f64,
    pub a0: f64,
    pub s0: f64,
    pub a1: f64,
    pub s1: f64,
}

/// Zero-pair price in both path directions plus the averaged canonical price.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ZeroPairCost {
    /// Path cost when the selected well is zeroed first.
    pub forward: f64,
    /// Path cost when the opposite well is zeroed first.
    pub reverse: f64,
    pub canonical: f64,
}

/// Price moving well `index` to the given targets.
///
/// Targets are clamped to the hard ranges. Out-of-range indices and
/// non-finite current state yield an unchanged, zero-cost preview.
#[must_use]
pub fn compute_apply_preview(
    config: &WellConfig,
    wells: &[Well; WELL_COUNT],
    index: usize,
    target_amount: f64,
    target_spin: f64,
) -> ApplyPreview {
    let Some(current) = wells.get(index).copied() else {
        return ApplyPreview::default();
    };
    if !current.amount.is_finite() || !current.spin.is_finite() {
        return ApplyPreview {
            index,
            ..ApplyPreview::default()
        };
    }

    let a0 = current.amount;
    let s0 = current.spin;
    let a1 = if target_amount.is_finite() {
        config.clamp_amount(target_amount)
    } else {
        a0
    };
    let s1 = if target_spin.is_finite() {
        config.clamp_spin(target_spin)
    } else {
        s0
    };

    let changed = (a1 - a0).abs() > CHANGE_EPSILON || (s1 - s0).abs() > CHANGE_EPSILON;
    let impulse_sim = a1 * s1 - a0 * s0;
    let impulse_cost = a1 * s1 - a0 * s0;
    let cost = if changed {
        impulse_cost.abs() / config.cost_norm
    } else {
        0.0
    };

    ApplyPreview {
        index,
        cost,
        changed,
        impulse_sim,
        impulse_cost,
        push: -config.push_k * impulse_sim,
        a0,
        s0,
        a1,
        s1,
    }
}

/// New spin for a well receiving a flux `push`, clamped to the soft range.
///
/// Returns `None` when the push is negligible or the well is empty.
#[must_use]
pub fn pushed_spin(config: &WellConfig, well: Well, push: f64) -> Option<f64> {
    if push.abs() <= CHANGE_EPSILON || well.amount <= OPPOSITE_AMOUNT_EPSILON {
        return None;
    }
    let flux = well.flux() + push;
    Some(config.clamp_spin_soft(flux / well.amount))
}

fn spin_for_cost(spin: f64) -> f64 {
    if spin == 0.0 { 1.0 } else { spin }
}

fn zero_spin_cost(config: &WellConfig, well: Well) -> f64 {
    let before = well.amount * spin_for_cost(well.spin);
    let after = well.amount * spin_for_cost(0.0);
    (after - before).abs() / config.cost_norm
}

/// Cost of zeroing `first` and then its opposite, including the push the
/// first step lands on the opposite well.
fn zero_pair_path_cost(config: &WellConfig, wells: &[Well; WELL_COUNT], first: usize) -> f64 {
    let second = opposite(first);
    let mut scratch = *wells;

    let leading = scratch[first];
    let first_cost = zero_spin_cost(config, leading);
    let push = -config.push_k * (0.0 - leading.flux());
    scratch[first].spin = 0.0;
    if let Some(spin) = pushed_spin(config, scratch[second], push) {
        scratch[second].spin = spin;
    }

    first_cost + zero_spin_cost(config, scratch[second])
}

/// Canonical price of zeroing `index` and its opposite together.
///
/// Both orders are simulated and averaged, so the price of a pair does not
/// depend on which side was selected.
#[must_use]
pub fn compute_zero_pair_cost(
    config: &WellConfig,
    wells: &[Well; WELL_COUNT],
    index: usize,
) -> ZeroPairCost {
    if index >= WELL_COUNT {
        return ZeroPairCost::default();
    }
    let forward = zero_pair_path_cost(config, wells, index);
    let reverse = zero_pair_path_cost(config, wells, opposite(index));
    ZeroPairCost {
        forward,
        reverse,
        canonical: (forward + reverse) / 2.0,
    }
}

/// Shorthand for the canonical zero-pair price.
#[must_use]
pub fn compute_zero_pair_cost_canonical(
    config: &WellConfig,
    wells: &[Well; WELL_COUNT],
    index: usize,
) -> f64 {
    compute_zero_pair_cost(config, wells, index).canonical
}

/// Whole energy units charged for `cost` on the whole-unit path.
#[must_use]
pub fn cost_to_units(cost: f64) -> u64 {
    if !cost.is_finite() || cost <= 0.0 {
        return 0;
    }
    cost.round() as u64
}

/// Whole energy units available to spend; partial units are not spendable.
#[must_use]
pub fn energy_to_units(energy: f64) -> u64 {
    if !energy.is_finite() || energy <= 0.0 {
        return 0;
    }
    energy.floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn flat_wells() -> [Well; WELL_COUNT] {
        [Well::new(50.0, 0.0); WELL_COUNT]
    }

    #[test]
    fn preview_prices_flux_impulse() {
        let config = WellConfig::default();
        let preview = compute_apply_preview(&config, &flat_wells(), 0, 50.0, 40.0);
        assert!(preview.changed);
        assert!(approx_eq(preview.impulse_sim, 2_000.0));
        assert!(approx_eq(preview.cost, 8.0));
        assert!(approx_eq(preview.push, -500.0));
        assert_eq!((preview.a0, preview.s0), (50.0, 0.0));
        assert_eq!((preview.a1, preview.s1), (50.0, 40.0));
    }

    #[test]
    fn preview_clamps_targets_to_hard_ranges() {
        let config = WellConfig::default();
        let preview = compute_apply_preview(&config, &flat_wells(), 2, 500.0, -900.0);
        assert_eq!(preview.a1, config.amount_max);
        assert_eq!(preview.s1, config.spin_min);
    }

    #[test]
    fn unchanged_preview_is_free_even_with_flux() {
        let config = WellConfig::default();
        let mut wells = flat_wells();
        wells[1] = Well::new(80.0, 60.0);
        let preview = compute_apply_preview(&config, &wells, 1, 80.0, 60.0);
        assert!(!preview.changed);
        assert_eq!(preview.cost, 0.0);
    }

    #[test]
    fn invalid_index_yields_empty_preview() {
        let config = WellConfig::default();
        let preview = compute_apply_preview(&config, &flat_wells(), 6, 90.0, 90.0);
        assert_eq!(preview, ApplyPreview::default());
    }

    #[test]
    fn non_finite_targets_keep_current_values() {
        let config = WellConfig::default();
        let preview = compute_apply_preview(&config, &flat_wells(), 0, f64::NAN, f64::INFINITY);
        assert!(!preview.changed);
        assert_eq!(preview.cost, 0.0);
    }

    #[test]
    fn push_skips_empty_or_negligible_targets() {
        let config = WellConfig::default();
        assert!(pushed_spin(&config, Well::new(50.0, 10.0), 1e-12).is_none());
        assert!(pushed_spin(&config, Well::new(0.0005, 10.0), 100.0).is_none());
        let spin = pushed_spin(&config, Well::new(50.0, 10.0), -1_000.0).expect("pushed");
        assert!(approx_eq(spin, -10.0));
    }

    #[test]
    fn push_is_clamped_to_soft_range_not_hard_range() {
        let config = WellConfig::default();
        let spin = pushed_spin(&config, Well::new(25.0, 90.0), 3_000.0).expect("pushed");
        assert!(approx_eq(spin, 210.0));
        let spin = pushed_spin(&config, Well::new(25.0, 90.0), 30_000.0).expect("pushed");
        assert_eq!(spin, config.spin_soft_max);
    }

    #[test]
    fn zero_rule_prices_an_already_zero_pair_at_nothing() {
        let config = WellConfig::default();
        let cost = compute_zero_pair_cost(&config, &flat_wells(), 0);
        assert_eq!(cost.canonical, 0.0);
    }

    #[test]
    fn zero_rule_applies_only_to_the_pair_price() {
        let config = WellConfig::default();
        let mut wells = flat_wells();
        wells[0] = Well::new(50.0, 1.0);
        // A spin of exactly 1 already matches the zero-rule substitute, so the
        // first step is free; its push leaves well 3 at spin 0.25.
        let pair = compute_zero_pair_cost(&config, &wells, 0);
        assert!(approx_eq(pair.forward, (50.0 - 12.5) / 250.0));
        assert!(approx_eq(pair.reverse, 0.0));
        // The general preview never substitutes.
        let preview = compute_apply_preview(&config, &wells, 0, 50.0, 0.0);
        assert!(approx_eq(preview.cost, 50.0 / 250.0));
    }

    #[test]
    fn zero_pair_cost_follows_the_pushed_path() {
        let config = WellConfig::default();
        let mut wells = flat_wells();
        wells[0] = Well::new(50.0, 40.0);
        wells[3] = Well::new(25.0, 0.0);
        let pair = compute_zero_pair_cost(&config, &wells, 0);
        // forward: zero 0 (|50 - 2000| / 250), push 500 flux into well 3 -> spin 20,
        // then zero 3 (|25 - 500| / 250).
        let forward = (1_950.0 + 475.0) / 250.0;
        // reverse: well 3 is already 0 (free), no push, then zero 0.
        let reverse = 1_950.0 / 250.0;
        assert!(approx_eq(pair.forward, forward));
        assert!(approx_eq(pair.reverse, reverse));
        assert!(approx_eq(pair.canonical, (forward + reverse) / 2.0));
    }

    #[test]
    fn canonical_pair_price_is_symmetric() {
        let config = WellConfig::default();
        let wells = [
            Well::new(30.0, 12.0),
            Well::new(90.0, -70.0),
            Well::new(55.0, 5.5),
            Well::new(41.0, -33.0),
            Well::new(100.0, 100.0),
            Well::new(25.0, -0.25),
        ];
        for i in 0..WELL_COUNT {
            assert_eq!(
                compute_zero_pair_cost_canonical(&config, &wells, i),
                compute_zero_pair_cost_canonical(&config, &wells, opposite(i))
            );
        }
    }

    #[test]
    fn unit_conversion_rounds_cost_and_floors_energy() {
        assert_eq!(cost_to_units(2.4), 2);
        assert_eq!(cost_to_units(2.5), 3);
        assert_eq!(cost_to_units(-1.0), 0);
        assert_eq!(cost_to_units(f64::NAN), 0);
        assert_eq!(energy_to_units(4.99), 4);
        assert_eq!(energy_to_units(-3.0), 0);
    }
}
