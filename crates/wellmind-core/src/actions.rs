//! The action layer: the only path through which player actions mutate wells
//! and spend energy.
//!
//! Every operation either fully succeeds (state written, energy deducted,
//! controls revision bumped) or fails with an [`ActionError`] and leaves the
//! state untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action_math::{
    ApplyPreview, compute_apply_preview, compute_zero_pair_cost, cost_to_units, energy_to_units,
    pushed_spin,
};
use crate::collab::TraitRules;
use crate::config::WellConfig;
use crate::state::SimState;
use crate::{CHANGE_EPSILON, is_valid_index, opposite};

/// How an action's cost is charged against the energy pool.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChargeMode {
    /// Round the cost to whole units and compare against whole units of energy.
    #[default]
    Integer,
    /// Compare and deduct the exact float cost.
    Float,
}

/// Reasons an action can fail. `reason()` gives the stable wire code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("well index {0} is out of range")]
    InvalidIndex(usize),
    #[error("no well is selected")]
    NoSelection,
    #[error("action would not change anything")]
    Noop,
    #[error("wells are already in the requested state")]
    NoChange,
    #[error("insufficient energy: need {needed}, have {available}")]
    NoEnergy { needed: f64, available: f64 },
    #[error("unknown action `{0}`")]
    MissingAction(String),
    #[error("action `{action}` expects {expected} argument(s)")]
    MissingArgs { action: String, expected: usize },
    #[error("the level is no longer being played")]
    NotPlaying,
    #[error("action implementation panicked: {0}")]
    DispatchPanicked(String),
}

impl ActionError {
    /// Stable reason code surfaced to the UI.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidIndex(_) => "invalid_idx",
            Self::NoSelection => "nosel",
            Self::Noop => "noop",
            Self::NoChange => "nochange",
            Self::NoEnergy { .. } => "noenergy",
            Self::MissingAction(_) => "missing_action",
            Self::MissingArgs { .. } => "missing_args",
            Self::NotPlaying => "not_playing",
            Self::DispatchPanicked(_) => "dispatch_throw",
        }
    }
}

/// Details of a successful action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionReceipt {
    pub index: Option<usize>,
    /// Cost after trait multipliers, before unit rounding.
    pub cost: f64,
    /// Energy actually removed from the pool.
    pub charged: f64,
    pub changed: bool,
    /// Spin written to the opposite well by the push, if any.
    pub opposite_spin: Option<f64>,
    pub preview: Option<ApplyPreview>,
}

/// Borrowed view that applies actions against a [`SimState`].
pub struct ActionLayer<'a> {
    config: &'a WellConfig,
    traits: &'a dyn TraitRules,
}

impl<'a> ActionLayer<'a> {
    #[must_use]
    pub fn new(config: &'a WellConfig, traits: &'a dyn TraitRules) -> Self {
        Self { config, traits }
    }

    fn resolve_index(state: &SimState, index: Option<usize>) -> Result<usize, ActionError> {
        match index {
            Some(index) if is_valid_index(index) => Ok(index),
            Some(index) => Err(ActionError::InvalidIndex(index)),
            None => state.selected().ok_or(ActionError::NoSelection),
        }
    }

    fn cost_mult(&self) -> f64 {
        let mult = self.traits.energy_cost_mult();
        if mult.is_finite() && mult >= 0.0 { mult } else { 1.0 }
    }

    /// Work out what `cost` would charge, or why it cannot be paid.
    fn charge_for(&self, energy: f64, cost: f64, mode: ChargeMode) -> Result<f64, ActionError> {
        match mode {
            ChargeMode::Integer => {
                let needed = cost_to_units(cost);
                let available = energy_to_units(energy);
                if needed > available {
                    return Err(ActionError::NoEnergy {
                        needed: needed as f64,
                        available: available as f64,
                    });
                }
                Ok(needed as f64)
            }
            ChargeMode::Float => {
                if cost > energy + CHANGE_EPSILON {
                    return Err(ActionError::NoEnergy {
                        needed: cost,
                        available: energy,
                    });
                }
                Ok(cost.min(energy))
            }
        }
    }

    /// Change the selected well.
    pub fn select_well(
        &self,
        state: &mut SimState,
        index: usize,
    ) -> Result<ActionReceipt, ActionError> {
        if !is_valid_index(index) {
            return Err(ActionError::InvalidIndex(index));
        }
        state.select(Some(index));
        state.bump_controls_revision();
        Ok(ActionReceipt {
            index: Some(index),
            ..ActionReceipt::default()
        })
    }

    /// Commit a computed preview: charge energy, write the well and push its opposite.
    pub fn apply_preview_to_sim(
        &self,
        state: &mut SimState,
        preview: &ApplyPreview,
        mode: ChargeMode,
    ) -> Result<ActionReceipt, ActionError> {
        let index = preview.index;
        if !is_valid_index(index) {
            return Err(ActionError::InvalidIndex(index));
        }
        let cost = preview.cost * self.cost_mult();
        let charged = self.charge_for(state.energy(), cost, mode)?;

        let target = opposite(index);
        let config = self.config;
        let opposite_spin = state.guarded("apply_preview", |s| {
            s.set_energy(config.clamp_energy(s.energy() - charged));
            s.set_amount(index, preview.a1);
            s.set_spin(index, preview.s1);
            let pushed = s
                .well(target)
                .and_then(|well| pushed_spin(config, well, preview.push));
            if let Some(spin) = pushed {
                s.set_spin(target, spin);
            }
            pushed
        });
        state.bump_controls_revision();

        Ok(ActionReceipt {
            index: Some(index),
            cost,
            charged,
            changed: preview.changed,
            opposite_spin,
            preview: Some(*preview),
        })
    }

    /// Move a well to absolute targets (clamped to the hard ranges).
    pub fn apply_target(
        &self,
        state: &mut SimState,
        index: Option<usize>,
        amount: f64,
        spin: f64,
        mode: ChargeMode,
    ) -> Result<ActionReceipt, ActionError> {
        let index = Self::resolve_index(state, index)?;
        let preview = compute_apply_preview(self.config, state.wells(), index, amount, spin);
        self.apply_preview_to_sim(state, &preview, mode)
    }

    /// Nudge a well by relative amounts from its current (clamped) state.
    pub fn flick_step(
        &self,
        state: &mut SimState,
        index: Option<usize>,
        d_amount: f64,
        d_spin: f64,
        mode: ChargeMode,
    ) -> Result<ActionReceipt, ActionError> {
        let index = Self::resolve_index(state, index)?;
        let d_amount = if d_amount.is_finite() { d_amount } else { 0.0 };
        let d_spin = if d_spin.is_finite() { d_spin } else { 0.0 };
        if d_amount.abs() <= CHANGE_EPSILON && d_spin.abs() <= CHANGE_EPSILON {
            return Err(ActionError::Noop);
        }
        let Some(well) = state.well(index) else {
            return Err(ActionError::InvalidIndex(index));
        };
        let base_amount = self.config.clamp_amount(well.amount);
        let base_spin = self.config.clamp_spin(well.spin);
        let preview = compute_apply_preview(
            self.config,
            state.wells(),
            index,
            base_amount + d_amount,
            base_spin + d_spin,
        );
        if !preview.changed {
            return Err(ActionError::Noop);
        }
        self.apply_preview_to_sim(state, &preview, mode)
    }

    /// Set one well's spin to zero, leaving its amount alone.
    pub fn spin_zero(
        &self,
        state: &mut SimState,
        index: Option<usize>,
        mode: ChargeMode,
    ) -> Result<ActionReceipt, ActionError> {
        let index = Self::resolve_index(state, index)?;
        let Some(well) = state.well(index) else {
            return Err(ActionError::InvalidIndex(index));
        };
        let preview = compute_apply_preview(self.config, state.wells(), index, well.amount, 0.0);
        self.apply_preview_to_sim(state, &preview, mode)
    }

    /// Zero a well and its opposite together at the canonical pair price.
    ///
    /// Both spins are written at once, so no push is generated. Always charged
    /// in whole units.
    pub fn zero_pair(
        &self,
        state: &mut SimState,
        index: Option<usize>,
    ) -> Result<ActionReceipt, ActionError> {
        let index = Self::resolve_index(state, index)?;
        let target = opposite(index);
        let (Some(first), Some(second)) = (state.well(index), state.well(target)) else {
            return Err(ActionError::InvalidIndex(index));
        };
        if first.spin.abs() <= CHANGE_EPSILON && second.spin.abs() <= CHANGE_EPSILON {
            return Err(ActionError::NoChange);
        }

        let pair = compute_zero_pair_cost(self.config, state.wells(), index);
        let cost = pair.canonical * self.cost_mult();
        let charged = self.charge_for(state.energy(), cost, ChargeMode::Integer)?;

        let config = self.config;
        state.guarded("zero_pair", |s| {
            s.set_energy(config.clamp_energy(s.energy() - charged));
            s.set_spin(index, 0.0);
            s.set_spin(target, 0.0);
        });
        state.bump_controls_revision();

        Ok(ActionReceipt {
            index: Some(index),
            cost,
            charged,
            changed: true,
            opposite_spin: Some(0.0),
            preview: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WELL_COUNT;
    use crate::collab::{NeutralTraits, TraitModifiers};
    use crate::state::Well;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn state_with(wells: [Well; WELL_COUNT], energy: f64) -> SimState {
        SimState::new(wells, [200.0; WELL_COUNT], energy)
    }

    #[test]
    fn flick_step_writes_targets_and_pushes_opposite() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut state = state_with([Well::new(50.0, 0.0); WELL_COUNT], 100.0);

        let receipt = layer
            .flick_step(&mut state, Some(1), 0.0, 40.0, ChargeMode::Float)
            .expect("flick");
        assert!(approx_eq(receipt.charged, 8.0));
        assert!(approx_eq(state.energy(), 92.0));
        assert_eq!(state.well(1), Some(Well::new(50.0, 40.0)));
        assert!(approx_eq(state.well(4).map_or(0.0, |w| w.spin), -10.0));
        assert_eq!(state.controls_revision(), 1);
        assert_eq!(state.unguarded_writes(), 0);
    }

    #[test]
    fn integer_mode_charges_rounded_units() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut state = state_with([Well::new(50.0, 0.0); WELL_COUNT], 100.0);
        // impulse 50 * 13 = 650 -> cost 2.6 -> 3 units
        let receipt = layer
            .flick_step(&mut state, Some(0), 0.0, 13.0, ChargeMode::Integer)
            .expect("flick");
        assert!(approx_eq(receipt.cost, 2.6));
        assert_eq!(receipt.charged, 3.0);
        assert!(approx_eq(state.energy(), 97.0));
    }

    #[test]
    fn trait_multiplier_scales_cost() {
        let config = WellConfig::default();
        let traits = TraitModifiers {
            energy_cost: 1.2,
            quirk_strength: 1.0,
        };
        let layer = ActionLayer::new(&config, &traits);
        let mut state = state_with([Well::new(50.0, 0.0); WELL_COUNT], 100.0);
        let receipt = layer
            .apply_target(&mut state, Some(2), 50.0, 40.0, ChargeMode::Float)
            .expect("apply");
        assert!(approx_eq(receipt.cost, 9.6));
        assert!(approx_eq(state.energy(), 90.4));
    }

    #[test]
    fn insufficient_energy_leaves_state_untouched() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut state = state_with([Well::new(100.0, 0.0); WELL_COUNT], 5.0);
        let before = state.clone();
        let err = layer
            .flick_step(&mut state, Some(0), 0.0, 100.0, ChargeMode::Float)
            .expect_err("too expensive");
        assert_eq!(err.reason(), "noenergy");
        assert_eq!(state, before);
    }

    #[test]
    fn integer_mode_cannot_spend_partial_units() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        // cost 2000/250 = 8 units, only 7.9 energy -> 7 whole units available
        let mut state = state_with([Well::new(50.0, 0.0); WELL_COUNT], 7.9);
        let err = layer
            .flick_step(&mut state, Some(0), 0.0, 40.0, ChargeMode::Integer)
            .expect_err("short");
        assert_eq!(
            err,
            ActionError::NoEnergy {
                needed: 8.0,
                available: 7.0
            }
        );
        // Float mode also refuses: 8.0 > 7.9
        assert!(
            layer
                .flick_step(&mut state, Some(0), 0.0, 40.0, ChargeMode::Float)
                .is_err()
        );
    }

    #[test]
    fn selection_and_index_errors() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut state = state_with([Well::new(50.0, 0.0); WELL_COUNT], 100.0);

        let err = layer
            .spin_zero(&mut state, None, ChargeMode::Integer)
            .expect_err("no selection");
        assert_eq!(err.reason(), "nosel");
        let err = layer.select_well(&mut state, 6).expect_err("bad index");
        assert_eq!(err.reason(), "invalid_idx");
        let err = layer
            .flick_step(&mut state, Some(11), 1.0, 0.0, ChargeMode::Integer)
            .expect_err("bad index");
        assert_eq!(err.reason(), "invalid_idx");

        layer.select_well(&mut state, 3).expect("select");
        assert_eq!(state.selected(), Some(3));
        layer
            .flick_step(&mut state, None, 10.0, 0.0, ChargeMode::Float)
            .expect("flick on selection");
        assert_eq!(state.well(3).map(|w| w.amount), Some(60.0));
    }

    #[test]
    fn zero_delta_and_pinned_flicks_are_noops() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut state = state_with([Well::new(100.0, 100.0); WELL_COUNT], 100.0);
        let err = layer
            .flick_step(&mut state, Some(0), 0.0, 0.0, ChargeMode::Integer)
            .expect_err("noop");
        assert_eq!(err, ActionError::Noop);
        let err = layer
            .flick_step(&mut state, Some(0), 5.0, 5.0, ChargeMode::Integer)
            .expect_err("already at max");
        assert_eq!(err, ActionError::Noop);
        assert_eq!(state.controls_revision(), 0);
    }

    #[test]
    fn spin_zero_is_free_the_second_time() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut wells = [Well::new(50.0, 0.0); WELL_COUNT];
        wells[2] = Well::new(60.0, 30.0);
        let mut state = state_with(wells, 100.0);

        let first = layer
            .spin_zero(&mut state, Some(2), ChargeMode::Float)
            .expect("first");
        assert!(first.changed);
        assert!(approx_eq(first.cost, 1_800.0 / 250.0));
        let second = layer
            .spin_zero(&mut state, Some(2), ChargeMode::Float)
            .expect("second");
        assert!(!second.changed);
        assert_eq!(second.cost, 0.0);
        assert_eq!(second.opposite_spin, None);
    }

    #[test]
    fn zero_pair_clears_both_spins_without_push() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut wells = [Well::new(50.0, 0.0); WELL_COUNT];
        wells[0] = Well::new(50.0, 40.0);
        wells[3] = Well::new(25.0, -20.0);
        wells[1] = Well::new(50.0, 7.0);
        let mut state = state_with(wells, 100.0);

        let receipt = layer.zero_pair(&mut state, Some(3)).expect("pair");
        assert_eq!(state.well(0).map(|w| w.spin), Some(0.0));
        assert_eq!(state.well(3).map(|w| w.spin), Some(0.0));
        assert_eq!(state.well(1).map(|w| w.spin), Some(7.0));
        assert_eq!(receipt.charged, receipt.cost.round());
        assert!(approx_eq(state.energy(), 100.0 - receipt.charged));

        let err = layer.zero_pair(&mut state, Some(0)).expect_err("already zero");
        assert_eq!(err.reason(), "nochange");
    }

    #[test]
    fn zero_pair_refuses_when_short_of_units() {
        let config = WellConfig::default();
        let layer = ActionLayer::new(&config, &NeutralTraits);
        let mut wells = [Well::new(50.0, 0.0); WELL_COUNT];
        wells[0] = Well::new(100.0, 100.0);
        wells[3] = Well::new(100.0, 100.0);
        let mut state = state_with(wells, 2.0);
        let before = state.clone();
        let err = layer.zero_pair(&mut state, Some(0)).expect_err("poor");
        assert_eq!(err.reason(), "noenergy");
        assert_eq!(state, before);
    }
}
