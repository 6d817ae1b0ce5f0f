//! Tunables for the well simulation.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::world::WorldError;

/// Static configuration for a well world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WellConfig {
    /// Lower bound of a well's amount.
    pub amount_min: f64,
    /// Upper bound of a well's amount.
    pub amount_max: f64,
    /// Lower bound of a well's logical spin range.
    pub spin_min: f64,
    /// Upper bound of a well's logical spin range.
    pub spin_max: f64,
    /// Magnitude spin may soft-overflow to before a jam must resolve it.
    pub spin_soft_max: f64,
    /// Per-hue psyche ceiling; exceeding it (or going negative) triggers a hue break.
    pub psyche_hue_cap: f64,
    /// Divisor converting flux into psyche per simulated second.
    pub psyche_flux_norm: f64,
    /// Whether the built-in flux to psyche drive runs each tick.
    pub psyche_drive: bool,
    /// Maximum energy the shared pool can hold.
    pub energy_cap: f64,
    /// Energy granted at level start unless the level overrides it.
    pub energy_start: f64,
    /// Energy regenerated per simulated second.
    pub energy_regen_per_sec: f64,
    /// Divisor converting a flux impulse into an energy cost.
    pub cost_norm: f64,
    /// Fraction of the flux impulse pushed into the opposite well.
    pub push_k: f64,
    /// Largest delta a single tick will simulate.
    pub max_tick_dt: f64,
    /// Confirmation hold that follows a satisfied band or chain step.
    pub plan_post_step_hold_sec: f64,
    /// Default hold for plan steps that do not specify one.
    pub plan_step_hold_sec: f64,
    /// Default hold for `SPIN_ZERO` plan steps.
    pub spin_zero_hold_sec: f64,
    /// Tolerance for a spin to count as zero in `SPIN_ZERO` steps.
    pub spin_zero_epsilon: f64,
    /// Window after a plan step completes during which it cannot reset.
    pub plan_flash_sec: f64,
    /// Distance from the psyche edge that hue-break relief restores to.
    pub break_safe_margin: f64,
    /// Psyche shifted on the opposite hue by a hue break.
    pub break_redirect: f64,
    /// Spin impulse applied to the opposite well by a hue break.
    pub break_penalty_spin: f64,
    /// Rolling window (simulated seconds) used by the lose condition.
    pub lose_window_sec: f64,
    /// Number of breaks inside the window that ends the run.
    pub lose_break_count: usize,
    /// Maximum number of break records retained.
    pub break_history_capacity: usize,
    /// Optional RNG seed for reproducible start states.
    pub rng_seed: Option<u64>,
}

impl Default for WellConfig {
    fn default() -> Self {
        Self {
            amount_min: 25.0,
            amount_max: 100.0,
            spin_min: -100.0,
            spin_max: 100.0,
            spin_soft_max: 300.0,
            psyche_hue_cap: 500.0,
            psyche_flux_norm: 5_000.0,
            psyche_drive: true,
            energy_cap: 100.0,
            energy_start: 100.0,
            energy_regen_per_sec: 1.5,
            cost_norm: 250.0,
            push_k: 0.25,
            max_tick_dt: 0.05,
            plan_post_step_hold_sec: 10.0,
            plan_step_hold_sec: 10.0,
            spin_zero_hold_sec: 3.0,
            spin_zero_epsilon: 0.5,
            plan_flash_sec: 0.45,
            break_safe_margin: 20.0,
            break_redirect: 20.0,
            break_penalty_spin: 25.0,
            lose_window_sec: 5.0,
            lose_break_count: 4,
            break_history_capacity: 32,
            rng_seed: None,
        }
    }
}

impl WellConfig {
    /// Validates the configuration before a world is built from it.
    pub fn validate(&self) -> Result<(), WorldError> {
        let floats = [
            self.amount_min,
            self.amount_max,
            self.spin_min,
            self.spin_max,
            self.spin_soft_max,
            self.psyche_hue_cap,
            self.psyche_flux_norm,
            self.energy_cap,
            self.energy_start,
            self.energy_regen_per_sec,
            self.cost_norm,
            self.push_k,
            self.max_tick_dt,
            self.plan_post_step_hold_sec,
            self.plan_step_hold_sec,
            self.spin_zero_hold_sec,
            self.spin_zero_epsilon,
            self.plan_flash_sec,
            self.break_safe_margin,
            self.break_redirect,
            self.break_penalty_spin,
            self.lose_window_sec,
        ];
        if floats.iter().any(|value| !value.is_finite()) {
            return Err(WorldError::InvalidConfig("all tunables must be finite"));
        }
        if self.amount_min <= 0.0 || self.amount_min >= self.amount_max {
            return Err(WorldError::InvalidConfig(
                "amount range must be positive and non-empty",
            ));
        }
        if self.spin_min >= self.spin_max {
            return Err(WorldError::InvalidConfig("spin range must be non-empty"));
        }
        if self.spin_soft_max < self.spin_max.max(-self.spin_min) {
            return Err(WorldError::InvalidConfig(
                "spin_soft_max must cover the hard spin range",
            ));
        }
        if self.psyche_hue_cap <= 0.0
            || self.psyche_flux_norm <= 0.0
            || self.energy_cap <= 0.0
            || self.cost_norm <= 0.0
        {
            return Err(WorldError::InvalidConfig(
                "caps and normalisers must be positive",
            ));
        }
        if self.energy_start < 0.0 || self.energy_start > self.energy_cap {
            return Err(WorldError::InvalidConfig(
                "energy_start must lie within [0, energy_cap]",
            ));
        }
        if self.energy_regen_per_sec < 0.0
            || self.push_k < 0.0
            || self.plan_post_step_hold_sec < 0.0
            || self.plan_step_hold_sec < 0.0
            || self.spin_zero_hold_sec < 0.0
            || self.spin_zero_epsilon < 0.0
            || self.plan_flash_sec < 0.0
            || self.break_redirect < 0.0
            || self.break_penalty_spin < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "rates, holds and break magnitudes must be non-negative",
            ));
        }
        if self.max_tick_dt <= 0.0 {
            return Err(WorldError::InvalidConfig("max_tick_dt must be positive"));
        }
        if self.break_safe_margin < 0.0 || 2.0 * self.break_safe_margin >= self.psyche_hue_cap {
            return Err(WorldError::InvalidConfig(
                "break_safe_margin must leave room inside the psyche range",
            ));
        }
        if self.lose_window_sec <= 0.0 || self.lose_break_count == 0 {
            return Err(WorldError::InvalidConfig(
                "lose window and break count must be positive",
            ));
        }
        if self.break_history_capacity == 0 {
            return Err(WorldError::InvalidConfig(
                "break_history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// RNG for start-state sampling, seeded from `rng_seed` when present.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Clamp an amount to the hard range.
    #[must_use]
    pub fn clamp_amount(&self, amount: f64) -> f64 {
        amount.clamp(self.amount_min, self.amount_max)
    }

    /// Clamp a spin to the hard (logical) range.
    #[must_use]
    pub fn clamp_spin(&self, spin: f64) -> f64 {
        spin.clamp(self.spin_min, self.spin_max)
    }

    /// Clamp a spin to the soft-overflow range.
    #[must_use]
    pub fn clamp_spin_soft(&self, spin: f64) -> f64 {
        spin.clamp(-self.spin_soft_max, self.spin_soft_max)
    }

    /// Clamp an energy value into the pool bounds.
    #[must_use]
    pub fn clamp_energy(&self, energy: f64) -> f64 {
        energy.clamp(0.0, self.energy_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(WellConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_amount_range() {
        let config = WellConfig {
            amount_min: 120.0,
            ..WellConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WorldError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_soft_range_narrower_than_hard_range() {
        let config = WellConfig {
            spin_soft_max: 50.0,
            ..WellConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_values() {
        let config = WellConfig {
            push_k: f64::NAN,
            ..WellConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: WellConfig =
            serde_json::from_str(r#"{ "energy_cap": 60.0, "energy_start": 30.0 }"#)
                .expect("config");
        assert_eq!(config.energy_cap, 60.0);
        assert_eq!(config.amount_max, 100.0);
        assert!(config.validate().is_ok());
    }
}
