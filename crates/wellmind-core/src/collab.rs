//! Seams to the collaborators that live outside the core: trait rules,
//! disposition sources, spillover resolution and per-frame snapshot consumers.

use serde::{Deserialize, Serialize};

use crate::breaks::JamCause;
use crate::config::WellConfig;
use crate::level::{DispositionSpec, DispositionTarget, LevelDefinition};
use crate::state::Well;
use crate::world::WorldSnapshot;
use crate::{CHANGE_EPSILON, WELL_COUNT};

/// Session-level rule modifiers (patient traits and the like).
pub trait TraitRules: Send {
    /// Multiplier applied to every raw action cost.
    fn energy_cost_mult(&self) -> f64;

    /// Multiplier applied to disposition strength.
    fn quirk_strength_mult(&self) -> f64;
}

/// Rules with no modifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralTraits;

impl TraitRules for NeutralTraits {
    fn energy_cost_mult(&self) -> f64 {
        1.0
    }

    fn quirk_strength_mult(&self) -> f64 {
        1.0
    }
}

/// Fixed multipliers, typically loaded alongside a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TraitModifiers {
    pub energy_cost: f64,
    pub quirk_strength: f64,
}

impl Default for TraitModifiers {
    fn default() -> Self {
        Self {
            energy_cost: 1.0,
            quirk_strength: 1.0,
        }
    }
}

impl TraitRules for TraitModifiers {
    fn energy_cost_mult(&self) -> f64 {
        if self.energy_cost.is_finite() && self.energy_cost >= 0.0 {
            self.energy_cost
        } else {
            1.0
        }
    }

    fn quirk_strength_mult(&self) -> f64 {
        if self.quirk_strength.is_finite() && self.quirk_strength >= 0.0 {
            self.quirk_strength
        } else {
            1.0
        }
    }
}

/// A requested change to one well produced by a disposition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WellNudge {
    pub index: usize,
    pub target: DispositionTarget,
    pub delta: f64,
}

/// Source of periodic well perturbations ("dispositions" or quirks).
pub trait DispositionSource: Send {
    /// Reset for a freshly loaded level.
    fn init_level(&mut self, level: &LevelDefinition);

    /// Cancel every active disposition; called by the break system.
    fn cancel_all(&mut self);

    /// Advance by `dt` and return the nudges to apply this tick.
    fn tick(&mut self, dt: f64, strength_mult: f64) -> Vec<WellNudge>;

    /// Number of dispositions still able to fire (read-only, for presentation).
    fn active_count(&self) -> usize;
}

/// Disposition source that never perturbs anything.
#[derive(Debug, Default)]
pub struct NullDispositions;

impl DispositionSource for NullDispositions {
    fn init_level(&mut self, _level: &LevelDefinition) {}

    fn cancel_all(&mut self) {}

    fn tick(&mut self, _dt: f64, _strength_mult: f64) -> Vec<WellNudge> {
        Vec::new()
    }

    fn active_count(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone)]
struct ActiveDisposition {
    spec: DispositionSpec,
    elapsed: f64,
    cancelled: bool,
}

impl ActiveDisposition {
    fn window_end(&self) -> f64 {
        self.spec
            .duration_sec
            .map_or(f64::INFINITY, |duration| self.spec.delay_sec + duration)
    }

    fn is_live(&self) -> bool {
        !self.cancelled && self.elapsed < self.window_end()
    }
}

/// Drives the `dispositions[]` listed in a level definition at constant rates.
#[derive(Debug, Default)]
pub struct ScriptedDispositions {
    entries: Vec<ActiveDisposition>,
}

impl ScriptedDispositions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispositionSource for ScriptedDispositions {
    fn init_level(&mut self, level: &LevelDefinition) {
        self.entries = level
            .dispositions
            .iter()
            .filter(|spec| spec.hue < WELL_COUNT)
            .map(|spec| ActiveDisposition {
                spec: spec.clone(),
                elapsed: 0.0,
                cancelled: false,
            })
            .collect();
    }

    fn cancel_all(&mut self) {
        for entry in &mut self.entries {
            entry.cancelled = true;
        }
    }

    fn tick(&mut self, dt: f64, strength_mult: f64) -> Vec<WellNudge> {
        if dt <= 0.0 {
            return Vec::new();
        }
        let mut nudges = Vec::new();
        for entry in &mut self.entries {
            if entry.cancelled {
                continue;
            }
            let start = entry.elapsed;
            let end = start + dt;
            entry.elapsed = end;
            let active = end.min(entry.window_end()) - start.max(entry.spec.delay_sec);
            if active <= 0.0 {
                continue;
            }
            nudges.push(WellNudge {
                index: entry.spec.hue,
                target: entry.spec.target,
                delta: entry.spec.rate_per_sec * active * strength_mult,
            });
        }
        nudges
    }

    fn active_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_live()).count()
    }
}

/// What one spillover pass wants done: corrective nudges and, when an
/// overflow cannot be absorbed, the jam to escalate it into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spillover {
    pub nudges: Vec<WellNudge>,
    pub jam: Option<(JamCause, usize)>,
}

impl Spillover {
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.nudges.is_empty() && self.jam.is_none()
    }
}

/// Folds out-of-range wells back into range at the start of every tick.
///
/// Called repeatedly within a tick while it keeps reporting jams, so each
/// pass sees the wells as the previous jam left them.
pub trait SpilloverResolver: Send {
    fn resolve(&mut self, config: &WellConfig, wells: &[Well; WELL_COUNT]) -> Spillover;
}

/// Resolver that clamps amounts to the hard range and spins to the soft
/// range. It never escalates.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClampSpillover;

impl SpilloverResolver for ClampSpillover {
    fn resolve(&mut self, config: &WellConfig, wells: &[Well; WELL_COUNT]) -> Spillover {
        let mut nudges = Vec::new();
        for (index, well) in wells.iter().enumerate() {
            let amount = config.clamp_amount(well.amount);
            if (amount - well.amount).abs() > CHANGE_EPSILON {
                nudges.push(WellNudge {
                    index,
                    target: DispositionTarget::Amount,
                    delta: amount - well.amount,
                });
            }
            let spin = config.clamp_spin_soft(well.spin);
            if (spin - well.spin).abs() > CHANGE_EPSILON {
                nudges.push(WellNudge {
                    index,
                    target: DispositionTarget::Spin,
                    delta: spin - well.spin,
                });
            }
        }
        Spillover { nudges, jam: None }
    }
}

/// Consumer of the per-frame snapshot (renderer, HUD, recorder).
pub trait FrameSink: Send {
    fn on_frame(&mut self, snapshot: &WorldSnapshot);
}

/// Frame sink that discards snapshots.
#[derive(Debug, Default)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn on_frame(&mut self, _snapshot: &WorldSnapshot) {}
}
