//! Core simulation for the six-well psyche puzzle.
//!
//! Six wells each hold an `amount` and a `spin`; their product (flux) drives a
//! per-hue psyche accumulator that data-driven objectives are checked against.
//! Player actions spend a shared energy pool and push the opposite well. The
//! break system turns psyche excursions and unresolved overflow into a fixed
//! relief, redirect and penalty transform.

use serde::{Deserialize, Serialize};

pub mod action_math;
pub mod actions;
pub mod breaks;
pub mod collab;
pub mod command;
pub mod config;
pub mod level;
pub mod objectives;
pub mod state;
pub mod world;

pub use action_math::{ApplyPreview, ZeroPairCost};
pub use actions::{ActionError, ActionLayer, ActionReceipt, ChargeMode};
pub use breaks::{
    BreakCause, BreakDirection, BreakOutcome, BreakPopup, BreakRecord, BreakState, JamCause,
};
pub use collab::{
    ClampSpillover, DispositionSource, FrameSink, NeutralTraits, NullDispositions, NullFrameSink,
    ScriptedDispositions, Spillover, SpilloverResolver, TraitModifiers, TraitRules, WellNudge,
};
pub use command::{ActionResponse, Command};
pub use config::WellConfig;
pub use level::{
    DispositionSpec, DispositionTarget, HueBounds, LevelDefinition, PlanStep, PlanStepKind,
    StartState, StepCondition, WinDefinition, ZenStep,
};
pub use objectives::{GoalViz, HueGoal, LevelState, Objective, ObjectiveState};
pub use state::{SimState, Well};
pub use world::{SaveBlob, SessionSave, WellWorld, WorldError, WorldSnapshot};

/// Number of wells (and psyche hues) in the simulation.
pub const WELL_COUNT: usize = 6;

/// Tolerance used when deciding whether a value actually changed.
pub const CHANGE_EPSILON: f64 = 1e-9;

/// Schema version stamped into save blobs.
pub const SAVE_SCHEMA_VERSION: u32 = 3;

/// Index of the well diametrically opposite `index`.
#[must_use]
pub const fn opposite(index: usize) -> usize {
    (index + 3) % WELL_COUNT
}

/// The two wells adjacent to `index` on the hue wheel, lower neighbour first.
#[must_use]
pub const fn neighbors(index: usize) -> [usize; 2] {
    [(index + WELL_COUNT - 1) % WELL_COUNT, (index + 1) % WELL_COUNT]
}

/// Returns whether `index` addresses one of the six wells.
#[must_use]
pub const fn is_valid_index(index: usize) -> bool {
    index < WELL_COUNT
}

/// Monotonic tick identity; breaks use it to detect "same tick".
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Display name for a hue index, used in objective text and break messages.
#[must_use]
pub fn hue_name(index: usize) -> &'static str {
    const NAMES: [&str; WELL_COUNT] = ["Red", "Yellow", "Green", "Cyan", "Blue", "Magenta"];
    NAMES.get(index).copied().unwrap_or("?")
}
