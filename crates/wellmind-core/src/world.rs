//! The simulation context: owns the state record, the objective and break
//! pipelines and the collaborators, and sequences them once per tick.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::action_math::{ApplyPreview, ZeroPairCost, compute_apply_preview, compute_zero_pair_cost};
use crate::actions::{ActionError, ActionLayer, ActionReceipt};
use crate::breaks::{BreakContext, BreakOutcome, BreakPopup, BreakRecord, BreakState, JamCause};
use crate::collab::{
    ClampSpillover, DispositionSource, FrameSink, NeutralTraits, NullFrameSink,
    ScriptedDispositions, SpilloverResolver, TraitRules, WellNudge,
};
use crate::command::{ActionResponse, Command};
use crate::config::WellConfig;
use crate::level::{DispositionTarget, LevelDefinition, StartState};
use crate::objectives::{GoalViz, LevelState, Objective, ObjectiveState};
use crate::state::{SimState, Well};
use crate::{SAVE_SCHEMA_VERSION, Tick, WELL_COUNT};

/// Errors raised while building or restoring a world.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The level definition cannot drive a world.
    #[error("invalid level: {0}")]
    InvalidLevel(String),
    /// A save blob written by an incompatible version.
    #[error("save schema {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },
    /// A save blob whose contents cannot describe a running session.
    #[error("invalid save: {0}")]
    InvalidSave(&'static str),
}

/// Read-only view handed to renderers and the HUD.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub sim_time: f64,
    pub level_id: u32,
    pub wells: [Well; WELL_COUNT],
    pub psyche: [f64; WELL_COUNT],
    pub energy: f64,
    pub selected: Option<usize>,
    pub controls_revision: u64,
    pub objectives: Vec<Objective>,
    pub goal_viz: GoalViz,
    pub level_state: LevelState,
    pub break_history: Vec<BreakRecord>,
    pub active_dispositions: usize,
}

/// Session state embedded in the persisted blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSave {
    pub level: LevelDefinition,
    pub wells: [Well; WELL_COUNT],
    pub psyche: [f64; WELL_COUNT],
    pub energy: f64,
    #[serde(default)]
    pub selected: Option<usize>,
    pub tick: Tick,
    pub sim_time: f64,
    pub objectives: ObjectiveState,
}

/// Versioned save envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveBlob {
    pub schema_version: u32,
    pub pat: SessionSave,
}

fn sample(rng: &mut SmallRng, range: [f64; 2]) -> f64 {
    let [low, high] = range;
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

fn initial_state(
    config: &WellConfig,
    level: &LevelDefinition,
    rng: &mut SmallRng,
) -> SimState {
    let cap = config.psyche_hue_cap;
    let (wells, psyche) = match &level.start {
        StartState::Ranges {
            amount,
            spin,
            psyche,
        } => {
            let wells: [Well; WELL_COUNT] = std::array::from_fn(|_| {
                let amount = config.clamp_amount(sample(rng, *amount));
                let spin = config.clamp_spin(sample(rng, *spin));
                Well::new(amount, spin)
            });
            let psyche: [f64; WELL_COUNT] =
                std::array::from_fn(|_| sample(rng, *psyche).clamp(0.0, cap));
            (wells, psyche)
        }
        StartState::Exact { wells, psyche } => (
            wells.map(|well| {
                Well::new(
                    config.clamp_amount(well.amount),
                    config.clamp_spin_soft(well.spin),
                )
            }),
            psyche.map(|value| value.clamp(0.0, cap)),
        ),
    };
    let energy = config.clamp_energy(level.energy.unwrap_or(config.energy_start));
    SimState::new(wells, psyche, energy)
}

/// Write `nudges` as one bracket, keeping amounts in the hard range and
/// spins in the soft range.
fn apply_nudges(
    config: &WellConfig,
    state: &mut SimState,
    label: &'static str,
    nudges: &[WellNudge],
) {
    if nudges.is_empty() {
        return;
    }
    state.guarded(label, |s| {
        for nudge in nudges {
            let Some(well) = s.well(nudge.index) else {
                continue;
            };
            match nudge.target {
                DispositionTarget::Amount => {
                    s.set_amount(nudge.index, config.clamp_amount(well.amount + nudge.delta));
                }
                DispositionTarget::Spin => {
                    s.set_spin(nudge.index, config.clamp_spin_soft(well.spin + nudge.delta));
                }
            }
        }
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The simulation context passed to every pipeline stage.
pub struct WellWorld {
    config: WellConfig,
    level: LevelDefinition,
    state: SimState,
    objectives: ObjectiveState,
    breaks: BreakState,
    traits: Box<dyn TraitRules>,
    dispositions: Box<dyn DispositionSource>,
    spillover: Box<dyn SpilloverResolver>,
    sink: Box<dyn FrameSink>,
    rng: SmallRng,
    tick: Tick,
    sim_time: f64,
}

impl fmt::Debug for WellWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WellWorld")
            .field("level", &self.level.id)
            .field("tick", &self.tick)
            .field("sim_time", &self.sim_time)
            .field("level_state", &self.objectives.level_state())
            .field("state", &self.state)
            .finish()
    }
}

impl WellWorld {
    /// Build a world for `level` with neutral traits, scripted dispositions
    /// and no frame sink.
    ///
    /// Worlds start with [`ClampSpillover`]; see [`Self::set_spillover_resolver`].
    pub fn new(config: WellConfig, level: LevelDefinition) -> Result<Self, WorldError> {
        Self::with_collaborators(
            config,
            level,
            Box::new(NeutralTraits),
            Box::new(ScriptedDispositions::new()),
            Box::new(NullFrameSink),
        )
    }

    /// Build a world with explicit collaborators.
    pub fn with_collaborators(
        config: WellConfig,
        level: LevelDefinition,
        traits: Box<dyn TraitRules>,
        mut dispositions: Box<dyn DispositionSource>,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        level.validate(&config)?;
        let mut rng = config.seeded_rng();
        let state = initial_state(&config, &level, &mut rng);
        let objectives = ObjectiveState::new(level.win.clone(), &config);
        dispositions.init_level(&level);
        info!(level = level.id, win = level.win.kind_name(), "level initialised");
        Ok(Self {
            breaks: BreakState::new(config.break_history_capacity),
            config,
            level,
            state,
            objectives,
            traits,
            dispositions,
            spillover: Box::new(ClampSpillover),
            sink,
            rng,
            tick: Tick::zero(),
            sim_time: 0.0,
        })
    }

    /// Discard the current level and start `level` from its start state.
    pub fn load_level(&mut self, level: LevelDefinition) -> Result<(), WorldError> {
        level.validate(&self.config)?;
        self.state = initial_state(&self.config, &level, &mut self.rng);
        self.objectives = ObjectiveState::new(level.win.clone(), &self.config);
        self.breaks.reset_for_level();
        self.dispositions.init_level(&level);
        self.tick = Tick::zero();
        self.sim_time = 0.0;
        info!(level = level.id, win = level.win.kind_name(), "level initialised");
        self.level = level;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &WellConfig {
        &self.config
    }

    #[must_use]
    pub fn level(&self) -> &LevelDefinition {
        &self.level
    }

    #[must_use]
    pub fn state(&self) -> &SimState {
        &self.state
    }

    #[must_use]
    pub fn objectives(&self) -> &ObjectiveState {
        &self.objectives
    }

    #[must_use]
    pub fn breaks(&self) -> &BreakState {
        &self.breaks
    }

    #[must_use]
    pub const fn tick_id(&self) -> Tick {
        self.tick
    }

    /// Simulated seconds since the level started.
    #[must_use]
    pub const fn sim_time(&self) -> f64 {
        self.sim_time
    }

    #[must_use]
    pub const fn level_state(&self) -> LevelState {
        self.objectives.level_state()
    }

    /// Replace the frame sink.
    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = sink;
    }

    /// Replace the trait rules (e.g. when the active session changes).
    pub fn set_traits(&mut self, traits: Box<dyn TraitRules>) {
        self.traits = traits;
    }

    /// Replace the resolver that folds overflow back into range each tick.
    pub fn set_spillover_resolver(&mut self, spillover: Box<dyn SpilloverResolver>) {
        self.spillover = spillover;
    }

    /// Advance by `dt` simulated seconds, clamped to `[0, max_tick_dt]`.
    ///
    /// Returns the delta actually simulated. Once the level has ended the
    /// clock still advances but the simulation is frozen.
    pub fn tick(&mut self, dt: f64) -> f64 {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_tick_dt)
        } else {
            0.0
        };
        self.tick = self.tick.next();
        self.sim_time += dt;
        if !self.objectives.is_playing() {
            return dt;
        }
        if self.stage_spillover() {
            return dt;
        }

        self.stage_drive(dt);
        self.stage_regen(dt);
        self.stage_dispositions(dt);

        let outcome = self.breaks.check(BreakContext {
            config: &self.config,
            state: &mut self.state,
            objectives: &mut self.objectives,
            dispositions: self.dispositions.as_mut(),
            now: self.sim_time,
            tick: self.tick,
        });
        if outcome.halts_tick() {
            return dt;
        }

        let cap = self.config.psyche_hue_cap;
        self.state.guarded("psyche_clamp", |s| s.clamp_psyche(cap));
        self.objectives.evaluate(&self.config, &self.state, dt);
        dt
    }

    /// Resolve overflow left behind since the last tick. Jams the resolver
    /// reports are raised against this tick and the resolver runs again on
    /// the result, until it settles or the tick's jam budget is spent.
    /// Returns whether the rest of the tick is skipped.
    fn stage_spillover(&mut self) -> bool {
        let mut halted = false;
        loop {
            let spillover = self.spillover.resolve(&self.config, self.state.wells());
            apply_nudges(&self.config, &mut self.state, "spillover", &spillover.nudges);
            let Some((cause, index)) = spillover.jam else {
                return halted;
            };
            match self.trigger_jam(cause, index) {
                BreakOutcome::Broke { lost: false, .. } => {
                    debug!(index, cause = cause.code(), "spillover escalated");
                    halted = true;
                }
                outcome => return halted || outcome.halts_tick(),
            }
        }
    }

    fn stage_drive(&mut self, dt: f64) {
        if !self.config.psyche_drive || dt <= 0.0 {
            return;
        }
        let norm = self.config.psyche_flux_norm;
        self.state.guarded("psyche_drive", |s| {
            for hue in 0..WELL_COUNT {
                if let Some(well) = s.well(hue) {
                    s.add_psyche(hue, well.flux() / norm * dt);
                }
            }
        });
    }

    fn stage_regen(&mut self, dt: f64) {
        let regen = self.config.energy_regen_per_sec * dt;
        if regen <= 0.0 {
            return;
        }
        let cap = self.config.energy_cap;
        self.state
            .guarded("energy_regen", |s| s.set_energy((s.energy() + regen).min(cap)));
    }

    fn stage_dispositions(&mut self, dt: f64) {
        let nudges = self
            .dispositions
            .tick(dt, self.traits.quirk_strength_mult());
        apply_nudges(&self.config, &mut self.state, "dispositions", &nudges);
    }

    /// Price a proposed `(amount, spin)` for well `index` without applying it.
    #[must_use]
    pub fn preview_apply(&self, index: usize, amount: f64, spin: f64) -> ApplyPreview {
        compute_apply_preview(&self.config, self.state.wells(), index, amount, spin)
    }

    /// Price zeroing well `index` and its opposite.
    #[must_use]
    pub fn preview_zero_pair(&self, index: usize) -> ZeroPairCost {
        compute_zero_pair_cost(&self.config, self.state.wells(), index)
    }

    /// Apply a player command. Never panics; a failed command leaves the
    /// state exactly as it was.
    pub fn dispatch(&mut self, command: Command) -> Result<ActionReceipt, ActionError> {
        if !self.objectives.is_playing() {
            return Err(ActionError::NotPlaying);
        }
        let before = self.state.clone();
        let layer = ActionLayer::new(&self.config, self.traits.as_ref());
        let state = &mut self.state;
        let result = panic::catch_unwind(AssertUnwindSafe(|| command.execute(&layer, state)));
        match result {
            Ok(Ok(receipt)) => {
                debug!(action = command.name(), charged = receipt.charged, "command applied");
                Ok(receipt)
            }
            Ok(Err(error)) => {
                debug!(action = command.name(), reason = error.reason(), "command refused");
                Err(error)
            }
            Err(payload) => {
                self.state = before;
                let message = panic_message(payload.as_ref());
                warn!(action = command.name(), %message, "command panicked; state restored");
                Err(ActionError::DispatchPanicked(message))
            }
        }
    }

    /// Named entry point: parse `name` and `args`, dispatch, and report.
    pub fn dispatch_named(&mut self, name: &str, args: &[Value]) -> ActionResponse {
        let result = Command::parse(name, args).and_then(|command| self.dispatch(command));
        ActionResponse::from_result(&result, self.state.controls_revision())
    }

    /// Escalate an unresolved overflow on well `index` into a jam break.
    pub fn trigger_jam(&mut self, cause: JamCause, index: usize) -> BreakOutcome {
        self.breaks.trigger_jam(
            BreakContext {
                config: &self.config,
                state: &mut self.state,
                objectives: &mut self.objectives,
                dispositions: self.dispositions.as_mut(),
                now: self.sim_time,
                tick: self.tick,
            },
            cause,
            index,
        )
    }

    /// Next unseen first-occurrence popup, if any.
    pub fn take_popup(&mut self) -> Option<BreakPopup> {
        self.breaks.take_popup()
    }

    #[must_use]
    pub fn run_log(&self) -> &[String] {
        self.breaks.run_log()
    }

    /// Close the session. Returns `false` if the level had already ended.
    pub fn end_session(&mut self) -> bool {
        let ended = self.objectives.finish(LevelState::GameOver);
        if ended {
            info!(level = self.level.id, "session ended");
        }
        ended
    }

    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            sim_time: self.sim_time,
            level_id: self.level.id,
            wells: *self.state.wells(),
            psyche: *self.state.psyche(),
            energy: self.state.energy(),
            selected: self.state.selected(),
            controls_revision: self.state.controls_revision(),
            objectives: self.objectives.objectives().to_vec(),
            goal_viz: *self.objectives.goal_viz(),
            level_state: self.objectives.level_state(),
            break_history: self.breaks.history().iter().cloned().collect(),
            active_dispositions: self.dispositions.active_count(),
        }
    }

    /// One frame: tick, snapshot, hand the snapshot to the frame sink.
    pub fn frame(&mut self, dt: f64) -> WorldSnapshot {
        self.tick(dt);
        let snapshot = self.snapshot();
        self.sink.on_frame(&snapshot);
        snapshot
    }

    #[must_use]
    pub fn save(&self) -> SaveBlob {
        SaveBlob {
            schema_version: SAVE_SCHEMA_VERSION,
            pat: SessionSave {
                level: self.level.clone(),
                wells: *self.state.wells(),
                psyche: *self.state.psyche(),
                energy: self.state.energy(),
                selected: self.state.selected(),
                tick: self.tick,
                sim_time: self.sim_time,
                objectives: self.objectives.clone(),
            },
        }
    }

    /// Replace the running session with a saved one.
    ///
    /// Wells and psyche are taken as written, including any overshoot a jam
    /// left behind. Disposition progress is not persisted; the level's
    /// dispositions restart from their delays.
    pub fn restore(&mut self, blob: SaveBlob) -> Result<(), WorldError> {
        if blob.schema_version != SAVE_SCHEMA_VERSION {
            return Err(WorldError::SchemaMismatch {
                found: blob.schema_version,
                expected: SAVE_SCHEMA_VERSION,
            });
        }
        let save = blob.pat;
        save.level.validate(&self.config)?;
        if &save.level.win != save.objectives.win() {
            return Err(WorldError::InvalidLevel(
                "saved objectives do not belong to the saved level".into(),
            ));
        }

        let finite = save
            .wells
            .iter()
            .all(|well| well.amount.is_finite() && well.spin.is_finite())
            && save.psyche.iter().all(|value| value.is_finite())
            && save.energy.is_finite()
            && save.sim_time.is_finite();
        if !finite {
            return Err(WorldError::InvalidSave("non-finite value in saved state"));
        }

        let energy = self.config.clamp_energy(save.energy);
        let mut state = SimState::new(save.wells, save.psyche, energy);
        state.select(save.selected.filter(|&index| index < WELL_COUNT));

        self.state = state;
        self.objectives = save.objectives;
        self.breaks.reset_for_level();
        self.dispositions.init_level(&save.level);
        self.tick = save.tick;
        self.sim_time = save.sim_time;
        info!(level = save.level.id, "session restored");
        self.level = save.level;
        Ok(())
    }
}
