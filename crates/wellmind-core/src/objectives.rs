//! Per-tick win evaluation.
//!
//! One [`WinDefinition`] is active at a time. Band holds, zen chains and
//! weekly holds use a two-phase hold: satisfy the condition continuously for
//! the step's hold, then keep satisfying it through a fixed confirmation
//! window. Plan chains hold each step for its own requirement and then run a
//! short flash window, during which the step cannot reset, before advancing.
//! Thresholds are inclusive and timers run on simulated time.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WellConfig;
use crate::level::{HueBounds, PlanStep, PlanStepKind, StepCondition, WinDefinition, ZenStep};
use crate::state::SimState;
use crate::{WELL_COUNT, hue_name};

/// Slack applied to hold comparisons so accumulated tick deltas land on the
/// requirement instead of just short of it.
pub const HOLD_EPSILON: f64 = 1e-6;

/// Lifecycle of a level.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LevelState {
    #[default]
    Playing,
    Win,
    Lose,
    GameOver,
}

/// One line of the objective list shown to the player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Objective {
    pub id: String,
    pub text: String,
    pub complete: bool,
}

/// What the current step wants from a single hue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HueGoal {
    #[default]
    Free,
    AtLeast {
        value: f64,
    },
    AtMost {
        value: f64,
    },
    Band {
        low: f64,
        high: f64,
    },
    SpinZero {
        epsilon: f64,
    },
}

impl From<HueBounds> for HueGoal {
    fn from(bounds: HueBounds) -> Self {
        match (bounds.low, bounds.high) {
            (Some(low), Some(high)) => Self::Band { low, high },
            (Some(low), None) => Self::AtLeast { value: low },
            (None, Some(high)) => Self::AtMost { value: high },
            (None, None) => Self::Free,
        }
    }
}

/// Thresholds relevant to the current step, per hue, for display.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GoalViz {
    pub step: usize,
    pub hues: [HueGoal; WELL_COUNT],
}

impl GoalViz {
    fn uniform(step: usize, goal: HueGoal) -> Self {
        Self {
            step,
            hues: [goal; WELL_COUNT],
        }
    }
}

fn all_in_band(psyche: &[f64; WELL_COUNT], low: f64, high: f64) -> bool {
    psyche.iter().all(|&value| value >= low && value <= high)
}

fn all_over(psyche: &[f64; WELL_COUNT], threshold: f64) -> bool {
    psyche.iter().all(|&value| value >= threshold)
}

fn hues_over(psyche: &[f64; WELL_COUNT], hues: &[usize], threshold: f64) -> bool {
    hues.iter()
        .all(|&hue| psyche.get(hue).is_some_and(|&value| value >= threshold))
}

fn per_hue(psyche: &[f64; WELL_COUNT], bounds: &[HueBounds; WELL_COUNT]) -> bool {
    psyche
        .iter()
        .zip(bounds.iter())
        .all(|(&value, bounds)| bounds.contains(value))
}

fn condition_met(condition: &StepCondition, psyche: &[f64; WELL_COUNT]) -> bool {
    match condition {
        StepCondition::Band { low, high } => all_in_band(psyche, *low, *high),
        StepCondition::Over { threshold } => all_over(psyche, *threshold),
        StepCondition::HuesOver { hues, threshold } => hues_over(psyche, hues, *threshold),
        StepCondition::PerHue { bounds } => per_hue(psyche, bounds),
    }
}

fn plan_step_met(kind: &PlanStepKind, config: &WellConfig, state: &SimState) -> bool {
    let psyche = state.psyche();
    match kind {
        PlanStepKind::AllOver { threshold } => all_over(psyche, *threshold),
        PlanStepKind::SetBounds {
            high_hues,
            high,
            low_hues,
            low,
        } => {
            hues_over(psyche, high_hues, *high)
                && low_hues
                    .iter()
                    .all(|&hue| psyche.get(hue).is_some_and(|&value| value <= *low))
        }
        PlanStepKind::PerHueBounds { bounds } => per_hue(psyche, bounds),
        PlanStepKind::AllBand { low, high } => all_in_band(psyche, *low, *high),
        PlanStepKind::SpinZero => state
            .wells()
            .iter()
            .all(|well| well.spin.abs() <= config.spin_zero_epsilon),
    }
}

fn condition_viz(step: usize, condition: &StepCondition) -> GoalViz {
    match condition {
        StepCondition::Band { low, high } => GoalViz::uniform(
            step,
            HueGoal::Band {
                low: *low,
                high: *high,
            },
        ),
        StepCondition::Over { threshold } => {
            GoalViz::uniform(step, HueGoal::AtLeast { value: *threshold })
        }
        StepCondition::HuesOver { hues, threshold } => {
            let mut viz = GoalViz::uniform(step, HueGoal::Free);
            for &hue in hues {
                if let Some(slot) = viz.hues.get_mut(hue) {
                    *slot = HueGoal::AtLeast { value: *threshold };
                }
            }
            viz
        }
        StepCondition::PerHue { bounds } => GoalViz {
            step,
            hues: bounds.map(HueGoal::from),
        },
    }
}

fn plan_viz(step: usize, kind: &PlanStepKind, config: &WellConfig) -> GoalViz {
    match kind {
        PlanStepKind::AllOver { threshold } => {
            GoalViz::uniform(step, HueGoal::AtLeast { value: *threshold })
        }
        PlanStepKind::SetBounds {
            high_hues,
            high,
            low_hues,
            low,
        } => {
            let mut viz = GoalViz::uniform(step, HueGoal::Free);
            for &hue in high_hues {
                if let Some(slot) = viz.hues.get_mut(hue) {
                    *slot = HueGoal::AtLeast { value: *high };
                }
            }
            for &hue in low_hues {
                if let Some(slot) = viz.hues.get_mut(hue) {
                    *slot = HueGoal::AtMost { value: *low };
                }
            }
            viz
        }
        PlanStepKind::PerHueBounds { bounds } => GoalViz {
            step,
            hues: bounds.map(HueGoal::from),
        },
        PlanStepKind::AllBand { low, high } => GoalViz::uniform(
            step,
            HueGoal::Band {
                low: *low,
                high: *high,
            },
        ),
        PlanStepKind::SpinZero => GoalViz::uniform(
            step,
            HueGoal::SpinZero {
                epsilon: config.spin_zero_epsilon,
            },
        ),
    }
}

fn join_hues(hues: &[usize]) -> String {
    hues.iter()
        .map(|&hue| hue_name(hue))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_condition(condition: &StepCondition) -> String {
    match condition {
        StepCondition::Band { low, high } => format!("Keep every hue between {low} and {high}"),
        StepCondition::Over { threshold } => format!("Raise every hue to {threshold}+"),
        StepCondition::HuesOver { hues, threshold } => {
            format!("Raise {} to {threshold}+", join_hues(hues))
        }
        StepCondition::PerHue { .. } => "Bring each hue into its target range".to_string(),
    }
}

fn describe_zen_step(step: &ZenStep) -> String {
    step.text.clone().unwrap_or_else(|| {
        format!(
            "{} for {}s",
            describe_condition(&step.condition),
            step.hold_sec
        )
    })
}

fn describe_plan_step(step: &PlanStep, config: &WellConfig) -> String {
    if let Some(text) = &step.text {
        return text.clone();
    }
    let hold = step.hold_requirement(config);
    match &step.kind {
        PlanStepKind::AllOver { threshold } => {
            format!("Raise every hue to {threshold}+ and hold {hold}s")
        }
        PlanStepKind::SetBounds {
            high_hues,
            high,
            low_hues,
            low,
        } => {
            let mut parts = Vec::new();
            if !high_hues.is_empty() {
                parts.push(format!("{} at {high}+", join_hues(high_hues)));
            }
            if !low_hues.is_empty() {
                parts.push(format!("{} at {low} or less", join_hues(low_hues)));
            }
            format!("Hold {} for {hold}s", parts.join(", "))
        }
        PlanStepKind::PerHueBounds { .. } => {
            format!("Bring each hue into its target range for {hold}s")
        }
        PlanStepKind::AllBand { low, high } => {
            format!("Keep every hue between {low} and {high} for {hold}s")
        }
        PlanStepKind::SpinZero => format!("Still every spin for {hold}s"),
    }
}

fn build_objectives(win: &WinDefinition, config: &WellConfig) -> Vec<Objective> {
    let objective = |id: String, text: String| Objective {
        id,
        text,
        complete: false,
    };
    match win {
        WinDefinition::AllOver { threshold } => vec![objective(
            "all_over".into(),
            format!("Raise every hue to {threshold}+"),
        )],
        WinDefinition::SomeOver { hues, threshold } => hues
            .iter()
            .map(|&hue| {
                objective(
                    format!("some_over_{hue}"),
                    format!("Raise {} to {threshold}+", hue_name(hue)),
                )
            })
            .collect(),
        WinDefinition::AllBandHold {
            low,
            high,
            hold_sec,
        } => vec![objective(
            "band_hold".into(),
            format!("Keep every hue between {low} and {high} for {hold_sec}s"),
        )],
        WinDefinition::ZenChain { steps } => steps
            .iter()
            .enumerate()
            .map(|(k, step)| objective(format!("zen_{k}"), describe_zen_step(step)))
            .collect(),
        WinDefinition::WeeklyHold { steps } => steps
            .iter()
            .enumerate()
            .map(|(k, step)| {
                objective(
                    format!("week_{k}"),
                    format!("Day {}: {}", k + 1, describe_zen_step(step)),
                )
            })
            .collect(),
        WinDefinition::PlanChain { steps } => steps
            .iter()
            .enumerate()
            .map(|(k, step)| objective(format!("plan_{k}"), describe_plan_step(step, config)))
            .collect(),
    }
}

fn initial_viz(win: &WinDefinition, config: &WellConfig) -> GoalViz {
    match win {
        WinDefinition::AllOver { threshold } => {
            GoalViz::uniform(0, HueGoal::AtLeast { value: *threshold })
        }
        WinDefinition::SomeOver { hues, threshold } => condition_viz(
            0,
            &StepCondition::HuesOver {
                hues: hues.clone(),
                threshold: *threshold,
            },
        ),
        WinDefinition::AllBandHold { low, high, .. } => GoalViz::uniform(
            0,
            HueGoal::Band {
                low: *low,
                high: *high,
            },
        ),
        WinDefinition::ZenChain { steps } | WinDefinition::WeeklyHold { steps } => steps
            .first()
            .map(|step| condition_viz(0, &step.condition))
            .unwrap_or_default(),
        WinDefinition::PlanChain { steps } => steps
            .first()
            .map(|step| plan_viz(0, &step.kind, config))
            .unwrap_or_default(),
    }
}

/// Objective, hold and lifecycle state for the active level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveState {
    win: WinDefinition,
    level_state: LevelState,
    objectives: Vec<Objective>,
    goal_viz: GoalViz,
    zen_hold_sec: f64,
    zen_chain_step: usize,
    zen_post_hold_remaining: Option<f64>,
    plan_step: usize,
    plan_hold_sec: f64,
    plan_flash_remaining: Option<f64>,
}

impl ObjectiveState {
    /// Build the objective list and counters for a freshly loaded level.
    #[must_use]
    pub fn new(win: WinDefinition, config: &WellConfig) -> Self {
        Self {
            objectives: build_objectives(&win, config),
            goal_viz: initial_viz(&win, config),
            win,
            level_state: LevelState::Playing,
            zen_hold_sec: 0.0,
            zen_chain_step: 0,
            zen_post_hold_remaining: None,
            plan_step: 0,
            plan_hold_sec: 0.0,
            plan_flash_remaining: None,
        }
    }

    #[must_use]
    pub fn win(&self) -> &WinDefinition {
        &self.win
    }

    #[must_use]
    pub const fn level_state(&self) -> LevelState {
        self.level_state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.level_state == LevelState::Playing
    }

    #[must_use]
    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    #[must_use]
    pub const fn goal_viz(&self) -> &GoalViz {
        &self.goal_viz
    }

    /// Continuous-satisfaction timer for band holds and chain steps.
    #[must_use]
    pub const fn zen_hold_sec(&self) -> f64 {
        self.zen_hold_sec
    }

    #[must_use]
    pub const fn zen_chain_step(&self) -> usize {
        self.zen_chain_step
    }

    /// Remaining confirmation time, once the satisfy phase is complete.
    #[must_use]
    pub const fn zen_post_hold_remaining(&self) -> Option<f64> {
        self.zen_post_hold_remaining
    }

    #[must_use]
    pub const fn plan_step(&self) -> usize {
        self.plan_step
    }

    #[must_use]
    pub const fn plan_hold_sec(&self) -> f64 {
        self.plan_hold_sec
    }

    #[must_use]
    pub const fn plan_flash_remaining(&self) -> Option<f64> {
        self.plan_flash_remaining
    }

    /// Leave `playing` for `outcome`. Returns `false` if the level already ended.
    pub(crate) fn finish(&mut self, outcome: LevelState) -> bool {
        if self.level_state != LevelState::Playing || outcome == LevelState::Playing {
            return false;
        }
        self.level_state = outcome;
        true
    }

    /// Evaluate the active win definition for one tick of `dt` simulated seconds.
    ///
    /// Does nothing once the level has ended.
    pub fn evaluate(&mut self, config: &WellConfig, state: &SimState, dt: f64) {
        if !self.is_playing() {
            return;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let psyche = *state.psyche();

        let won = match self.win.clone() {
            WinDefinition::AllOver { threshold } => {
                let met = all_over(&psyche, threshold);
                if let Some(objective) = self.objectives.first_mut() {
                    objective.complete = met;
                }
                self.goal_viz = GoalViz::uniform(0, HueGoal::AtLeast { value: threshold });
                met
            }
            WinDefinition::SomeOver { hues, threshold } => {
                for (objective, &hue) in self.objectives.iter_mut().zip(hues.iter()) {
                    objective.complete = psyche.get(hue).is_some_and(|&value| value >= threshold);
                }
                self.goal_viz = condition_viz(
                    0,
                    &StepCondition::HuesOver {
                        hues: hues.clone(),
                        threshold,
                    },
                );
                hues_over(&psyche, &hues, threshold)
            }
            WinDefinition::AllBandHold {
                low,
                high,
                hold_sec,
            } => {
                let met = all_in_band(&psyche, low, high);
                let done = self.advance_two_phase(met, hold_sec, config.plan_post_step_hold_sec, dt);
                if let Some(objective) = self.objectives.first_mut() {
                    objective.complete = done || self.zen_post_hold_remaining.is_some();
                }
                self.goal_viz = GoalViz::uniform(0, HueGoal::Band { low, high });
                done
            }
            WinDefinition::ZenChain { steps } | WinDefinition::WeeklyHold { steps } => {
                self.evaluate_chain(&steps, &psyche, config, dt)
            }
            WinDefinition::PlanChain { steps } => self.evaluate_plan(&steps, config, state, dt),
        };

        if won && self.finish(LevelState::Win) {
            info!(kind = self.win.kind_name(), "objectives complete; level won");
        }
    }

    /// Two-phase hold shared by band holds and chain steps. Returns `true`
    /// once both the satisfy and confirmation phases are complete.
    fn advance_two_phase(&mut self, met: bool, hold_sec: f64, confirm_sec: f64, dt: f64) -> bool {
        let latched = hold_sec <= 0.0 && self.zen_post_hold_remaining.is_some();
        if !met && !latched {
            self.zen_hold_sec = 0.0;
            self.zen_post_hold_remaining = None;
            return false;
        }
        if met {
            self.zen_hold_sec += dt;
        }
        match self.zen_post_hold_remaining {
            None => {
                if self.zen_hold_sec + HOLD_EPSILON < hold_sec {
                    return false;
                }
                self.zen_hold_sec = self.zen_hold_sec.max(hold_sec);
                if confirm_sec <= HOLD_EPSILON {
                    return true;
                }
                self.zen_post_hold_remaining = Some(confirm_sec);
                false
            }
            Some(remaining) => {
                let remaining = remaining - dt;
                if remaining <= HOLD_EPSILON {
                    self.zen_post_hold_remaining = Some(0.0);
                    true
                } else {
                    self.zen_post_hold_remaining = Some(remaining);
                    false
                }
            }
        }
    }

    fn evaluate_chain(
        &mut self,
        steps: &[ZenStep],
        psyche: &[f64; WELL_COUNT],
        config: &WellConfig,
        dt: f64,
    ) -> bool {
        let Some(step) = steps.get(self.zen_chain_step) else {
            return true;
        };
        let met = condition_met(&step.condition, psyche);
        let done = self.advance_two_phase(met, step.hold_sec, config.plan_post_step_hold_sec, dt);
        if !done {
            self.goal_viz = condition_viz(self.zen_chain_step, &step.condition);
            return false;
        }

        if let Some(objective) = self.objectives.get_mut(self.zen_chain_step) {
            objective.complete = true;
        }
        self.zen_chain_step += 1;
        self.zen_hold_sec = 0.0;
        self.zen_post_hold_remaining = None;
        debug!(step = self.zen_chain_step, "chain step complete");

        match steps.get(self.zen_chain_step) {
            Some(next) => {
                self.goal_viz = condition_viz(self.zen_chain_step, &next.condition);
                false
            }
            None => true,
        }
    }

    fn evaluate_plan(
        &mut self,
        steps: &[PlanStep],
        config: &WellConfig,
        state: &SimState,
        dt: f64,
    ) -> bool {
        let Some(step) = steps.get(self.plan_step) else {
            return true;
        };

        if let Some(remaining) = self.plan_flash_remaining {
            let remaining = remaining - dt;
            if remaining > HOLD_EPSILON {
                self.plan_flash_remaining = Some(remaining);
                return false;
            }
            return self.advance_plan(steps, config);
        }

        let required = step.hold_requirement(config);
        let met = plan_step_met(&step.kind, config, state);
        if met {
            self.plan_hold_sec += dt;
        } else {
            self.plan_hold_sec = 0.0;
        }
        self.goal_viz = plan_viz(self.plan_step, &step.kind, config);
        if !met || self.plan_hold_sec + HOLD_EPSILON < required {
            return false;
        }

        self.plan_hold_sec = self.plan_hold_sec.max(required);
        if let Some(objective) = self.objectives.get_mut(self.plan_step) {
            objective.complete = true;
        }
        if config.plan_flash_sec <= HOLD_EPSILON {
            return self.advance_plan(steps, config);
        }
        self.plan_flash_remaining = Some(config.plan_flash_sec);
        false
    }

    fn advance_plan(&mut self, steps: &[PlanStep], config: &WellConfig) -> bool {
        self.plan_step += 1;
        self.plan_hold_sec = 0.0;
        self.plan_flash_remaining = None;
        debug!(step = self.plan_step, "plan step complete");
        match steps.get(self.plan_step) {
            Some(next) => {
                self.goal_viz = plan_viz(self.plan_step, &next.kind, config);
                false
            }
            None => true,
        }
    }
}
