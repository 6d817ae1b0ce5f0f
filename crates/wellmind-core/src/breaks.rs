//! Mental breaks: psyche excursions and jams.
//!
//! A break cancels every disposition and applies a fixed relief, redirect
//! and penalty transform. Breaks are rate limited per tick identity (one hue
//! break, or up to two chained jams) and every applied break feeds the
//! rolling window that decides the lose condition. Nothing in this module
//! panics or fails; bad input is ignored.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collab::DispositionSource;
use crate::config::WellConfig;
use crate::objectives::{LevelState, ObjectiveState};
use crate::state::SimState;
use crate::{Tick, WELL_COUNT, hue_name, neighbors, opposite};

/// Jams allowed to chain within one tick.
pub const MAX_JAMS_PER_TICK: u8 = 2;
/// Distance from the amount edge a jammed well is restored to.
pub const JAM_AMOUNT_RELIEF: f64 = 15.0;
/// Spin shift applied to every well by an amount jam.
pub const JAM_SPIN_SHIFT: f64 = 15.0;
/// Spin every well is reset to (with the jam's sign) by a spin jam.
pub const JAM_SPIN_RESET: f64 = 80.0;
/// Amount added to every well by a spin jam.
pub const JAM_AMOUNT_BUMP: f64 = 20.0;
/// Psyche moved on each of the two penalised hues.
pub const JAM_PSYCHE_PENALTY: f64 = 100.0;

/// Which side of the psyche range a hue left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BreakDirection {
    Over,
    Under,
}

impl BreakDirection {
    const fn sign(self) -> f64 {
        match self {
            Self::Over => 1.0,
            Self::Under => -1.0,
        }
    }
}

/// Unresolved overflow reported by the spillover resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JamCause {
    #[serde(rename = "AMOUNT_HIGH_JAM")]
    AmountHigh,
    #[serde(rename = "AMOUNT_LOW_JAM")]
    AmountLow,
    #[serde(rename = "SPIN_MAX_JAM")]
    SpinMax,
    #[serde(rename = "SPIN_MIN_JAM")]
    SpinMin,
}

impl JamCause {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AmountHigh => "AMOUNT_HIGH_JAM",
            Self::AmountLow => "AMOUNT_LOW_JAM",
            Self::SpinMax => "SPIN_MAX_JAM",
            Self::SpinMin => "SPIN_MIN_JAM",
        }
    }

    /// Parse a wire code such as `SPIN_MAX_JAM`.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        [Self::AmountHigh, Self::AmountLow, Self::SpinMax, Self::SpinMin]
            .into_iter()
            .find(|cause| cause.code() == code)
    }

    /// Whether the psyche penalty lifts the lowest hues (`true`) or sinks the highest.
    const fn lifts_lowest(self) -> bool {
        matches!(self, Self::AmountHigh | Self::SpinMax)
    }
}

/// What triggered a break.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakCause {
    Hue {
        hue: usize,
        direction: BreakDirection,
    },
    Jam {
        cause: JamCause,
        index: usize,
    },
}

impl BreakCause {
    /// Key used for first-occurrence popups.
    #[must_use]
    pub fn popup_key(&self) -> String {
        match self {
            Self::Hue {
                direction: BreakDirection::Over,
                ..
            } => "hue_over".to_string(),
            Self::Hue {
                direction: BreakDirection::Under,
                ..
            } => "hue_under".to_string(),
            Self::Jam { cause, .. } => format!("jam:{}", cause.code()),
        }
    }
}

/// One entry in the break history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakRecord {
    /// Simulated time of the break.
    pub time: f64,
    pub tick: Tick,
    pub cause: BreakCause,
    pub details: String,
    pub message: String,
}

impl BreakRecord {
    /// Lines shared by the popup and the run log.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        vec![self.message.clone(), self.details.clone()]
    }
}

/// One-shot informational popup for the first break of a kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakPopup {
    pub key: String,
    pub lines: Vec<String>,
}

/// Result of a break check or jam trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakOutcome {
    /// Nothing out of bounds.
    Clear,
    /// The level has ended, or the input did not address a well.
    Ignored,
    /// A violation was found but this tick already used its break budget.
    Suppressed,
    /// A break was applied; `lost` is set when it ended the run.
    Broke { record: BreakRecord, lost: bool },
}

impl BreakOutcome {
    /// Whether the remainder of the tick should be skipped.
    #[must_use]
    pub const fn halts_tick(&self) -> bool {
        matches!(self, Self::Suppressed | Self::Broke { .. })
    }
}

/// Per-tick break counters.
#[derive(Debug, Clone, Copy, Default)]
struct TickGuard {
    tick: Option<Tick>,
    hue: u8,
    jam: u8,
}

impl TickGuard {
    fn roll(&mut self, tick: Tick) {
        if self.tick != Some(tick) {
            *self = Self {
                tick: Some(tick),
                hue: 0,
                jam: 0,
            };
        }
    }

    fn allow_hue(&mut self, tick: Tick) -> bool {
        self.roll(tick);
        self.hue == 0 && self.jam == 0
    }

    fn allow_jam(&mut self, tick: Tick) -> bool {
        self.roll(tick);
        self.hue == 0 && self.jam < MAX_JAMS_PER_TICK
    }
}

/// Everything a break needs to touch.
pub(crate) struct BreakContext<'a> {
    pub config: &'a WellConfig,
    pub state: &'a mut SimState,
    pub objectives: &'a mut ObjectiveState,
    pub dispositions: &'a mut dyn DispositionSource,
    pub now: f64,
    pub tick: Tick,
}

/// History, rate limiting and lose tracking for breaks.
#[derive(Debug, Clone)]
pub struct BreakState {
    capacity: usize,
    history: VecDeque<BreakRecord>,
    window: VecDeque<f64>,
    guard: TickGuard,
    popups_shown: BTreeSet<String>,
    pending_popups: VecDeque<BreakPopup>,
    run_log: Vec<String>,
    total: u64,
    lost_with: Option<usize>,
}

impl BreakState {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: VecDeque::with_capacity(capacity),
            window: VecDeque::new(),
            guard: TickGuard::default(),
            popups_shown: BTreeSet::new(),
            pending_popups: VecDeque::new(),
            run_log: Vec::new(),
            total: 0,
            lost_with: None,
        }
    }

    /// Forget per-level history and counters. Popups already shown stay
    /// shown and the run log keeps growing for the whole session.
    pub fn reset_for_level(&mut self) {
        self.history.clear();
        self.window.clear();
        self.guard = TickGuard::default();
        self.pending_popups.clear();
        self.total = 0;
        self.lost_with = None;
    }

    /// Most recent breaks, oldest first.
    #[must_use]
    pub fn history(&self) -> &VecDeque<BreakRecord> {
        &self.history
    }

    /// Breaks applied since the level started, including evicted ones.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Breaks inside the window at the moment the run was lost.
    #[must_use]
    pub const fn lost_with(&self) -> Option<usize> {
        self.lost_with
    }

    #[must_use]
    pub fn run_log(&self) -> &[String] {
        &self.run_log
    }

    /// Popup keys that have already been shown this session.
    #[must_use]
    pub fn popups_shown(&self) -> &BTreeSet<String> {
        &self.popups_shown
    }

    pub fn take_popup(&mut self) -> Option<BreakPopup> {
        self.pending_popups.pop_front()
    }

    /// Look for a hue outside `[0, psyche_hue_cap]` and break on the first one.
    pub(crate) fn check(&mut self, cx: BreakContext<'_>) -> BreakOutcome {
        if !cx.objectives.is_playing() {
            return BreakOutcome::Ignored;
        }
        let cap = cx.config.psyche_hue_cap;
        let violation = cx
            .state
            .psyche()
            .iter()
            .enumerate()
            .find_map(|(hue, &value)| {
                if value > cap {
                    Some((hue, BreakDirection::Over))
                } else if value < 0.0 {
                    Some((hue, BreakDirection::Under))
                } else {
                    None
                }
            });
        let Some((hue, direction)) = violation else {
            return BreakOutcome::Clear;
        };
        if !self.guard.allow_hue(cx.tick) {
            return BreakOutcome::Suppressed;
        }
        self.guard.hue += 1;
        self.hue_break(cx, hue, direction)
    }

    /// Escalate an unresolved overflow on well `index` into a jam break.
    pub(crate) fn trigger_jam(
        &mut self,
        cx: BreakContext<'_>,
        cause: JamCause,
        index: usize,
    ) -> BreakOutcome {
        if !cx.objectives.is_playing() || index >= WELL_COUNT {
            return BreakOutcome::Ignored;
        }
        if !self.guard.allow_jam(cx.tick) {
            return BreakOutcome::Suppressed;
        }
        self.guard.jam += 1;
        self.jam_break(cx, cause, index)
    }

    fn hue_break(
        &mut self,
        cx: BreakContext<'_>,
        hue: usize,
        direction: BreakDirection,
    ) -> BreakOutcome {
        cx.dispositions.cancel_all();
        let config = cx.config;
        let sign = direction.sign();
        let before = cx.state.psyche()[hue];
        let safe = match direction {
            BreakDirection::Over => config.psyche_hue_cap - config.break_safe_margin,
            BreakDirection::Under => config.break_safe_margin,
        };
        let target = opposite(hue);

        cx.state.guarded("hue_break", |s| {
            let removed = s.well(hue).map_or(0.0, |well| well.spin);
            s.set_psyche(hue, safe);
            s.set_spin(hue, 0.0);
            s.add_psyche(target, -sign * config.break_redirect);
            let spill = sign * removed.abs() / 2.0;
            for neighbour in neighbors(hue) {
                if let Some(well) = s.well(neighbour) {
                    s.set_spin(neighbour, config.clamp_spin_soft(well.spin + spill));
                }
            }
            if let Some(well) = s.well(target) {
                s.set_spin(
                    target,
                    config.clamp_spin_soft(well.spin + sign * config.break_penalty_spin),
                );
            }
        });

        let (verb, redirect, penalty) = match direction {
            BreakDirection::Over => ("overloaded", "-", "+"),
            BreakDirection::Under => ("collapsed", "+", "-"),
        };
        let message = format!("Mental break: {} {verb}", hue_name(hue));
        let details = format!(
            "{} psyche {before:.0} -> {safe:.0}; {} psyche {redirect}{}; {} spin {penalty}{}",
            hue_name(hue),
            hue_name(target),
            config.break_redirect,
            hue_name(target),
            config.break_penalty_spin,
        );
        warn!(hue, ?direction, psyche = before, "hue break");
        self.record(cx, BreakCause::Hue { hue, direction }, message, details)
    }

    fn jam_break(&mut self, cx: BreakContext<'_>, cause: JamCause, index: usize) -> BreakOutcome {
        cx.dispositions.cancel_all();
        let config = cx.config;

        let penalised = cx.state.guarded("jam_break", |s| {
            match cause {
                JamCause::AmountHigh | JamCause::AmountLow => {
                    let (relief, shift) = if cause == JamCause::AmountHigh {
                        (config.amount_max - JAM_AMOUNT_RELIEF, JAM_SPIN_SHIFT)
                    } else {
                        (config.amount_min + JAM_AMOUNT_RELIEF, -JAM_SPIN_SHIFT)
                    };
                    s.set_amount(index, relief);
                    for i in 0..WELL_COUNT {
                        if let Some(well) = s.well(i) {
                            s.set_spin(i, config.clamp_spin_soft(well.spin + shift));
                        }
                    }
                }
                JamCause::SpinMax | JamCause::SpinMin => {
                    let spin = if cause == JamCause::SpinMax {
                        JAM_SPIN_RESET
                    } else {
                        -JAM_SPIN_RESET
                    };
                    for i in 0..WELL_COUNT {
                        if let Some(well) = s.well(i) {
                            s.set_spin(i, spin);
                            s.set_amount(i, well.amount + JAM_AMOUNT_BUMP);
                        }
                    }
                }
            }

            let delta = if cause.lifts_lowest() {
                JAM_PSYCHE_PENALTY
            } else {
                -JAM_PSYCHE_PENALTY
            };
            let penalised = extreme_hues(s.psyche(), cause.lifts_lowest());
            for hue in penalised {
                s.add_psyche(hue, delta);
            }
            penalised
        });

        let message = format!("Mental break: {} jammed ({})", hue_name(index), cause.code());
        let details = format!(
            "{} and {} psyche {}{JAM_PSYCHE_PENALTY}",
            hue_name(penalised[0]),
            hue_name(penalised[1]),
            if cause.lifts_lowest() { "+" } else { "-" },
        );
        warn!(index, cause = cause.code(), "jam break");
        self.record(cx, BreakCause::Jam { cause, index }, message, details)
    }

    fn record(
        &mut self,
        cx: BreakContext<'_>,
        cause: BreakCause,
        message: String,
        details: String,
    ) -> BreakOutcome {
        let record = BreakRecord {
            time: cx.now,
            tick: cx.tick,
            cause,
            details,
            message,
        };

        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        self.total += 1;

        let lines = record.lines();
        self.run_log.extend(lines.iter().cloned());
        let key = cause.popup_key();
        if self.popups_shown.insert(key.clone()) {
            self.pending_popups.push_back(BreakPopup { key, lines });
        }

        let lost = self.note_in_window(cx.config, cx.objectives, cx.now);
        BreakOutcome::Broke { record, lost }
    }

    /// Track `now` in the rolling window and end the run when it fills up.
    fn note_in_window(
        &mut self,
        config: &WellConfig,
        objectives: &mut ObjectiveState,
        now: f64,
    ) -> bool {
        self.window.push_back(now);
        while self
            .window
            .front()
            .is_some_and(|&time| now - time > config.lose_window_sec)
        {
            self.window.pop_front();
        }
        let count = self.window.len();
        if count < config.lose_break_count || !objectives.finish(LevelState::Lose) {
            return false;
        }
        self.lost_with = Some(count);
        self.run_log
            .push("Too many mental breaks. The session is over.".to_string());
        self.run_log.push(format!(
            "{count} breaks within {}s",
            config.lose_window_sec
        ));
        info!(breaks = count, window = config.lose_window_sec, "level lost");
        true
    }
}

/// The two lowest (`lowest == true`) or highest hues, ties to the lower index.
fn extreme_hues(psyche: &[f64; WELL_COUNT], lowest: bool) -> [usize; 2] {
    let mut order: [usize; WELL_COUNT] = std::array::from_fn(|i| i);
    order.sort_by(|&a, &b| {
        let by_value = if lowest {
            psyche[a].total_cmp(&psyche[b])
        } else {
            psyche[b].total_cmp(&psyche[a])
        };
        by_value.then(a.cmp(&b))
    });
    [order[0], order[1]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{NullDispositions, ScriptedDispositions};
    use crate::level::{DispositionSpec, DispositionTarget, LevelDefinition, StartState, WinDefinition};
    use crate::state::Well;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    struct Fixture {
        config: WellConfig,
        state: SimState,
        objectives: ObjectiveState,
        dispositions: NullDispositions,
        breaks: BreakState,
    }

    impl Fixture {
        fn new(psyche: [f64; WELL_COUNT]) -> Self {
            let config = WellConfig::default();
            let objectives =
                ObjectiveState::new(WinDefinition::AllOver { threshold: 450.0 }, &config);
            let breaks = BreakState::new(config.break_history_capacity);
            Self {
                state: SimState::new([Well::new(50.0, 10.0); WELL_COUNT], psyche, 50.0),
                config,
                objectives,
                dispositions: NullDispositions,
                breaks,
            }
        }

        fn check(&mut self, now: f64, tick: u64) -> BreakOutcome {
            self.breaks.check(BreakContext {
                config: &self.config,
                state: &mut self.state,
                objectives: &mut self.objectives,
                dispositions: &mut self.dispositions,
                now,
                tick: Tick(tick),
            })
        }

        fn jam(&mut self, cause: JamCause, index: usize, now: f64, tick: u64) -> BreakOutcome {
            self.breaks.trigger_jam(
                BreakContext {
                    config: &self.config,
                    state: &mut self.state,
                    objectives: &mut self.objectives,
                    dispositions: &mut self.dispositions,
                    now,
                    tick: Tick(tick),
                },
                cause,
                index,
            )
        }
    }

    #[test]
    fn in_range_psyche_is_clear() {
        let mut fx = Fixture::new([0.0, 500.0, 250.0, 250.0, 250.0, 250.0]);
        assert_eq!(fx.check(0.0, 1), BreakOutcome::Clear);
        assert!(fx.breaks.history().is_empty());
    }

    #[test]
    fn hue_over_break_relieves_redirects_and_penalises() {
        let mut psyche = [250.0; WELL_COUNT];
        psyche[1] = 520.0;
        let mut fx = Fixture::new(psyche);
        fx.state.guarded("setup", |s| s.set_spin(1, -30.0));

        let outcome = fx.check(2.0, 7);
        assert!(outcome.halts_tick());
        assert_eq!(fx.state.psyche()[1], 480.0);
        assert_eq!(fx.state.wells()[1].spin, 0.0);
        assert_eq!(fx.state.psyche()[4], 230.0);
        // Neighbours 0 and 2 receive half the removed magnitude, positive for over.
        assert!(approx_eq(fx.state.wells()[0].spin, 25.0));
        assert!(approx_eq(fx.state.wells()[2].spin, 25.0));
        assert!(approx_eq(fx.state.wells()[4].spin, 35.0));
        assert_eq!(fx.state.unguarded_writes(), 0);

        let record = &fx.breaks.history()[0];
        assert_eq!(
            record.cause,
            BreakCause::Hue {
                hue: 1,
                direction: BreakDirection::Over
            }
        );
        assert_eq!(record.tick, Tick(7));
    }

    #[test]
    fn hue_under_break_mirrors_signs() {
        let mut psyche = [250.0; WELL_COUNT];
        psyche[3] = -4.0;
        let mut fx = Fixture::new(psyche);
        fx.check(0.0, 1);
        assert_eq!(fx.state.psyche()[3], 20.0);
        assert_eq!(fx.state.psyche()[0], 270.0);
        assert!(approx_eq(fx.state.wells()[2].spin, 5.0));
        assert!(approx_eq(fx.state.wells()[4].spin, 5.0));
        assert!(approx_eq(fx.state.wells()[0].spin, -15.0));
    }

    #[test]
    fn hue_break_cancels_dispositions() {
        let config = WellConfig::default();
        let mut dispositions = ScriptedDispositions::new();
        dispositions.init_level(&LevelDefinition {
            id: 1,
            name: None,
            start: StartState::default(),
            energy: None,
            dispositions: vec![DispositionSpec {
                hue: 0,
                target: DispositionTarget::Spin,
                rate_per_sec: 5.0,
                delay_sec: 0.0,
                duration_sec: None,
            }],
            win: WinDefinition::AllOver { threshold: 450.0 },
        });
        let mut psyche = [250.0; WELL_COUNT];
        psyche[0] = 501.0;
        let mut state = SimState::new([Well::new(50.0, 0.0); WELL_COUNT], psyche, 50.0);
        let mut objectives = ObjectiveState::new(WinDefinition::AllOver { threshold: 450.0 }, &config);
        let mut breaks = BreakState::new(4);
        breaks.check(BreakContext {
            config: &config,
            state: &mut state,
            objectives: &mut objectives,
            dispositions: &mut dispositions,
            now: 0.0,
            tick: Tick(1),
        });
        assert_eq!(dispositions.active_count(), 0);
    }

    #[test]
    fn amount_high_jam_lifts_the_two_lowest_hues() {
        let mut fx = Fixture::new([300.0, 120.0, 400.0, 120.0, 90.0, 200.0]);
        let spins: Vec<f64> = fx.state.wells().iter().map(|w| w.spin).collect();
        fx.jam(JamCause::AmountHigh, 2, 1.0, 3);

        assert_eq!(fx.state.wells()[2].amount, 85.0);
        for (well, before) in fx.state.wells().iter().zip(spins) {
            assert!(approx_eq(well.spin, before + 15.0));
        }
        // Lowest is hue 4 (90); hues 1 and 3 tie at 120, lower index wins.
        assert_eq!(fx.state.psyche()[4], 190.0);
        assert_eq!(fx.state.psyche()[1], 220.0);
        assert_eq!(fx.state.psyche()[3], 120.0);
    }

    #[test]
    fn spin_jams_reset_every_well() {
        let mut fx = Fixture::new([300.0, 120.0, 400.0, 120.0, 90.0, 200.0]);
        fx.jam(JamCause::SpinMin, 0, 0.0, 1);
        for well in fx.state.wells() {
            assert_eq!(well.spin, -80.0);
            assert_eq!(well.amount, 70.0);
        }
        // Highest two, 400 and 300, sink by 100; amounts overshoot is left alone.
        assert_eq!(fx.state.psyche()[2], 300.0);
        assert_eq!(fx.state.psyche()[0], 200.0);
    }

    #[test]
    fn jam_budget_allows_one_cascade_per_tick() {
        let mut fx = Fixture::new([250.0; WELL_COUNT]);
        assert!(matches!(fx.jam(JamCause::SpinMax, 0, 0.0, 5), BreakOutcome::Broke { .. }));
        assert!(matches!(fx.jam(JamCause::SpinMax, 1, 0.0, 5), BreakOutcome::Broke { .. }));
        assert_eq!(fx.jam(JamCause::SpinMax, 2, 0.0, 5), BreakOutcome::Suppressed);
        assert!(matches!(fx.jam(JamCause::AmountLow, 2, 0.1, 6), BreakOutcome::Broke { .. }));
    }

    #[test]
    fn hue_break_cannot_follow_a_jam_in_the_same_tick() {
        let mut psyche = [250.0; WELL_COUNT];
        psyche[5] = 700.0;
        let mut fx = Fixture::new(psyche);
        fx.jam(JamCause::AmountLow, 0, 0.0, 9);
        assert_eq!(fx.check(0.0, 9), BreakOutcome::Suppressed);
        assert!(matches!(fx.check(0.05, 10), BreakOutcome::Broke { .. }));
        // And a jam cannot follow that hue break either.
        assert_eq!(fx.jam(JamCause::AmountLow, 0, 0.05, 10), BreakOutcome::Suppressed);
    }

    #[test]
    fn four_breaks_inside_the_window_lose_the_run() {
        let mut fx = Fixture::new([250.0; WELL_COUNT]);
        for (k, time) in [0.0, 1.0, 2.0].into_iter().enumerate() {
            let outcome = fx.jam(JamCause::SpinMax, 0, time, k as u64);
            assert!(matches!(outcome, BreakOutcome::Broke { lost: false, .. }));
        }
        let outcome = fx.jam(JamCause::SpinMax, 0, 3.0, 3);
        assert!(matches!(outcome, BreakOutcome::Broke { lost: true, .. }));
        assert_eq!(fx.objectives.level_state(), LevelState::Lose);
        assert_eq!(fx.breaks.lost_with(), Some(4));
        assert_eq!(fx.jam(JamCause::SpinMax, 0, 3.5, 4), BreakOutcome::Ignored);
    }

    #[test]
    fn old_breaks_fall_out_of_the_window() {
        let mut fx = Fixture::new([250.0; WELL_COUNT]);
        for (k, time) in [0.0, 1.0, 2.0, 5.5].into_iter().enumerate() {
            fx.jam(JamCause::SpinMax, 0, time, k as u64);
        }
        assert_eq!(fx.objectives.level_state(), LevelState::Playing);
    }

    #[test]
    fn popups_fire_once_per_key_and_match_the_log() {
        let mut fx = Fixture::new([250.0; WELL_COUNT]);
        fx.jam(JamCause::SpinMax, 0, 0.0, 1);
        fx.jam(JamCause::SpinMax, 1, 10.0, 2);
        let popup = fx.breaks.take_popup().expect("first jam popup");
        assert_eq!(popup.key, "jam:SPIN_MAX_JAM");
        assert_eq!(&fx.breaks.run_log()[..2], popup.lines.as_slice());
        assert!(fx.breaks.take_popup().is_none());
        assert_eq!(fx.breaks.run_log().len(), 4);
    }

    #[test]
    fn hue_popups_fire_once_per_direction_with_the_logged_lines() {
        let mut psyche = [250.0; WELL_COUNT];
        psyche[1] = 520.0;
        let mut fx = Fixture::new(psyche);
        assert!(matches!(fx.check(0.0, 1), BreakOutcome::Broke { .. }));
        fx.state.guarded("setup", |s| s.set_psyche(2, 530.0));
        assert!(matches!(fx.check(10.0, 2), BreakOutcome::Broke { .. }));
        fx.state.guarded("setup", |s| s.set_psyche(5, -5.0));
        assert!(matches!(fx.check(20.0, 3), BreakOutcome::Broke { .. }));
        assert_eq!(fx.breaks.run_log().len(), 6);

        let over = fx.breaks.take_popup().expect("hue over popup");
        assert_eq!(over.key, "hue_over");
        assert_eq!(over.lines[0], "Mental break: Yellow overloaded");
        assert_eq!(&fx.breaks.run_log()[..2], over.lines.as_slice());

        let under = fx.breaks.take_popup().expect("hue under popup");
        assert_eq!(under.key, "hue_under");
        assert_eq!(under.lines[0], "Mental break: Magenta collapsed");
        assert_eq!(&fx.breaks.run_log()[4..], under.lines.as_slice());

        assert!(fx.breaks.take_popup().is_none());
        assert_eq!(fx.breaks.popups_shown().len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let mut fx = Fixture::new([250.0; WELL_COUNT]);
        fx.breaks = BreakState::new(2);
        for k in 0..5u64 {
            fx.jam(JamCause::AmountLow, 0, k as f64 * 10.0, k);
        }
        assert_eq!(fx.breaks.history().len(), 2);
        assert_eq!(fx.breaks.total(), 5);
        assert_eq!(fx.breaks.history()[0].tick, Tick(3));
    }

    #[test]
    fn bad_jam_index_is_ignored() {
        let mut fx = Fixture::new([250.0; WELL_COUNT]);
        assert_eq!(fx.jam(JamCause::AmountHigh, 6, 0.0, 1), BreakOutcome::Ignored);
        assert_eq!(JamCause::from_code("SPIN_MIN_JAM"), Some(JamCause::SpinMin));
        assert_eq!(JamCause::from_code("nope"), None);
    }
}
