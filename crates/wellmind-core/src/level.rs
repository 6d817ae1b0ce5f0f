//! Level and win-condition definitions.
//!
//! Win definitions are a closed algebraic type built directly by whatever
//! generates plans; there is no template text to expand.

use serde::{Deserialize, Serialize};

use crate::WELL_COUNT;
use crate::config::WellConfig;
use crate::state::Well;
use crate::world::WorldError;

/// Immutable description of one level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelDefinition {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start: StartState,
    /// Starting energy; `None` uses `WellConfig::energy_start`.
    #[serde(default)]
    pub energy: Option<f64>,
    #[serde(default)]
    pub dispositions: Vec<DispositionSpec>,
    pub win: WinDefinition,
}

/// How wells and psyche are seeded when a level starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartState {
    /// Sample each well and hue uniformly from inclusive ranges.
    Ranges {
        amount: [f64; 2],
        spin: [f64; 2],
        psyche: [f64; 2],
    },
    /// Use the listed values verbatim (still clamped to legal ranges).
    Exact {
        wells: [Well; WELL_COUNT],
        psyche: [f64; WELL_COUNT],
    },
}

impl Default for StartState {
    fn default() -> Self {
        Self::Ranges {
            amount: [40.0, 80.0],
            spin: [-20.0, 20.0],
            psyche: [150.0, 250.0],
        }
    }
}

/// Which well quantity a disposition perturbs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DispositionTarget {
    Amount,
    Spin,
}

/// Data for one scripted disposition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispositionSpec {
    pub hue: usize,
    pub target: DispositionTarget,
    pub rate_per_sec: f64,
    #[serde(default)]
    pub delay_sec: f64,
    /// `None` keeps the disposition running until cancelled.
    #[serde(default)]
    pub duration_sec: Option<f64>,
}

/// Optional per-hue bounds; `None` leaves that side unconstrained.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct HueBounds {
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
}

impl HueBounds {
    /// Inclusive containment check.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.low.is_none_or(|low| value >= low) && self.high.is_none_or(|high| value <= high)
    }
}

/// Condition evaluated by zen-chain and weekly-hold steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCondition {
    /// Every hue within `[low, high]`.
    Band { low: f64, high: f64 },
    /// Every hue at or above `threshold`.
    Over { threshold: f64 },
    /// The listed hues at or above `threshold`.
    HuesOver { hues: Vec<usize>, threshold: f64 },
    /// Explicit bounds for each hue.
    PerHue { bounds: [HueBounds; WELL_COUNT] },
}

/// One step of a zen chain or weekly hold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZenStep {
    pub condition: StepCondition,
    pub hold_sec: f64,
    #[serde(default)]
    pub text: Option<String>,
}

/// Condition kinds available to treatment-plan steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStepKind {
    AllOver {
        threshold: f64,
    },
    /// Hues in `high_hues` must reach `high`; hues in `low_hues` must stay at or below `low`.
    SetBounds {
        high_hues: Vec<usize>,
        high: f64,
        low_hues: Vec<usize>,
        low: f64,
    },
    PerHueBounds {
        bounds: [HueBounds; WELL_COUNT],
    },
    AllBand {
        low: f64,
        high: f64,
    },
    /// Every spin within `spin_zero_epsilon` of zero.
    SpinZero,
}

/// One step of a treatment plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    #[serde(flatten)]
    pub kind: PlanStepKind,
    /// Hold requirement; `None` uses the configured default for the kind.
    #[serde(default)]
    pub hold_sec: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
}

impl PlanStep {
    /// Effective hold requirement for this step.
    #[must_use]
    pub fn hold_requirement(&self, config: &WellConfig) -> f64 {
        self.hold_sec.unwrap_or(match self.kind {
            PlanStepKind::SpinZero => config.spin_zero_hold_sec,
            _ => config.plan_step_hold_sec,
        })
    }
}

/// The active win condition of a level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WinDefinition {
    AllOver { threshold: f64 },
    SomeOver { hues: Vec<usize>, threshold: f64 },
    AllBandHold { low: f64, high: f64, hold_sec: f64 },
    ZenChain { steps: Vec<ZenStep> },
    PlanChain { steps: Vec<PlanStep> },
    WeeklyHold { steps: Vec<ZenStep> },
}

impl WinDefinition {
    /// Number of objectives this definition exposes.
    #[must_use]
    pub fn step_count(&self) -> usize {
        match self {
            Self::AllOver { .. } | Self::AllBandHold { .. } => 1,
            Self::SomeOver { hues, .. } => hues.len(),
            Self::ZenChain { steps } | Self::WeeklyHold { steps } => steps.len(),
            Self::PlanChain { steps } => steps.len(),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AllOver { .. } => "ALL_OVER",
            Self::SomeOver { .. } => "SOME_OVER",
            Self::AllBandHold { .. } => "ALL_BAND_HOLD",
            Self::ZenChain { .. } => "ZEN_CHAIN",
            Self::PlanChain { .. } => "PLAN_CHAIN",
            Self::WeeklyHold { .. } => "WEEKLY_HOLD",
        }
    }
}

fn check_hues(hues: &[usize]) -> Result<(), WorldError> {
    if let Some(bad) = hues.iter().find(|&&hue| hue >= WELL_COUNT) {
        return Err(WorldError::InvalidLevel(format!("hue index {bad} out of range")));
    }
    Ok(())
}

fn check_band(low: f64, high: f64) -> Result<(), WorldError> {
    if !low.is_finite() || !high.is_finite() || low > high {
        return Err(WorldError::InvalidLevel(format!(
            "band [{low}, {high}] is empty or non-finite"
        )));
    }
    Ok(())
}

fn check_hold(hold: f64) -> Result<(), WorldError> {
    if !hold.is_finite() || hold < 0.0 {
        return Err(WorldError::InvalidLevel(format!(
            "hold {hold} must be a non-negative number of seconds"
        )));
    }
    Ok(())
}

fn check_bounds(bounds: &[HueBounds; WELL_COUNT]) -> Result<(), WorldError> {
    for entry in bounds {
        if let (Some(low), Some(high)) = (entry.low, entry.high) {
            check_band(low, high)?;
        }
    }
    Ok(())
}

fn check_condition(condition: &StepCondition) -> Result<(), WorldError> {
    match condition {
        StepCondition::Band { low, high } => check_band(*low, *high),
        StepCondition::Over { threshold } => check_band(*threshold, *threshold),
        StepCondition::HuesOver { hues, threshold } => {
            if hues.is_empty() {
                return Err(WorldError::InvalidLevel("HUES_OVER needs at least one hue".into()));
            }
            check_hues(hues)?;
            check_band(*threshold, *threshold)
        }
        StepCondition::PerHue { bounds } => check_bounds(bounds),
    }
}

impl LevelDefinition {
    /// Checks that the definition can drive a world built from `config`.
    pub fn validate(&self, config: &WellConfig) -> Result<(), WorldError> {
        if let Some(energy) = self.energy
            && (!energy.is_finite() || energy < 0.0 || energy > config.energy_cap)
        {
            return Err(WorldError::InvalidLevel(format!(
                "starting energy {energy} outside [0, {}]",
                config.energy_cap
            )));
        }
        if let StartState::Ranges {
            amount,
            spin,
            psyche,
        } = &self.start
        {
            check_band(amount[0], amount[1])?;
            check_band(spin[0], spin[1])?;
            check_band(psyche[0], psyche[1])?;
        }
        for spec in &self.dispositions {
            check_hues(&[spec.hue])?;
            if !spec.rate_per_sec.is_finite() || !spec.delay_sec.is_finite() {
                return Err(WorldError::InvalidLevel(
                    "disposition rates and delays must be finite".into(),
                ));
            }
        }

        match &self.win {
            WinDefinition::AllOver { threshold } => check_band(*threshold, *threshold),
            WinDefinition::SomeOver { hues, threshold } => {
                if hues.is_empty() {
                    return Err(WorldError::InvalidLevel("SOME_OVER needs at least one hue".into()));
                }
                check_hues(hues)?;
                check_band(*threshold, *threshold)
            }
            WinDefinition::AllBandHold {
                low,
                high,
                hold_sec,
            } => {
                check_band(*low, *high)?;
                check_hold(*hold_sec)
            }
            WinDefinition::ZenChain { steps } | WinDefinition::WeeklyHold { steps } => {
                if steps.is_empty() {
                    return Err(WorldError::InvalidLevel("chain has no steps".into()));
                }
                for step in steps {
                    check_condition(&step.condition)?;
                    check_hold(step.hold_sec)?;
                }
                Ok(())
            }
            WinDefinition::PlanChain { steps } => {
                if steps.is_empty() {
                    return Err(WorldError::InvalidLevel("plan has no steps".into()));
                }
                for step in steps {
                    if let Some(hold) = step.hold_sec {
                        check_hold(hold)?;
                    }
                    match &step.kind {
                        PlanStepKind::AllOver { threshold } => check_band(*threshold, *threshold)?,
                        PlanStepKind::SetBounds {
                            high_hues,
                            high,
                            low_hues,
                            low,
                        } => {
                            check_hues(high_hues)?;
                            check_hues(low_hues)?;
                            check_band(*low, *low)?;
                            check_band(*high, *high)?;
                        }
                        PlanStepKind::PerHueBounds { bounds } => check_bounds(bounds)?,
                        PlanStepKind::AllBand { low, high } => check_band(*low, *high)?,
                        PlanStepKind::SpinZero => {}
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_chain_parses_from_json() {
        let json = r#"{
            "id": 7,
            "win": {
                "type": "PLAN_CHAIN",
                "steps": [
                    { "kind": "SPIN_ZERO" },
                    { "kind": "ALL_BAND", "low": 100.0, "high": 200.0, "hold_sec": 5.0 },
                    { "kind": "SET_BOUNDS", "high_hues": [0, 2], "high": 300.0,
                      "low_hues": [3], "low": 50.0, "text": "Lift red and green" }
                ]
            }
        }"#;
        let level: LevelDefinition = serde_json::from_str(json).expect("level");
        assert_eq!(level.win.step_count(), 3);
        assert_eq!(level.win.kind_name(), "PLAN_CHAIN");
        let config = WellConfig::default();
        assert!(level.validate(&config).is_ok());
        if let WinDefinition::PlanChain { steps } = &level.win {
            assert_eq!(steps[0].hold_requirement(&config), 3.0);
            assert_eq!(steps[1].hold_requirement(&config), 5.0);
            assert_eq!(steps[2].hold_requirement(&config), 10.0);
            assert_eq!(steps[2].text.as_deref(), Some("Lift red and green"));
        } else {
            panic!("expected plan chain");
        }
    }

    #[test]
    fn rejects_out_of_range_hues_and_empty_bands() {
        let config = WellConfig::default();
        let level = LevelDefinition {
            id: 1,
            name: None,
            start: StartState::default(),
            energy: None,
            dispositions: Vec::new(),
            win: WinDefinition::SomeOver {
                hues: vec![1, 6],
                threshold: 200.0,
            },
        };
        assert!(matches!(
            level.validate(&config),
            Err(WorldError::InvalidLevel(_))
        ));

        let level = LevelDefinition {
            win: WinDefinition::AllBandHold {
                low: 200.0,
                high: 100.0,
                hold_sec: 5.0,
            },
            ..level
        };
        assert!(level.validate(&config).is_err());
    }

    #[test]
    fn hue_bounds_are_inclusive() {
        let bounds = HueBounds {
            low: Some(10.0),
            high: Some(20.0),
        };
        assert!(bounds.contains(10.0));
        assert!(bounds.contains(20.0));
        assert!(!bounds.contains(20.000_001));
        assert!(HueBounds::default().contains(-5.0));
    }
}
