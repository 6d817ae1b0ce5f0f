//! Player commands and the uniform dispatch result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::{ActionError, ActionLayer, ActionReceipt, ChargeMode};
use crate::state::SimState;

const fn float_charge() -> ChargeMode {
    ChargeMode::Float
}

/// Every player-facing mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    SelectWell {
        index: usize,
    },
    /// Relative nudge; `index: None` targets the selected well.
    FlickStep {
        #[serde(default)]
        index: Option<usize>,
        d_amount: f64,
        d_spin: f64,
        #[serde(default)]
        charge: ChargeMode,
    },
    SpinZero {
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        charge: ChargeMode,
    },
    ZeroPair {
        #[serde(default)]
        index: Option<usize>,
    },
    /// Absolute targets on the per-well apply path.
    ApplyTarget {
        #[serde(default)]
        index: Option<usize>,
        amount: f64,
        spin: f64,
        #[serde(default = "float_charge")]
        charge: ChargeMode,
    },
}

fn index_arg(value: Option<&Value>) -> Result<Option<usize>, ActionError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(index) => Ok(Some(usize::try_from(index).unwrap_or(usize::MAX))),
            None => Err(ActionError::InvalidIndex(usize::MAX)),
        },
    }
}

fn number_arg(value: Option<&Value>, action: &str, expected: usize) -> Result<f64, ActionError> {
    value
        .and_then(Value::as_f64)
        .ok_or_else(|| ActionError::MissingArgs {
            action: action.to_string(),
            expected,
        })
}

fn charge_arg(value: Option<&Value>, default: ChargeMode) -> ChargeMode {
    value
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or(default)
}

impl Command {
    /// Historical action name, as accepted by [`Command::parse`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SelectWell { .. } => "selectWell",
            Self::FlickStep { .. } => "flickStep",
            Self::SpinZero { .. } => "spinZero",
            Self::ZeroPair { .. } => "zeroPair",
            Self::ApplyTarget { .. } => "applyTarget",
        }
    }

    /// Build a command from an action name and positional JSON arguments.
    ///
    /// A `null` or absent index means "the selected well". A trailing
    /// `"integer"` or `"float"` picks the charge mode.
    pub fn parse(name: &str, args: &[Value]) -> Result<Self, ActionError> {
        match name {
            "selectWell" => index_arg(args.first())?
                .map(|index| Self::SelectWell { index })
                .ok_or(ActionError::NoSelection),
            "flickStep" => Ok(Self::FlickStep {
                index: index_arg(args.first())?,
                d_amount: number_arg(args.get(1), name, 3)?,
                d_spin: number_arg(args.get(2), name, 3)?,
                charge: charge_arg(args.get(3), ChargeMode::Integer),
            }),
            "spinZero" => Ok(Self::SpinZero {
                index: index_arg(args.first())?,
                charge: charge_arg(args.get(1), ChargeMode::Integer),
            }),
            "zeroPair" => Ok(Self::ZeroPair {
                index: index_arg(args.first())?,
            }),
            "applyTarget" => Ok(Self::ApplyTarget {
                index: index_arg(args.first())?,
                amount: number_arg(args.get(1), name, 3)?,
                spin: number_arg(args.get(2), name, 3)?,
                charge: charge_arg(args.get(3), ChargeMode::Float),
            }),
            other => Err(ActionError::MissingAction(other.to_string())),
        }
    }

    /// Run the command against `state` through the action layer.
    pub(crate) fn execute(
        self,
        layer: &ActionLayer<'_>,
        state: &mut SimState,
    ) -> Result<ActionReceipt, ActionError> {
        match self {
            Self::SelectWell { index } => layer.select_well(state, index),
            Self::FlickStep {
                index,
                d_amount,
                d_spin,
                charge,
            } => layer.flick_step(state, index, d_amount, d_spin, charge),
            Self::SpinZero { index, charge } => layer.spin_zero(state, index, charge),
            Self::ZeroPair { index } => layer.zero_pair(state, index),
            Self::ApplyTarget {
                index,
                amount,
                spin,
                charge,
            } => layer.apply_target(state, index, amount, spin, charge),
        }
    }
}

/// Serialisable `{ok, reason?, cost?, index?}` record for the named surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub controls_revision: u64,
}

impl ActionResponse {
    #[must_use]
    pub fn from_result(result: &Result<ActionReceipt, ActionError>, controls_revision: u64) -> Self {
        match result {
            Ok(receipt) => Self {
                ok: true,
                reason: None,
                cost: Some(receipt.charged),
                index: receipt.index,
                controls_revision,
            },
            Err(error) => Self {
                ok: false,
                reason: Some(error.reason().to_string()),
                cost: None,
                index: None,
                controls_revision,
            },
        }
    }
}
