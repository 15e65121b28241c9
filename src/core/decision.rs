use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use comfy_table::Color;
use enumset::{EnumSet, EnumSetType, enum_set};
use serde::{Deserialize, Serialize};

use crate::core::strategy::Strategy;

#[derive(Debug, Hash, Serialize, Deserialize, EnumSetType)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Forced charging from the grid.
    ChargeGrid,

    /// Charging from the PV surplus only.
    ChargeSolar,

    /// No grid charging, solar first.
    StopCharging,

    /// Cover the household load from the battery.
    Discharge,

    /// Battery is full, surplus goes to the grid.
    ExportSolar,

    Monitor,
    Idle,
    Error,
}

impl Action {
    /// Actions which translate into inverter commands.
    pub const COMMANDED: EnumSet<Self> =
        enum_set!(Action::ChargeGrid | Action::ChargeSolar | Action::StopCharging | Action::Discharge);

    #[must_use]
    pub fn is_commanded(self) -> bool {
        Self::COMMANDED.contains(self)
    }

    pub const fn color(self) -> Color {
        match self {
            Self::ChargeGrid => Color::Green,
            Self::ChargeSolar => Color::DarkYellow,
            Self::StopCharging => Color::Magenta,
            Self::Discharge => Color::Blue,
            Self::ExportSolar => Color::Cyan,
            Self::Monitor | Self::Idle => Color::Reset,
            Self::Error => Color::Red,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChargeGrid => write!(f, "Charge from grid"),
            Self::ChargeSolar => write!(f, "Charge from solar"),
            Self::StopCharging => write!(f, "Stop charging"),
            Self::Discharge => write!(f, "Discharge"),
            Self::ExportSolar => write!(f, "Export solar"),
            Self::Monitor => write!(f, "Monitor"),
            Self::Idle => write!(f, "Idle"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Outcome of a single evaluation, immutable once made.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,

    /// Human-readable justifications, most important first.
    pub reasons: Vec<String>,

    /// Not known when the tick bailed out before the strategy selection.
    pub strategy: Option<Strategy>,

    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(action: Action, timestamp: DateTime<Utc>) -> Self {
        Self { action, reasons: Vec::new(), strategy: None, timestamp }
    }

    pub fn idle(timestamp: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self::new(Action::Idle, timestamp).because(reason)
    }

    /// The error message becomes the only reason.
    pub fn error(timestamp: DateTime<Utc>, error: &(impl Display + ?Sized)) -> Self {
        Self::new(Action::Error, timestamp).because(format!("{error:#}"))
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action)?;
        if !self.reasons.is_empty() {
            write!(f, ": {}", self.reasons.join("; "))?;
        }
        Ok(())
    }
}
