use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    core::{battery::BatteryProfile, decision::Decision},
    dispatch::inverter::{CommandValue, InverterId},
};

/// Mutable state of the engine, owned by the engine alone.
#[derive(Clone, Debug, Default)]
pub struct EngineState {
    pub enabled: bool,
    pub last_decision: Option<Decision>,
    pub battery_profile: Option<BatteryProfile>,

    /// Reset on start, so that every stop sends the safe state exactly once.
    pub is_safe_state_sent: bool,

    pub last_tick_at: Option<DateTime<Utc>>,
    pub n_ticks: u64,
}

/// Consistent copy of the engine state for external readers.
#[must_use]
#[derive(Clone, Debug, Default, Serialize)]
pub struct Status {
    pub enabled: bool,
    pub last_decision: Option<Decision>,
    pub battery_profile: Option<BatteryProfile>,
    pub last_commands: BTreeMap<InverterId, CommandValue>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub n_ticks: u64,
}
