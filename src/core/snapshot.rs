use serde::{Deserialize, Serialize};

use crate::quantity::{
    electric::{AmpereHours, Volts},
    percent::Percent,
    power::Watts,
};

/// Live system state taken once at the start of a tick.
///
/// Absent readings are zeros, and the evaluator treats a zero as «no signal».
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    pub battery_soc: Percent,
    pub pv_power: Watts,
    pub load: Watts,

    /// Import is positive, export is negative.
    pub grid_power: Watts,

    pub grid_voltage: Volts,
    pub battery_voltage: Volts,
    pub battery_capacity_ah: AmpereHours,
}

impl SystemSnapshot {
    /// PV power left after covering the household load.
    pub fn pv_surplus(&self) -> Watts {
        self.pv_power - self.load
    }

    /// Household load not covered by the PV.
    pub fn net_load(&self) -> Watts {
        self.load - self.pv_power
    }
}
