use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::{core::decision::Action, quantity::energy::KilowattHours};

#[derive(
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::FromStr,
)]
#[serde(transparent)]
pub struct InverterId(String);

impl From<&str> for InverterId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, derive_more::Display)]
pub enum ChargerSourcePriority {
    #[display("Solar first")]
    #[serde(rename = "Solar first")]
    SolarFirst,

    #[display("Solar and utility simultaneously")]
    #[serde(rename = "Solar and utility simultaneously")]
    SolarAndUtility,

    #[display("Solar only")]
    #[serde(rename = "Solar only")]
    SolarOnly,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, derive_more::Display)]
pub enum OutputSourcePriority {
    #[display("Utility first")]
    #[serde(rename = "Utility first")]
    UtilityFirst,

    #[display("Solar first")]
    #[serde(rename = "Solar first")]
    SolarFirst,

    /// Solar, then battery, then utility.
    #[display("Solar/Battery/Utility")]
    #[serde(rename = "Solar/Battery/Utility")]
    SolarBatteryUtility,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, derive_more::Display)]
pub enum EnergyPattern {
    #[display("Battery first")]
    #[serde(rename = "Battery first")]
    BatteryFirst,

    #[display("Load first")]
    #[serde(rename = "Load first")]
    LoadFirst,
}

/// Command dialect of an inverter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InverterProfile {
    /// Accepts the charger and output source priorities.
    PriorityList,

    /// Accepts the grid charge flag and the energy pattern.
    Legacy,
}

impl InverterProfile {
    /// Canonical command value, `None` for the actions which command nothing.
    #[must_use]
    pub const fn command_value(self, action: Action) -> Option<CommandValue> {
        match self {
            Self::PriorityList => Self::priority_list(action),
            Self::Legacy => Self::legacy(action),
        }
    }

    const fn priority_list(action: Action) -> Option<CommandValue> {
        let (charger, output) = match action {
            Action::ChargeGrid => {
                (ChargerSourcePriority::SolarAndUtility, OutputSourcePriority::UtilityFirst)
            }
            Action::ChargeSolar => {
                (ChargerSourcePriority::SolarFirst, OutputSourcePriority::SolarFirst)
            }
            Action::StopCharging => {
                (ChargerSourcePriority::SolarOnly, OutputSourcePriority::SolarFirst)
            }
            Action::Discharge => {
                (ChargerSourcePriority::SolarOnly, OutputSourcePriority::SolarBatteryUtility)
            }
            Action::ExportSolar | Action::Monitor | Action::Idle | Action::Error => return None,
        };
        Some(CommandValue::PriorityList { charger, output })
    }

    const fn legacy(action: Action) -> Option<CommandValue> {
        let (grid_charge, energy_pattern) = match action {
            Action::ChargeGrid => (true, EnergyPattern::BatteryFirst),
            Action::ChargeSolar => (false, EnergyPattern::BatteryFirst),
            Action::StopCharging | Action::Discharge => (false, EnergyPattern::LoadFirst),
            Action::ExportSolar | Action::Monitor | Action::Idle | Action::Error => return None,
        };
        Some(CommandValue::Legacy { grid_charge, energy_pattern })
    }
}

/// Settings value for one inverter, compared as a whole for the de-duplication.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandValue {
    PriorityList { charger: ChargerSourcePriority, output: OutputSourcePriority },
    Legacy { grid_charge: bool, energy_pattern: EnergyPattern },
}

impl CommandValue {
    /// Setting names along with their payloads, in the publishing order.
    #[must_use]
    pub fn settings(self) -> [(&'static str, String); 2] {
        match self {
            Self::PriorityList { charger, output } => [
                ("charger_source_priority", charger.to_string()),
                ("output_source_priority", output.to_string()),
            ],
            Self::Legacy { grid_charge, energy_pattern } => [
                ("grid_charge", if grid_charge { "Enabled" } else { "Disabled" }.to_owned()),
                ("energy_pattern", energy_pattern.to_string()),
            ],
        }
    }
}

impl Display for CommandValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriorityList { charger, output } => write!(f, "{charger} → {output}"),
            Self::Legacy { grid_charge, energy_pattern } => {
                let grid_charge = if *grid_charge { "on" } else { "off" };
                write!(f, "grid charge {grid_charge} → {energy_pattern}")
            }
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InverterConfig {
    #[serde(rename = "type")]
    pub profile: InverterProfile,

    /// Static battery capacity behind the inverter.
    #[serde(default, rename = "capacity_kwh")]
    pub capacity: Option<KilowattHours>,
}

/// All inverters the engine commands, in a stable order.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
#[serde(transparent)]
pub struct Topology(BTreeMap<InverterId, InverterConfig>);

impl FromIterator<(InverterId, InverterConfig)> for Topology {
    fn from_iter<T: IntoIterator<Item = (InverterId, InverterConfig)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Topology {
    pub fn iter(&self) -> impl Iterator<Item = (&InverterId, &InverterConfig)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of the known static capacities, `None` when nothing is known.
    #[must_use]
    pub fn total_capacity(&self) -> Option<KilowattHours> {
        self.0
            .values()
            .filter_map(|inverter| inverter.capacity)
            .reduce(|sum, capacity| sum + capacity)
    }
}
