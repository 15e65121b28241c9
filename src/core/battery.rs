use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
    core::{snapshot::SystemSnapshot, strategy::Strategy},
    prelude::*,
    quantity::{electric::Volts, energy::KilowattHours, power::Watts},
};

/// Where the battery capacity came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    #[serde(rename = "manual")]
    Manual,

    /// Reported by the battery itself through the telemetry.
    #[serde(rename = "mqtt_battery_data")]
    BatteryTelemetry,

    /// Static capacities from the inverter configuration.
    #[serde(rename = "inverter_specs")]
    InverterSpecs,

    /// Rough guess from the PV array size.
    #[serde(rename = "pv_estimate")]
    PvEstimate,
}

impl DetectionMethod {
    #[must_use]
    pub const fn confidence(self) -> f64 {
        match self {
            Self::Manual => 1.0,
            Self::BatteryTelemetry => 0.98,
            Self::InverterSpecs => 0.95,
            Self::PvEstimate => 0.30,
        }
    }
}

impl Display for DetectionMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::BatteryTelemetry => write!(f, "battery telemetry"),
            Self::InverterSpecs => write!(f, "inverter specs"),
            Self::PvEstimate => write!(f, "PV estimate"),
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatteryProfile {
    pub capacity: KilowattHours,
    pub method: DetectionMethod,
    pub confidence: f64,
}

impl BatteryProfile {
    const fn new(capacity: KilowattHours, method: DetectionMethod) -> Self {
        Self { capacity, method, confidence: method.confidence() }
    }

    pub fn strategy(&self) -> Strategy {
        Strategy::select(self.capacity)
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, Default, bon::Builder)]
pub struct Detector {
    /// Explicitly configured capacity, always wins.
    manual_capacity: Option<KilowattHours>,
}

impl Detector {
    /// PV kilowatts to battery kilowatt-hours.
    const PV_ESTIMATE_RATIO: f64 = 1.5;

    /// Resolve the battery profile for this tick.
    ///
    /// The sources are tried in the order of decreasing confidence. When none of them
    /// works out, the previous profile is kept.
    #[instrument(skip_all)]
    pub fn detect(
        &self,
        snapshot: &SystemSnapshot,
        inverter_capacity: Option<KilowattHours>,
        previous: Option<BatteryProfile>,
    ) -> Option<BatteryProfile> {
        if let Some(capacity) = self.manual_capacity {
            return Some(BatteryProfile::new(capacity, DetectionMethod::Manual));
        }
        let detected = Self::from_telemetry(snapshot)
            .map(|capacity| BatteryProfile::new(capacity, DetectionMethod::BatteryTelemetry))
            .or_else(|| {
                inverter_capacity
                    .filter(|capacity| *capacity > KilowattHours::ZERO)
                    .map(|capacity| BatteryProfile::new(capacity, DetectionMethod::InverterSpecs))
            })
            .or_else(|| {
                Self::from_pv_power(snapshot.pv_power)
                    .map(|capacity| BatteryProfile::new(capacity, DetectionMethod::PvEstimate))
            });
        match detected {
            Some(profile) => {
                debug!(capacity = %profile.capacity, method = %profile.method, "detected the battery");
                Some(profile)
            }
            None => {
                debug!("no battery capacity source, keeping the previous profile");
                previous
            }
        }
    }

    fn from_telemetry(snapshot: &SystemSnapshot) -> Option<KilowattHours> {
        (snapshot.battery_voltage > Volts::ZERO)
            .then(|| snapshot.battery_capacity_ah * snapshot.battery_voltage)
            .filter(|capacity| *capacity > KilowattHours::ZERO)
    }

    fn from_pv_power(pv_power: Watts) -> Option<KilowattHours> {
        Some(KilowattHours((pv_power.to_kilowatts() * Self::PV_ESTIMATE_RATIO).round()))
            .filter(|capacity| *capacity > KilowattHours::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::quantity::electric::AmpereHours;

    fn telemetry() -> SystemSnapshot {
        SystemSnapshot {
            battery_voltage: Volts(51.2),
            battery_capacity_ah: AmpereHours(200.0),
            pv_power: Watts(4000.0),
            ..SystemSnapshot::default()
        }
    }

    #[test]
    fn test_manual_wins() {
        let detector = Detector::builder().manual_capacity(KilowattHours(25.0)).build();
        let profile = detector.detect(&telemetry(), Some(KilowattHours(5.0)), None).unwrap();
        assert_eq!(profile.method, DetectionMethod::Manual);
        assert_eq!(profile.capacity, KilowattHours(25.0));
        assert_abs_diff_eq!(profile.confidence, 1.0);
        assert_eq!(profile.strategy(), Strategy::SelfConsumption);
    }

    #[test]
    fn test_battery_telemetry_first() {
        let profile =
            Detector::default().detect(&telemetry(), Some(KilowattHours(5.0)), None).unwrap();
        assert_eq!(profile.method, DetectionMethod::BatteryTelemetry);
        assert_abs_diff_eq!(profile.capacity.0, 10.24, epsilon = 1e-9);
        assert_abs_diff_eq!(profile.confidence, 0.98);
    }

    #[test]
    fn test_inverter_specs_second() {
        let snapshot = SystemSnapshot { battery_voltage: Volts::ZERO, ..telemetry() };
        let profile =
            Detector::default().detect(&snapshot, Some(KilowattHours(16.0)), None).unwrap();
        assert_eq!(profile.method, DetectionMethod::InverterSpecs);
        assert_abs_diff_eq!(profile.confidence, 0.95);
        assert_eq!(profile.strategy(), Strategy::Hybrid);
    }

    #[test]
    fn test_pv_estimate_last() {
        let snapshot = SystemSnapshot { pv_power: Watts(4300.0), ..SystemSnapshot::default() };
        let profile = Detector::default().detect(&snapshot, None, None).unwrap();
        assert_eq!(profile.method, DetectionMethod::PvEstimate);
        assert_eq!(profile.capacity, KilowattHours(6.0));
        assert_abs_diff_eq!(profile.confidence, 0.30);
    }

    #[test]
    fn test_keeps_previous_profile() {
        let previous = BatteryProfile::new(KilowattHours(12.0), DetectionMethod::InverterSpecs);
        let profile =
            Detector::default().detect(&SystemSnapshot::default(), None, Some(previous));
        assert_eq!(profile, Some(previous));
    }

    #[test]
    fn test_nothing_known() {
        assert!(Detector::default().detect(&SystemSnapshot::default(), None, None).is_none());
    }
}
