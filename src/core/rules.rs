use async_trait::async_trait;

use crate::{
    core::{
        decision::{Action, Decision},
        evaluator::{DecisionStrategy, Inputs},
    },
    error::SafetyViolation,
    prelude::*,
    quantity::{electric::Volts, percent::Percent, power::Watts},
};

/// Check the hard bounds which override everything else.
///
/// Zero grid voltage means the voltage is not reported, the check is skipped then.
pub fn check_safety(inputs: &Inputs) -> Option<SafetyViolation> {
    let soc = inputs.snapshot.battery_soc;
    let target = inputs.limits.target_soc;
    if soc >= target {
        return Some(SafetyViolation::TargetReached { soc, target });
    }
    let voltage = inputs.snapshot.grid_voltage;
    let (min, max) = (inputs.limits.min_grid_voltage, inputs.limits.max_grid_voltage);
    if voltage > Volts::ZERO && (voltage < min || voltage > max) {
        return Some(SafetyViolation::GridVoltage { voltage, min, max });
    }
    None
}

/// Deterministic rule chain: safety, then grid arbitrage, then the PV surplus.
#[must_use]
#[derive(Copy, Clone, Debug, Default)]
pub struct RuleBased;

impl RuleBased {
    const MIN_DISCHARGE_SOC: Percent = Percent(30.0);
    const MAX_SOLAR_CHARGE_SOC: Percent = Percent(95.0);
    const MIN_SOLAR_CHARGE_SURPLUS: Watts = Watts(1000.0);
    const MIN_ACTIVE_PV_POWER: Watts = Watts(100.0);

    pub fn evaluate(self, inputs: &Inputs) -> Decision {
        let decision = Self::safety_override(inputs)
            .or_else(|| Self::grid_opportunity(inputs))
            .unwrap_or_else(|| Self::self_consumption(inputs));
        decision.with_strategy(inputs.strategy)
    }

    pub fn safety_override(inputs: &Inputs) -> Option<Decision> {
        check_safety(inputs).map(|violation| {
            warn!("{violation}");
            Decision::new(Action::StopCharging, inputs.now).because(violation.to_string())
        })
    }

    fn grid_opportunity(inputs: &Inputs) -> Option<Decision> {
        let thresholds = &inputs.thresholds;
        let price = thresholds.current;

        if thresholds.is_negative() {
            return Some(
                Decision::new(Action::ChargeGrid, inputs.now)
                    .because(format!("negative price arbitrage: {price}")),
            );
        }
        if !inputs.strategy.uses_price_thresholds() {
            return None;
        }
        if price <= thresholds.charge {
            return Some(
                Decision::new(Action::ChargeGrid, inputs.now).because(format!(
                    "dynamic optimal price: {price} is at or below {}",
                    thresholds.charge,
                )),
            );
        }
        let net_load = inputs.snapshot.net_load();
        if price >= thresholds.discharge
            && net_load > Watts::ZERO
            && inputs.snapshot.battery_soc > Self::MIN_DISCHARGE_SOC
        {
            return Some(
                Decision::new(Action::Discharge, inputs.now).because(format!(
                    "peak arbitrage: {price} is at or above {}, covering {net_load}",
                    thresholds.discharge,
                )),
            );
        }
        None
    }

    fn self_consumption(inputs: &Inputs) -> Decision {
        let snapshot = &inputs.snapshot;
        let surplus = snapshot.pv_surplus();
        if surplus > Self::MIN_SOLAR_CHARGE_SURPLUS
            && snapshot.battery_soc < Self::MAX_SOLAR_CHARGE_SOC
        {
            Decision::new(Action::ChargeSolar, inputs.now)
                .because(format!("solar surplus: {surplus}"))
        } else if snapshot.battery_soc >= inputs.limits.target_soc && surplus > Watts::ZERO {
            Decision::new(Action::ExportSolar, inputs.now)
                .because(format!("battery is full, exporting {surplus}"))
        } else if snapshot.pv_power > Self::MIN_ACTIVE_PV_POWER {
            Decision::new(Action::Monitor, inputs.now)
                .because(format!("solar active: {}", snapshot.pv_power))
        } else {
            Decision::new(Action::Monitor, inputs.now).because("nothing actionable")
        }
    }
}

#[async_trait]
impl DecisionStrategy for RuleBased {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn decide(&self, inputs: &Inputs) -> Result<Decision> {
        Ok(self.evaluate(inputs))
    }
}
