use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{
    core::{
        analyzer::PriceThresholds,
        decision::{Action, Decision},
        snapshot::SystemSnapshot,
    },
    prelude::*,
    quantity::{power::Watts, price::Cost},
};

/// Realized result of a tick, fed back into the learner.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Outcome {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub pv_power: Watts,
    pub load: Watts,
    pub grid_power: Watts,
    pub thresholds: PriceThresholds,

    /// Hourly cost of the current grid import at the current price.
    pub cost: Cost,
}

impl Outcome {
    pub fn new(
        decision: &Decision,
        snapshot: &SystemSnapshot,
        thresholds: PriceThresholds,
    ) -> Self {
        Self {
            timestamp: decision.timestamp,
            action: decision.action,
            pv_power: snapshot.pv_power,
            load: snapshot.load,
            grid_power: snapshot.grid_power,
            thresholds,
            cost: Cost::of_import(snapshot.grid_power, thresholds.current),
        }
    }
}

#[async_trait]
pub trait OutcomeLearner: Send + Sync {
    async fn observe(&self, outcome: &Outcome) -> Result;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopLearner;

#[async_trait]
impl OutcomeLearner for NoopLearner {
    async fn observe(&self, _outcome: &Outcome) -> Result {
        Ok(())
    }
}

/// Learned parameters shared between the learner and the predictor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Weights {
    /// Shift of the charging price level, as a fraction of the threshold spread.
    pub charge_margin: f64,

    pub n_observations: u32,
}

impl Weights {
    pub const MAX_CHARGE_MARGIN: f64 = 0.1;

    /// Grows linearly until the warm-up number of observations is reached.
    #[must_use]
    pub fn confidence(&self, warmup: u32) -> f64 {
        if warmup == 0 {
            1.0
        } else {
            (f64::from(self.n_observations) / f64::from(warmup)).min(1.0)
        }
    }
}

pub type SharedWeights = Arc<RwLock<Weights>>;

/// Nudges the charge margin based on the realized grid import.
///
/// Buying above the charge threshold while charging makes the margin tighter.
/// Importing at a cheap price without charging makes it looser.
#[must_use]
#[derive(Clone, Debug, bon::Builder)]
pub struct AdaptiveLearner {
    weights: SharedWeights,

    #[builder(default = 0.01)]
    learning_rate: f64,
}

#[async_trait]
impl OutcomeLearner for AdaptiveLearner {
    #[instrument(skip_all, fields(action = ?outcome.action))]
    async fn observe(&self, outcome: &Outcome) -> Result {
        ensure!(self.learning_rate.is_finite(), "learning rate must be finite");

        let mut weights = self.weights.write().await;
        weights.n_observations = weights.n_observations.saturating_add(1);
        if outcome.cost > Cost::ZERO {
            let is_cheap = outcome.thresholds.current <= outcome.thresholds.charge;
            match (outcome.action, is_cheap) {
                (Action::ChargeGrid, false) => weights.charge_margin -= self.learning_rate,
                (Action::ChargeGrid, true) | (_, false) => {}
                (_, true) => weights.charge_margin += self.learning_rate / 2.0,
            }
            weights.charge_margin = weights
                .charge_margin
                .clamp(-Weights::MAX_CHARGE_MARGIN, Weights::MAX_CHARGE_MARGIN);
        }
        trace!(
            charge_margin = weights.charge_margin,
            n_observations = weights.n_observations,
            "observed",
        );
        Ok(())
    }
}
