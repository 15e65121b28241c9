use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::{
    core::{
        analyzer::PriceThresholds,
        decision::Decision,
        rules::RuleBased,
        snapshot::SystemSnapshot,
        strategy::Strategy,
    },
    error::EngineError,
    prelude::*,
    quantity::{electric::Volts, percent::Percent},
};

/// Everything a decision is derived from, captured at the start of a tick.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Inputs {
    pub now: DateTime<Utc>,
    pub snapshot: SystemSnapshot,
    pub thresholds: PriceThresholds,
    pub strategy: Strategy,
    pub limits: Limits,
}

/// Safety bounds of the evaluation.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bon::Builder)]
pub struct Limits {
    #[builder(default = Percent(95.0))]
    pub target_soc: Percent,

    #[builder(default = Volts(200.0))]
    pub min_grid_voltage: Volts,

    #[builder(default = Volts(250.0))]
    pub max_grid_voltage: Volts,
}

impl Default for Limits {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One way of turning the inputs into a decision.
#[async_trait]
pub trait DecisionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decide(&self, inputs: &Inputs) -> Result<Decision>;
}

/// Composes the primary strategy with a fallback.
///
/// A failing or a stalled primary strategy falls back, a failing fallback yields an error
/// decision. The evaluator itself never fails.
#[must_use]
pub struct Evaluator {
    primary: Box<dyn DecisionStrategy>,
    fallback: Option<Box<dyn DecisionStrategy>>,
    timeout: Duration,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::deterministic()
    }
}

impl Evaluator {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Rules only.
    pub fn deterministic() -> Self {
        Self::without_fallback(RuleBased, Self::DEFAULT_TIMEOUT)
    }

    /// Any failure of the strategy becomes an error decision.
    pub fn without_fallback(strategy: impl DecisionStrategy + 'static, timeout: Duration) -> Self {
        Self { primary: Box::new(strategy), fallback: None, timeout }
    }

    /// The primary strategy backed by the rules.
    pub fn with_fallback(primary: impl DecisionStrategy + 'static, timeout: Duration) -> Self {
        Self { primary: Box::new(primary), fallback: Some(Box::new(RuleBased)), timeout }
    }

    #[instrument(skip_all, fields(primary = self.primary.name()))]
    pub async fn evaluate(&self, inputs: &Inputs) -> Decision {
        let error = match timeout(self.timeout, self.primary.decide(inputs)).await {
            Ok(Ok(decision)) => return decision,
            Ok(Err(error)) => error,
            Err(_) => anyhow!("timed out after {:?}", self.timeout),
        };

        let Some(fallback) = &self.fallback else {
            error!("evaluation failed: {error:#}");
            return Decision::error(inputs.now, &EngineError::Evaluation(error));
        };
        warn!(fallback = fallback.name(), "primary strategy failed: {error:#}");
        match fallback.decide(inputs).await {
            Ok(decision) => decision,
            Err(error) => {
                error!("fallback strategy failed: {error:#}");
                Decision::error(inputs.now, &EngineError::Evaluation(error))
            }
        }
    }
}
