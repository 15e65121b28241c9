//! Failure taxonomy of a single tick.
//!
//! None of these is fatal: every variant maps onto a well-defined tick outcome.

use crate::quantity::{electric::Volts, percent::Percent};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Forecast or telemetry is missing or insufficient, the tick ends up idle.
    #[error("{0}")]
    DataUnavailable(String),

    /// A command could not be delivered, logged per command.
    #[error("failed to publish `{topic}`")]
    Transport {
        topic: String,

        #[source]
        source: anyhow::Error,
    },

    /// The predictor failed or timed out, the evaluator falls back to the rules.
    #[error("predictor failed")]
    Predictor(#[source] anyhow::Error),

    /// Anything unexpected while evaluating, surfaced as an error decision.
    #[error("evaluation failed: {0:#}")]
    Evaluation(#[source] anyhow::Error),
}

impl EngineError {
    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        Self::DataUnavailable(reason.into())
    }
}

/// Safety bound tripped, always surfaced as «stop charging».
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SafetyViolation {
    #[error("battery state of charge {soc} reached the target {target}")]
    TargetReached { soc: Percent, target: Percent },

    #[error("grid voltage {voltage} is outside {min}…{max}")]
    GridVoltage { voltage: Volts, min: Volts, max: Volts },
}
