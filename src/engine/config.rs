use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::{
    api::home_assistant::Entities,
    core::{
        analyzer::Analyzer,
        battery::Detector,
        evaluator::{Evaluator, Limits},
        learner::{AdaptiveLearner, NoopLearner, OutcomeLearner, SharedWeights},
        predictor::{AdaptivePredictor, Predictive},
    },
    dispatch::{dispatcher::Dispatcher, inverter::Topology},
    engine::Timeouts,
    prelude::*,
    quantity::{electric::Volts, energy::KilowattHours, percent::Percent},
};

/// Engine configuration, read from a TOML file.
#[must_use]
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub target_soc: Percent,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "tick_interval_seconds")]
    pub tick_interval: Duration,

    /// Bounds both the forecast and the telemetry fetch.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "forecast_timeout_seconds")]
    pub forecast_timeout: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "predictor_timeout_seconds")]
    pub predictor_timeout: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "learner_timeout_seconds")]
    pub learner_timeout: Duration,

    pub min_forecast_points: usize,
    pub charge_percentile: f64,
    pub discharge_percentile: f64,
    pub min_grid_voltage: Volts,
    pub max_grid_voltage: Volts,

    #[serde(rename = "manual_capacity_kwh")]
    pub manual_capacity: Option<KilowattHours>,

    pub topic_prefix: String,

    /// JSON-lines audit journal, none by default.
    pub journal: Option<PathBuf>,

    pub learning: LearningConfig,

    /// Home Assistant entities to read the telemetry from.
    pub telemetry: Entities,

    pub inverters: Topology,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_soc: Percent(95.0),
            tick_interval: Duration::from_secs(300),
            forecast_timeout: Duration::from_secs(30),
            predictor_timeout: Duration::from_secs(5),
            learner_timeout: Duration::from_secs(5),
            min_forecast_points: 12,
            charge_percentile: 0.30,
            discharge_percentile: 0.80,
            min_grid_voltage: Volts(200.0),
            max_grid_voltage: Volts(250.0),
            manual_capacity: None,
            topic_prefix: Dispatcher::DEFAULT_TOPIC_PREFIX.to_owned(),
            journal: None,
            learning: LearningConfig::default(),
            telemetry: Entities::default(),
            inverters: Topology::default(),
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearningConfig {
    /// Consult the adaptive predictor before the rules.
    pub enabled: bool,

    /// Predictions below this confidence are ignored.
    pub min_confidence: f64,

    pub learning_rate: f64,

    /// Number of observations for the full confidence.
    pub warmup: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self { enabled: false, min_confidence: 0.6, learning_rate: 0.01, warmup: 288 }
    }
}

impl Config {
    /// Load the configuration file, falling back to the defaults when it does not exist.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("configuration file does not exist, using the defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let config =
            Self::from_toml(&contents).with_context(|| format!("invalid `{}`", path.display()))?;
        info!(n_inverters = config.inverters.len(), "loaded");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result {
        ensure!(
            Percent::ZERO < self.target_soc && self.target_soc <= Percent(100.0),
            "target state of charge must be within (0, 100]",
        );
        ensure!(!self.tick_interval.is_zero(), "tick interval must be positive");
        ensure!(!self.forecast_timeout.is_zero(), "forecast timeout must be positive");
        ensure!(self.min_forecast_points >= 1, "at least one forecast point is required");
        ensure!(
            (0.0..1.0).contains(&self.charge_percentile)
                && (0.0..1.0).contains(&self.discharge_percentile),
            "percentiles must be within [0, 1)",
        );
        ensure!(
            self.charge_percentile <= self.discharge_percentile,
            "charge percentile must not exceed the discharge percentile",
        );
        ensure!(
            self.min_grid_voltage < self.max_grid_voltage,
            "minimal grid voltage must be below the maximal one",
        );
        if let Some(capacity) = self.manual_capacity {
            ensure!(capacity > KilowattHours::ZERO, "manual capacity must be positive");
        }
        ensure!(!self.topic_prefix.is_empty(), "topic prefix must not be empty");
        ensure!(
            (0.0..=1.0).contains(&self.learning.min_confidence),
            "minimal confidence must be within [0, 1]",
        );
        ensure!(
            self.learning.learning_rate.is_finite() && self.learning.learning_rate > 0.0,
            "learning rate must be positive",
        );
        Ok(())
    }

    pub fn analyzer(&self) -> Analyzer {
        Analyzer::builder()
            .min_points(self.min_forecast_points)
            .charge_percentile(self.charge_percentile)
            .discharge_percentile(self.discharge_percentile)
            .build()
    }

    pub fn detector(&self) -> Detector {
        Detector::builder().maybe_manual_capacity(self.manual_capacity).build()
    }

    pub fn limits(&self) -> Limits {
        Limits::builder()
            .target_soc(self.target_soc)
            .min_grid_voltage(self.min_grid_voltage)
            .max_grid_voltage(self.max_grid_voltage)
            .build()
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::builder().fetch(self.forecast_timeout).learner(self.learner_timeout).build()
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(&self.topic_prefix)
    }

    /// Build the evaluator along with the learner feeding it.
    ///
    /// Without learning, it is the rules and the no-op learner.
    pub fn evaluator(&self) -> (Evaluator, Box<dyn OutcomeLearner>) {
        if !self.learning.enabled {
            return (Evaluator::deterministic(), Box::new(NoopLearner));
        }
        let weights = SharedWeights::default();
        let predictor =
            AdaptivePredictor::builder().weights(weights.clone()).warmup(self.learning.warmup).build();
        let learner = AdaptiveLearner::builder()
            .weights(weights)
            .learning_rate(self.learning.learning_rate)
            .build();
        (
            Evaluator::with_fallback(
                Predictive::new(predictor, self.learning.min_confidence),
                self.predictor_timeout,
            ),
            Box::new(learner),
        )
    }
}
