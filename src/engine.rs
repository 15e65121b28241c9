//! Explicit engine context and the tick procedure.

pub mod config;
pub mod controller;
pub mod state;
#[cfg(test)]
pub mod testing;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::{
    api::{
        audit::AuditSink,
        heartbeat::Heartbeat,
        provider::PriceProvider,
        telemetry::TelemetrySource,
        transport::CommandTransport,
    },
    core::{
        analyzer::Analyzer,
        battery::Detector,
        decision::{Action, Decision},
        evaluator::{Evaluator, Inputs, Limits},
        learner::{Outcome, OutcomeLearner},
        strategy::Strategy,
    },
    dispatch::{
        dispatcher::{Command, Dispatcher},
        inverter::Topology,
    },
    engine::state::{EngineState, Status},
    prelude::*,
};

#[must_use]
#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct Timeouts {
    /// Bounds the forecast and the telemetry fetch.
    #[builder(default = Duration::from_secs(30))]
    pub fetch: Duration,

    #[builder(default = Duration::from_secs(5))]
    pub learner: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Result of a single tick.
#[must_use]
#[derive(Clone, Debug)]
pub struct Tick {
    pub decision: Decision,

    /// Commands published during the tick, empty when nothing has changed.
    pub commands: Vec<Command>,
}

/// Everything the decision loop needs, owned in one place.
#[must_use]
#[derive(bon::Builder)]
pub struct Engine {
    provider: Box<dyn PriceProvider>,
    telemetry: Box<dyn TelemetrySource>,
    transport: Box<dyn CommandTransport>,
    audit: Box<dyn AuditSink>,
    learner: Box<dyn OutcomeLearner>,

    #[builder(default)]
    evaluator: Evaluator,

    #[builder(default)]
    analyzer: Analyzer,

    #[builder(default)]
    detector: Detector,

    #[builder(default)]
    limits: Limits,

    #[builder(default)]
    timeouts: Timeouts,

    #[builder(default)]
    topology: Topology,

    #[builder(default)]
    dispatcher: Dispatcher,

    #[builder(default)]
    heartbeat: Heartbeat,

    #[builder(skip)]
    state: EngineState,
}

impl Engine {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn start(&mut self) {
        info!(n_inverters = self.topology.len(), "starting…");
        self.state.enabled = true;
        self.state.is_safe_state_sent = false;
    }

    /// Disable the engine and put every inverter into the safe state once.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) -> Vec<Command> {
        self.state.enabled = false;
        if self.state.is_safe_state_sent {
            debug!("the safe state has already been sent");
            return Vec::new();
        }
        let commands = self.dispatcher.force_safe_state(&self.topology, &*self.transport).await;
        self.state.is_safe_state_sent = true;
        self.record_commands(&commands).await;
        info!(n_commands = commands.len(), "stopped");
        commands
    }

    /// Disable the engine, leaving the inverters as they are.
    pub fn graceful_shutdown(&mut self) {
        if self.state.enabled {
            info!("shutting down…");
        }
        self.state.enabled = false;
    }

    /// Takes effect on the next tick.
    pub fn update_topology(&mut self, topology: Topology) {
        info!(n_inverters = topology.len(), "updating the topology");
        self.dispatcher.retain(&topology);
        self.topology = topology;
    }

    pub fn status(&self) -> Status {
        Status {
            enabled: self.state.enabled,
            last_decision: self.state.last_decision.clone(),
            battery_profile: self.state.battery_profile,
            last_commands: self.dispatcher.last_values().clone(),
            last_tick_at: self.state.last_tick_at,
            n_ticks: self.state.n_ticks,
        }
    }

    /// Evaluate once: fetch, decide, dispatch, then run the post-tick hooks.
    ///
    /// Never fails: every failure ends up in the decision.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if !self.state.enabled {
            return Tick { decision: Decision::idle(now, "disabled"), commands: Vec::new() };
        }

        let (decision, commands, outcome) = match self.prepare(now).await {
            Ok(inputs) => {
                let decision = self.evaluator.evaluate(&inputs).await;
                let commands = if decision.action == Action::Error {
                    Vec::new()
                } else {
                    self.dispatcher.dispatch(decision.action, &self.topology, &*self.transport).await
                };
                let outcome = Outcome::new(&decision, &inputs.snapshot, inputs.thresholds);
                (decision, commands, Some(outcome))
            }
            Err(decision) => (decision, Vec::new(), None),
        };
        debug!(action = ?decision.action, n_commands = commands.len(), "ticked");

        self.record_decision(&decision).await;
        self.record_commands(&commands).await;
        if let Some(outcome) = outcome {
            self.observe(&outcome).await;
        }
        self.heartbeat.send().await;

        self.state.last_decision = Some(decision.clone());
        self.state.last_tick_at = Some(now);
        self.state.n_ticks += 1;
        Tick { decision, commands }
    }

    /// Gather the inputs, or bail out with an idle decision.
    async fn prepare(&mut self, now: DateTime<Utc>) -> Result<Inputs, Decision> {
        let (forecast, snapshot) = tokio::join!(
            with_timeout(self.timeouts.fetch, self.provider.get_forecast(now)),
            with_timeout(self.timeouts.fetch, self.telemetry.snapshot()),
        );
        let forecast = forecast.map_err(|error| {
            warn!("failed to fetch the forecast: {error:#}");
            Decision::idle(now, "no pricing data")
        })?;
        let snapshot = snapshot.map_err(|error| {
            warn!("failed to read the telemetry: {error:#}");
            Decision::idle(now, "no telemetry data")
        })?;

        self.state.battery_profile = self.detector.detect(
            &snapshot,
            self.topology.total_capacity(),
            self.state.battery_profile,
        );
        let thresholds = self.analyzer.analyze(&forecast, now).map_err(|error| {
            warn!("{error}");
            Decision::idle(now, error.to_string())
        })?;
        let strategy =
            self.state.battery_profile.map_or(Strategy::Hybrid, |profile| profile.strategy());
        debug!(?strategy, ?thresholds, "prepared");
        Ok(Inputs { now, snapshot, thresholds, strategy, limits: self.limits })
    }

    async fn record_decision(&self, decision: &Decision) {
        if let Err(error) = self.audit.record_decision(decision).await {
            warn!("failed to record the decision: {error:#}");
        }
    }

    async fn record_commands(&self, commands: &[Command]) {
        for command in commands {
            if let Err(error) = self.audit.record_command(command).await {
                warn!(topic = %command.topic, "failed to record the command: {error:#}");
            }
        }
    }

    async fn observe(&self, outcome: &Outcome) {
        if let Err(error) = with_timeout(self.timeouts.learner, self.learner.observe(outcome)).await
        {
            warn!("learner failed: {error:#}");
        }
    }
}

async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    timeout(duration, future).await.with_context(|| format!("timed out after {duration:?}"))?
}
