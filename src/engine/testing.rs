//! In-memory collaborators for the engine tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::{
    api::{
        audit::AuditSink,
        provider::PriceProvider,
        telemetry::TelemetrySource,
        transport::CommandTransport,
    },
    core::{
        decision::Decision,
        evaluator::tests::snapshot,
        forecast::{PriceForecast, PriceLevel, PricePoint, tests::DAY_PRICES},
        learner::{Outcome, OutcomeLearner},
        snapshot::SystemSnapshot,
    },
    dispatch::{
        dispatcher::Command,
        inverter::{InverterConfig, InverterId, InverterProfile, Topology},
    },
    engine::Engine,
    prelude::*,
    quantity::{energy::KilowattHours, price::CentsPerKilowattHour},
};

/// Serves hourly prices starting at the hour of the request, `None` fails the call.
#[derive(Clone)]
pub struct FakeProvider {
    prices: Option<Vec<f64>>,
    stall: bool,
}

impl FakeProvider {
    pub fn new(prices: &[f64]) -> Self {
        Self { prices: Some(prices.to_vec()), stall: false }
    }

    pub const fn failing() -> Self {
        Self { prices: None, stall: false }
    }

    /// Never answers.
    pub const fn stalling() -> Self {
        Self { prices: None, stall: true }
    }
}

#[async_trait]
impl PriceProvider for FakeProvider {
    async fn get_forecast(&self, now: DateTime<Utc>) -> Result<PriceForecast> {
        if self.stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let prices = self.prices.as_ref().context("provider is down")?;
        let starts_at = now.duration_trunc(TimeDelta::hours(1))?;
        let points = prices
            .iter()
            .zip(0..)
            .map(|(price, hour)| PricePoint {
                starts_at: starts_at + TimeDelta::hours(hour),
                price: CentsPerKilowattHour(*price),
                level: PriceLevel::Normal,
            })
            .collect::<Vec<_>>();
        PriceForecast::try_from(points)
    }
}

/// Serves a fixed snapshot, `None` fails the call.
#[derive(Clone)]
pub struct FakeTelemetry(pub Option<SystemSnapshot>);

#[async_trait]
impl TelemetrySource for FakeTelemetry {
    async fn snapshot(&self) -> Result<SystemSnapshot> {
        self.0.context("telemetry is down")
    }
}

/// Records every publish, and fails those whose topic starts with the prefix.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    published: Arc<Mutex<Vec<(String, String)>>>,
    failing_prefix: Option<String>,
}

impl RecordingTransport {
    pub fn failing_on(prefix: &str) -> Self {
        Self { failing_prefix: Some(prefix.to_owned()), ..Self::default() }
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandTransport for RecordingTransport {
    async fn publish(&self, topic: &str, value: &str) -> Result {
        self.published.lock().unwrap().push((topic.to_owned(), value.to_owned()));
        if let Some(prefix) = &self.failing_prefix
            && topic.starts_with(prefix)
        {
            bail!("broker refused `{topic}`");
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingAudit {
    pub decisions: Arc<Mutex<Vec<Decision>>>,
    pub commands: Arc<Mutex<Vec<Command>>>,
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record_decision(&self, decision: &Decision) -> Result {
        self.decisions.lock().unwrap().push(decision.clone());
        Ok(())
    }

    async fn record_command(&self, command: &Command) -> Result {
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingLearner(pub Arc<Mutex<Vec<Outcome>>>);

#[async_trait]
impl OutcomeLearner for RecordingLearner {
    async fn observe(&self, outcome: &Outcome) -> Result {
        self.0.lock().unwrap().push(*outcome);
        Ok(())
    }
}

/// One inverter of each profile, 10 kWh in total.
pub fn topology() -> Topology {
    [
        (
            InverterId::from("inverter_1"),
            InverterConfig {
                profile: InverterProfile::PriorityList,
                capacity: Some(KilowattHours(5.0)),
            },
        ),
        (
            InverterId::from("inverter_2"),
            InverterConfig { profile: InverterProfile::Legacy, capacity: Some(KilowattHours(5.0)) },
        ),
    ]
    .into_iter()
    .collect()
}

/// Wired engine along with the fakes to inspect it through.
pub struct Rig {
    pub engine: Engine,
    pub transport: RecordingTransport,
    pub audit: RecordingAudit,
    pub learner: RecordingLearner,
}

impl Rig {
    /// The day prices, with the battery at the given state of charge.
    pub fn with_soc(soc: f64) -> Self {
        Self::new(FakeProvider::new(&DAY_PRICES), FakeTelemetry(Some(snapshot(soc))))
    }

    pub fn new(provider: FakeProvider, telemetry: FakeTelemetry) -> Self {
        let transport = RecordingTransport::default();
        let audit = RecordingAudit::default();
        let learner = RecordingLearner::default();
        let engine = Engine::builder()
            .provider(Box::new(provider))
            .telemetry(Box::new(telemetry))
            .transport(Box::new(transport.clone()))
            .audit(Box::new(audit.clone()))
            .learner(Box::new(learner.clone()))
            .topology(topology())
            .build();
        Self { engine, transport, audit, learner }
    }
}
