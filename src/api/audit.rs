use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{core::decision::Decision, dispatch::dispatcher::Command, prelude::*};

/// Best-effort persistence of what the engine did, failures never abort a tick.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_decision(&self, decision: &Decision) -> Result;

    async fn record_command(&self, command: &Command) -> Result;
}

/// Writes the audit trail into the log.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingAudit;

#[async_trait]
impl AuditSink for TracingAudit {
    async fn record_decision(&self, decision: &Decision) -> Result {
        info!(action = ?decision.action, strategy = ?decision.strategy, "{decision}");
        Ok(())
    }

    async fn record_command(&self, command: &Command) -> Result {
        info!(
            inverter_id = %command.inverter_id,
            topic = %command.topic,
            value = %command.value,
            success = command.success,
            "command",
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Entry<'a> {
    Decision(&'a Decision),
    Command(&'a Command),
}

/// Appends JSON lines to a file.
#[must_use]
#[derive(Clone, Debug)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn append(&self, entry: &Entry<'_>) -> Result {
        let mut line = serde_json::to_vec(entry).context("failed to serialize the entry")?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("failed to write `{}`", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for Journal {
    async fn record_decision(&self, decision: &Decision) -> Result {
        self.append(&Entry::Decision(decision)).await
    }

    async fn record_command(&self, command: &Command) -> Result {
        self.append(&Entry::Command(command)).await
    }
}

/// Records into every sink, stopping at nothing.
#[must_use]
#[derive(Default)]
pub struct Fanout(Vec<Box<dyn AuditSink>>);

impl Fanout {
    pub fn with(mut self, sink: impl AuditSink + 'static) -> Self {
        self.0.push(Box::new(sink));
        self
    }
}

#[async_trait]
impl AuditSink for Fanout {
    async fn record_decision(&self, decision: &Decision) -> Result {
        let mut result = Ok(());
        for sink in &self.0 {
            if let Err(error) = sink.record_decision(decision).await {
                result = Err(error);
            }
        }
        result
    }

    async fn record_command(&self, command: &Command) -> Result {
        let mut result = Ok(());
        for sink in &self.0 {
            if let Err(error) = sink.record_command(command).await {
                result = Err(error);
            }
        }
        result
    }
}
