use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{mpsc, watch},
    time::{MissedTickBehavior, interval},
};

use crate::{
    dispatch::inverter::Topology,
    engine::{Engine, state::Status},
    prelude::*,
};

#[derive(Debug)]
pub enum Control {
    Start,
    Stop,
    EvaluateNow,
    UpdateTopology(Topology),
    Shutdown,
}

/// Owns the engine and drives it by the timer and the control messages, one at a time.
#[must_use]
pub struct Controller {
    engine: Engine,
    period: Duration,
    control: mpsc::Receiver<Control>,
    status: watch::Sender<Status>,
    is_evaluating: Arc<AtomicBool>,
}

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(300);

#[bon::bon]
impl Controller {
    #[builder]
    pub fn new(
        engine: Engine,
        #[builder(default = DEFAULT_PERIOD)] period: Duration,
    ) -> (Self, Handle) {
        let (control_sender, control) = mpsc::channel(16);
        let (status, status_receiver) = watch::channel(engine.status());
        let is_evaluating = Arc::new(AtomicBool::new(false));
        let handle = Handle {
            control: control_sender,
            status: status_receiver,
            is_evaluating: Arc::clone(&is_evaluating),
        };
        (Self { engine, period, control, status, is_evaluating }, handle)
    }
}

impl Controller {
    /// Run until shut down or until every handle is dropped.
    #[instrument(skip_all, fields(period = ?self.period))]
    pub async fn run(mut self) {
        let mut interval = interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick(), if self.engine.is_enabled() => {
                    self.evaluate().await;
                }
                control = self.control.recv() => match control {
                    Some(Control::Start) => {
                        self.engine.start();
                        interval.reset_immediately();
                    }
                    Some(Control::Stop) => {
                        self.engine.stop().await;
                    }
                    Some(Control::EvaluateNow) => {
                        self.evaluate().await;
                    }
                    Some(Control::UpdateTopology(topology)) => {
                        self.engine.update_topology(topology);
                    }
                    Some(Control::Shutdown) | None => {
                        self.engine.graceful_shutdown();
                        self.publish();
                        break;
                    }
                },
            }
            self.publish();
        }

        info!("the controller has stopped");
    }

    async fn evaluate(&mut self) {
        self.is_evaluating.store(true, Ordering::Release);
        self.engine.tick(Utc::now()).await;
        self.is_evaluating.store(false, Ordering::Release);
    }

    fn publish(&self) {
        self.status.send_replace(self.engine.status());
    }
}

/// Cloneable remote control of a running controller.
#[derive(Clone)]
pub struct Handle {
    control: mpsc::Sender<Control>,
    status: watch::Receiver<Status>,
    is_evaluating: Arc<AtomicBool>,
}

impl Handle {
    pub async fn start(&self) -> Result {
        self.send(Control::Start).await
    }

    pub async fn stop(&self) -> Result {
        self.send(Control::Stop).await
    }

    /// Request an out-of-schedule evaluation, skipped when one is already running.
    pub async fn evaluate_now(&self) -> Result<bool> {
        if self.is_evaluating.load(Ordering::Acquire) {
            debug!("evaluation is in progress, skipping");
            return Ok(false);
        }
        self.send(Control::EvaluateNow).await?;
        Ok(true)
    }

    pub async fn update_topology(&self, topology: Topology) -> Result {
        self.send(Control::UpdateTopology(topology)).await
    }

    pub async fn shutdown(&self) -> Result {
        self.send(Control::Shutdown).await
    }

    /// Latest published status.
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Wait until the status satisfies the predicate.
    #[cfg(test)]
    pub async fn wait_for(&self, predicate: impl FnMut(&Status) -> bool) -> Result<Status> {
        let mut receiver = self.status.clone();
        let status = receiver.wait_for(predicate).await.context("the controller has stopped")?;
        Ok(status.clone())
    }

    async fn send(&self, control: Control) -> Result {
        self.control.send(control).await.context("the controller has stopped")
    }
}
