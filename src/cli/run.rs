use std::path::Path;

use clap::Parser;
#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

use crate::{
    cli::connection::EngineArgs,
    engine::{
        config::Config,
        controller::{Controller, Handle},
    },
    prelude::*,
};

#[derive(Parser)]
pub struct RunArgs {
    /// Overrides the configured tick interval. For example: `5min`.
    #[clap(long, env = "TICK_INTERVAL")]
    interval: Option<humantime::Duration>,

    /// Put every inverter into the safe state on exit, instead of leaving them as they are.
    #[clap(long, env = "SAFE_STATE_ON_EXIT")]
    safe_state_on_exit: bool,

    #[clap(flatten)]
    engine: EngineArgs,
}

impl RunArgs {
    /// Run until Ctrl+C or SIGTERM. SIGHUP re-reads the inverters from the configuration file.
    #[instrument(skip_all)]
    pub async fn run(self, config_path: &Path, config: Config) -> Result {
        let period = self.interval.map_or(config.tick_interval, Into::into);
        ensure!(!period.is_zero(), "tick interval must be positive");
        let engine = self.engine.try_new_engine(&config)?;

        let (controller, handle) = Controller::builder().engine(engine).period(period).build();
        let controller = tokio::spawn(controller.run());
        handle.start().await?;
        info!(?period, "running…");

        let mut hangup = Hangup::try_new()?;
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    break;
                }
                () = hangup.recv() => {
                    if let Err(error) = reload(config_path, &handle).await {
                        error!("failed to reload the inverters: {error:#}");
                    }
                }
            }
        }

        if self.safe_state_on_exit {
            handle.stop().await?;
        }
        handle.shutdown().await?;
        controller.await.context("the controller has crashed")?;

        let status = handle.status();
        info!(n_ticks = status.n_ticks, "stopped");
        Ok(())
    }
}

/// Apply the inverters from the configuration file and evaluate right away.
#[instrument(skip_all, fields(path = %config_path.display()))]
async fn reload(config_path: &Path, handle: &Handle) -> Result {
    info!("reloading…");
    let config = Config::load(config_path)?;
    handle.update_topology(config.inverters).await?;
    if !handle.evaluate_now().await? {
        info!("the new inverters will be used on the next tick");
    }
    Ok(())
}

/// Resolves on Ctrl+C and, on Unix, on SIGTERM.
async fn shutdown_signal() -> Result {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("interrupted");
        }
        result = terminate() => {
            result?;
            info!("terminated");
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn terminate() -> Result {
    signal(SignalKind::terminate())
        .context("failed to install the SIGTERM handler")?
        .recv()
        .await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> Result {
    std::future::pending().await
}

/// SIGHUP listener.
#[cfg(unix)]
struct Hangup(Signal);

#[cfg(unix)]
impl Hangup {
    fn try_new() -> Result<Self> {
        Ok(Self(signal(SignalKind::hangup()).context("failed to install the SIGHUP handler")?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Never fires.
#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    const fn try_new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
