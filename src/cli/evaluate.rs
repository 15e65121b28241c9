use chrono::Utc;
use clap::Parser;

use crate::{
    cli::connection::EngineArgs,
    engine::config::Config,
    prelude::*,
    tables::{build_commands_table, build_decision_table},
};

#[derive(Parser)]
pub struct EvaluateArgs {
    #[clap(flatten)]
    engine: EngineArgs,
}

impl EvaluateArgs {
    #[instrument(skip_all)]
    pub async fn run(self, config: &Config) -> Result {
        let mut engine = self.engine.try_new_engine(config)?;
        engine.start();
        let tick = engine.tick(Utc::now()).await;
        engine.graceful_shutdown();

        println!("{}", build_decision_table(&tick.decision));
        if !tick.commands.is_empty() {
            println!("{}", build_commands_table(&tick.commands));
        }
        if let Some(profile) = engine.status().battery_profile {
            info!(
                capacity = %profile.capacity,
                method = %profile.method,
                confidence = profile.confidence,
                "battery",
            );
        }
        Ok(())
    }
}
