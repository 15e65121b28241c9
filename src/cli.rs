mod analyze;
mod connection;
mod evaluate;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    cli::{analyze::AnalyzeArgs, evaluate::EvaluateArgs, run::RunArgs},
    engine::config::Config,
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// Engine configuration file, the defaults are used when it does not exist.
    #[clap(long, env = "LYNX_CONFIG", default_value = "lynx.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: run the decision loop until interrupted.
    #[clap(name = "run")]
    Run(Box<RunArgs>),

    /// Evaluate once, apply the decision, and print it.
    #[clap(name = "evaluate")]
    Evaluate(Box<EvaluateArgs>),

    /// Fetch the price forecast and print the thresholds.
    #[clap(name = "analyze")]
    Analyze(Box<AnalyzeArgs>),
}

impl Args {
    pub async fn run(self) -> Result {
        let config = Config::load(&self.config)?;
        match self.command {
            Command::Run(args) => args.run(&self.config, config).await,
            Command::Evaluate(args) => args.run(&config).await,
            Command::Analyze(args) => args.run(&config).await,
        }
    }
}
