use chrono::Utc;
use clap::Parser;

use crate::{
    api::provider::PriceProvider,
    cli::connection::TibberArgs,
    engine::config::Config,
    prelude::*,
    tables::{build_forecast_table, build_thresholds_table},
};

#[derive(Parser)]
pub struct AnalyzeArgs {
    #[clap(flatten)]
    tibber: TibberArgs,
}

impl AnalyzeArgs {
    #[instrument(skip_all)]
    pub async fn run(self, config: &Config) -> Result {
        let now = Utc::now();
        let forecast = self.tibber.try_new_client()?.get_forecast(now).await?;
        let thresholds = config.analyzer().analyze(&forecast, now)?;
        println!("{}", build_forecast_table(&forecast, now, &thresholds));
        println!("{}", build_thresholds_table(&thresholds));
        Ok(())
    }
}
