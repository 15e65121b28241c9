use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{core::forecast::PriceForecast, prelude::*};

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch the upcoming prices, including the one covering `now`.
    async fn get_forecast(&self, now: DateTime<Utc>) -> Result<PriceForecast>;
}
