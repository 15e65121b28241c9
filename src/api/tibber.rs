//! [Tibber](https://developer.tibber.com/docs/overview) price provider.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::{
    api::{client, provider::PriceProvider},
    core::forecast::{PriceForecast, PriceLevel, PricePoint},
    prelude::*,
    quantity::price::CentsPerKilowattHour,
};

// language=GraphQL
const QUERY: &str = "{
    viewer {
        homes {
            id
            currentSubscription {
                priceInfo {
                    today { total startsAt level }
                    tomorrow { total startsAt level }
                }
            }
        }
    }
}";

pub struct Api {
    client: Client,
    url: Url,

    /// Home to take the prices of, the first subscribed home when not set.
    home_id: Option<String>,
}

impl Api {
    pub const DEFAULT_URL: &'static str = "https://api.tibber.com/v1-beta/gql";

    pub fn try_new(access_token: &str, url: Url, home_id: Option<String>) -> Result<Self> {
        Ok(Self { client: client::try_new(access_token, Duration::from_secs(10))?, url, home_id })
    }
}

#[async_trait]
impl PriceProvider for Api {
    #[instrument(skip_all)]
    async fn get_forecast(&self, now: DateTime<Utc>) -> Result<PriceForecast> {
        info!("fetching…");
        let response = self
            .client
            .post(self.url.clone())
            .json(&Request { query: QUERY })
            .send()
            .await
            .context("failed to call Tibber")?
            .error_for_status()
            .context("Tibber request failed")?
            .json::<Response>()
            .await
            .context("failed to deserialize the Tibber response")?;
        let forecast = response.into_forecast(self.home_id.as_deref(), now)?;
        if forecast.is_empty() {
            warn!("Tibber has returned no current or upcoming prices");
        }
        info!(n_points = forecast.len(), "fetched");
        Ok(forecast)
    }
}

#[derive(Serialize)]
struct Request {
    query: &'static str,
}

#[derive(Deserialize)]
struct Response {
    data: Option<Data>,

    #[serde(default)]
    errors: Vec<ResponseError>,
}

impl Response {
    /// Extract the points which have not ended yet.
    fn into_forecast(self, home_id: Option<&str>, now: DateTime<Utc>) -> Result<PriceForecast> {
        if let Some(error) = self.errors.first() {
            bail!("Tibber responded with an error: {}", error.message);
        }
        let home = self
            .data
            .context("Tibber responded with no data")?
            .viewer
            .homes
            .into_iter()
            .filter(|home| home_id.is_none_or(|home_id| home.id == home_id))
            .find_map(|home| home.current_subscription)
            .context("no pricing data: no subscribed home found")?;
        let since = now - TimeDelta::hours(1);
        let points = home
            .price_info
            .today
            .into_iter()
            .chain(home.price_info.tomorrow)
            .filter(|point| point.starts_at > since)
            .map(PricePoint::from)
            .collect::<Vec<_>>();
        PriceForecast::try_from(points)
    }
}

#[derive(Deserialize)]
struct ResponseError {
    message: String,
}

#[derive(Deserialize)]
struct Data {
    viewer: Viewer,
}

#[derive(Deserialize)]
struct Viewer {
    homes: Vec<Home>,
}

#[derive(Deserialize)]
struct Home {
    id: String,

    #[serde(rename = "currentSubscription")]
    current_subscription: Option<Subscription>,
}

#[derive(Deserialize)]
struct Subscription {
    #[serde(rename = "priceInfo")]
    price_info: PriceInfo,
}

#[derive(Deserialize)]
struct PriceInfo {
    #[serde(default)]
    today: Vec<Price>,

    /// Empty until the day-ahead prices are published.
    #[serde(default)]
    tomorrow: Vec<Price>,
}

#[derive(Deserialize)]
struct Price {
    /// Price in the currency units per kilowatt-hour, including taxes.
    total: f64,

    #[serde(rename = "startsAt")]
    starts_at: DateTime<Utc>,

    #[serde(default)]
    level: PriceLevel,
}

impl From<Price> for PricePoint {
    fn from(price: Price) -> Self {
        Self {
            starts_at: price.starts_at,
            price: CentsPerKilowattHour::from_currency_units(price.total),
            level: price.level,
        }
    }
}
