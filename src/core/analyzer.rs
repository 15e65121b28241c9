use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    core::forecast::PriceForecast,
    error::EngineError,
    quantity::price::CentsPerKilowattHour,
};

/// Per-tick statistics over the upcoming prices.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PriceThresholds {
    pub current: CentsPerKilowattHour,

    /// Prices at or below this are worth charging from the grid.
    pub charge: CentsPerKilowattHour,

    /// Prices at or above this are worth discharging.
    pub discharge: CentsPerKilowattHour,

    pub min: CentsPerKilowattHour,
    pub max: CentsPerKilowattHour,
    pub average: CentsPerKilowattHour,

    /// Price spread relative to the average price.
    pub volatility: f64,

    pub n_points: usize,
}

impl PriceThresholds {
    pub fn is_negative(&self) -> bool {
        self.current < CentsPerKilowattHour::ZERO
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, bon::Builder)]
pub struct Analyzer {
    #[builder(default = 12)]
    min_points: usize,

    #[builder(default = 24)]
    horizon: usize,

    #[builder(default = 0.30)]
    charge_percentile: f64,

    #[builder(default = 0.80)]
    discharge_percentile: f64,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Analyzer {
    /// Derive the thresholds from the forecast horizon starting at `now`.
    ///
    /// Pure: the same forecast and time always produce the same thresholds.
    pub fn analyze(
        &self,
        forecast: &PriceForecast,
        now: DateTime<Utc>,
    ) -> Result<PriceThresholds, EngineError> {
        let horizon = forecast.horizon(now, self.horizon);
        let Some(current) = horizon.first().map(|point| point.price) else {
            return Err(EngineError::data_unavailable(
                "no pricing data: nothing covers the current time",
            ));
        };
        if horizon.len() < self.min_points {
            return Err(EngineError::data_unavailable(format!(
                "insufficient data: {} of {} forecast points",
                horizon.len(),
                self.min_points,
            )));
        }

        let sorted = horizon.iter().map(|point| point.price).sorted().collect_vec();
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        #[expect(clippy::cast_precision_loss)]
        let average = sorted.iter().copied().sum::<CentsPerKilowattHour>() / sorted.len() as f64;
        if average.0.abs() < f64::EPSILON {
            return Err(EngineError::data_unavailable("insufficient data: zero average price"));
        }

        Ok(PriceThresholds {
            current,
            charge: sorted[Self::percentile_index(sorted.len(), self.charge_percentile)],
            discharge: sorted[Self::percentile_index(sorted.len(), self.discharge_percentile)],
            min,
            max,
            average,
            volatility: (max - min).0 / average.0,
            n_points: sorted.len(),
        })
    }

    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn percentile_index(n: usize, percentile: f64) -> usize {
        ((n as f64 * percentile).floor() as usize).min(n - 1)
    }
}
