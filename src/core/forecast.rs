use std::fmt::{Display, Formatter};

use chrono::{DateTime, TimeDelta, Utc};
use comfy_table::Color;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{prelude::*, quantity::price::CentsPerKilowattHour};

/// Price level as classified by the price provider.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceLevel {
    VeryCheap,
    Cheap,
    #[default]
    Normal,
    Expensive,
    VeryExpensive,
}

impl Display for PriceLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryCheap => write!(f, "Very cheap"),
            Self::Cheap => write!(f, "Cheap"),
            Self::Normal => write!(f, "Normal"),
            Self::Expensive => write!(f, "Expensive"),
            Self::VeryExpensive => write!(f, "Very expensive"),
        }
    }
}

impl PriceLevel {
    pub const fn color(self) -> Color {
        match self {
            Self::VeryCheap => Color::Green,
            Self::Cheap => Color::DarkGreen,
            Self::Normal => Color::Reset,
            Self::Expensive => Color::DarkYellow,
            Self::VeryExpensive => Color::Red,
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub starts_at: DateTime<Utc>,
    pub price: CentsPerKilowattHour,

    #[serde(default)]
    pub level: PriceLevel,
}

/// Chronologically ordered price points without duplicate timestamps.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PriceForecast(Vec<PricePoint>);

impl TryFrom<Vec<PricePoint>> for PriceForecast {
    type Error = Error;

    fn try_from(points: Vec<PricePoint>) -> Result<Self> {
        if let Some((previous, next)) = points
            .iter()
            .tuple_windows()
            .find(|(previous, next)| previous.starts_at >= next.starts_at)
        {
            bail!(
                "price points are out of order: `{}` is followed by `{}`",
                previous.starts_at,
                next.starts_at,
            );
        }
        Ok(Self(points))
    }
}

impl PriceForecast {
    #[must_use]
    pub fn points(&self) -> &[PricePoint] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the point covering the specified time.
    #[must_use]
    pub fn position_at(&self, now: DateTime<Utc>) -> Option<usize> {
        let index = self.0.partition_point(|point| point.starts_at <= now).checked_sub(1)?;
        let ends_at = self.0.get(index + 1).map_or_else(
            // The last point is assumed to last for an hour:
            || self.0[index].starts_at + TimeDelta::hours(1),
            |next| next.starts_at,
        );
        (now < ends_at).then_some(index)
    }

    /// The point covering the specified time.
    #[must_use]
    pub fn current(&self, now: DateTime<Utc>) -> Option<&PricePoint> {
        self.position_at(now).map(|index| &self.0[index])
    }

    /// Up to `n` points starting with the one covering the specified time.
    #[must_use]
    pub fn horizon(&self, now: DateTime<Utc>, n: usize) -> &[PricePoint] {
        let Some(index) = self.position_at(now) else {
            return &[];
        };
        &self.0[index..(index + n).min(self.0.len())]
    }
}

#[cfg(test)]
pub mod tests {
    use chrono::TimeZone;

    use super::*;

    /// 24 hours between 5 and 20 cents starting at 6 cents.
    pub const DAY_PRICES: [f64; 24] = [
        6.0, 5.0, 5.5, 7.0, 8.0, 9.0, 12.0, 15.0, 18.0, 20.0, 17.0, 14.0, 11.0, 10.0, 9.5, 10.5,
        13.0, 16.0, 19.0, 19.5, 15.5, 12.5, 8.5, 7.5,
    ];

    pub fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 0, 0, 0).unwrap()
    }

    /// Build an hourly forecast starting at midnight.
    pub fn hourly(prices: &[f64]) -> PriceForecast {
        let points: Vec<PricePoint> = prices
            .iter()
            .enumerate()
            .map(|(hour, price)| PricePoint {
                starts_at: midnight() + TimeDelta::hours(i64::try_from(hour).unwrap()),
                price: CentsPerKilowattHour(*price),
                level: PriceLevel::Normal,
            })
            .collect();
        PriceForecast::try_from(points).unwrap()
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut points = hourly(&[1.0, 2.0]).0;
        points.swap(0, 1);
        assert!(PriceForecast::try_from(points).is_err());
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let mut points = hourly(&[1.0, 2.0]).0;
        points[1].starts_at = points[0].starts_at;
        assert!(PriceForecast::try_from(points).is_err());
    }

    #[test]
    fn test_current() {
        let forecast = hourly(&[1.0, 2.0, 3.0]);
        let now = midnight() + TimeDelta::minutes(90);
        assert_eq!(forecast.current(now).unwrap().price, CentsPerKilowattHour(2.0));
    }

    #[test]
    fn test_last_point_covers_one_hour() {
        let forecast = hourly(&[1.0, 2.0]);
        assert!(forecast.current(midnight() + TimeDelta::minutes(119)).is_some());
        assert!(forecast.current(midnight() + TimeDelta::minutes(120)).is_none());
    }

    #[test]
    fn test_nothing_before_first_point() {
        let forecast = hourly(&[1.0, 2.0]);
        assert!(forecast.current(midnight() - TimeDelta::minutes(1)).is_none());
    }

    #[test]
    fn test_horizon_is_capped() {
        let forecast = hourly(&[1.0; 30]);
        assert_eq!(forecast.horizon(midnight() + TimeDelta::hours(2), 24).len(), 24);
        assert_eq!(forecast.horizon(midnight() + TimeDelta::hours(20), 24).len(), 10);
    }
}
