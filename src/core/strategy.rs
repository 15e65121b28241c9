use std::fmt::{Display, Formatter};

use comfy_table::Color;
use serde::{Deserialize, Serialize};

use crate::quantity::energy::KilowattHours;

/// Operating strategy, a pure function of the battery capacity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Small battery: follow the price thresholds and charge aggressively.
    PriceSensitive,

    /// Mid-size battery: follow the price thresholds without aggressive charging.
    #[default]
    Hybrid,

    /// Large battery: ignore the price thresholds and soak up the PV surplus.
    SelfConsumption,
}

impl Strategy {
    const PRICE_SENSITIVE_MAX_CAPACITY: KilowattHours = KilowattHours(15.0);
    const HYBRID_MAX_CAPACITY: KilowattHours = KilowattHours(20.0);

    pub fn select(capacity: KilowattHours) -> Self {
        if capacity <= Self::PRICE_SENSITIVE_MAX_CAPACITY {
            Self::PriceSensitive
        } else if capacity <= Self::HYBRID_MAX_CAPACITY {
            Self::Hybrid
        } else {
            Self::SelfConsumption
        }
    }

    #[must_use]
    pub const fn uses_price_thresholds(self) -> bool {
        matches!(self, Self::PriceSensitive | Self::Hybrid)
    }

    #[must_use]
    pub const fn is_aggressive(self) -> bool {
        matches!(self, Self::PriceSensitive)
    }

    /// Expected cost improvement over an unmanaged battery, for reporting only.
    #[must_use]
    pub const fn expected_improvement(self) -> &'static str {
        match self {
            Self::PriceSensitive => "20–30% lower grid costs",
            Self::Hybrid => "10–20% lower grid costs",
            Self::SelfConsumption => "5–10% lower grid costs, higher self-consumption",
        }
    }

    pub const fn color(self) -> Color {
        match self {
            Self::PriceSensitive => Color::Green,
            Self::Hybrid => Color::DarkYellow,
            Self::SelfConsumption => Color::Cyan,
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriceSensitive => write!(f, "Price-sensitive"),
            Self::Hybrid => write!(f, "Hybrid"),
            Self::SelfConsumption => write!(f, "Self-consumption"),
        }
    }
}
