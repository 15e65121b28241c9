use std::fmt::{Debug, Display, Formatter};

use crate::quantity::power::Watts;

quantity!(CentsPerKilowattHour, "¢/kWh", 2);
quantity!(Cost);

impl CentsPerKilowattHour {
    /// Convert from the price in the main currency unit per kilowatt-hour.
    #[must_use]
    pub const fn from_currency_units(price: f64) -> Self {
        Self(price * 100.0)
    }
}

impl Cost {
    /// Cost of importing the grid power for one hour at the specified price.
    ///
    /// Export is free of charge here: negative grid power costs nothing.
    #[must_use]
    pub fn of_import(grid_power: Watts, price: CentsPerKilowattHour) -> Self {
        if grid_power > Watts::ZERO {
            Self(grid_power.to_kilowatts() * price.0 / 100.0)
        } else {
            Self::ZERO
        }
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+.3}", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+.3}", self.0)
    }
}
