use std::ops::Mul;

use crate::quantity::energy::KilowattHours;

quantity!(Volts, "V", 1);
quantity!(AmpereHours, "Ah", 0);

impl Mul<Volts> for AmpereHours {
    type Output = KilowattHours;

    fn mul(self, rhs: Volts) -> Self::Output {
        KilowattHours(self.0 * rhs.0 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_ampere_hours_times_volts() {
        assert_abs_diff_eq!((AmpereHours(200.0) * Volts(51.2)).0, 10.24, epsilon = 1e-9);
    }
}
