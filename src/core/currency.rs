use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::core::error::{AppError, Result};

/// Smallest amount the gateways accept, in VND
pub const MIN_GATEWAY_AMOUNT_VND: i64 = 1000;

/// Convert a decimal order total to the integer VND amount the gateways expect
///
/// VND has no sub-unit; rounding is half-away-from-zero so 150000.5 becomes
/// 150001, never 150000. Fails only when the total does not fit an i64, which
/// indicates a corrupt order row.
pub fn to_vnd(amount: Decimal) -> Result<i64> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::internal(format!("amount {} out of VND range", amount)))
}

/// Check whether an integer VND amount matches a decimal order total
pub fn vnd_matches(pay_total: Decimal, amount_vnd: i64) -> bool {
    matches!(to_vnd(pay_total), Ok(v) if v == amount_vnd)
}

/// Format an integer VND amount for log/notification output
pub fn format_vnd(amount_vnd: i64) -> String {
    format!("{} VND", amount_vnd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_to_vnd_rounds_half_away_from_zero() {
        assert_eq!(to_vnd(Decimal::new(1500005, 1)).unwrap(), 150001); // 150000.5
        assert_eq!(to_vnd(Decimal::new(1500004, 1)).unwrap(), 150000); // 150000.4
        assert_eq!(to_vnd(Decimal::new(-15005, 1)).unwrap(), -1501); // -1500.5
    }

    #[test]
    fn test_to_vnd_integral_passthrough() {
        assert_eq!(to_vnd(Decimal::new(150000, 0)).unwrap(), 150000);
    }

    #[test]
    fn test_vnd_matches() {
        assert!(vnd_matches(Decimal::new(150000, 0), 150000));
        assert!(vnd_matches(Decimal::new(1500005, 1), 150001));
        assert!(!vnd_matches(Decimal::new(150000, 0), 140000));
    }

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(150000), "150000 VND");
    }
}
