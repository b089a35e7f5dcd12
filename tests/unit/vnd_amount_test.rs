//! Integer-VND conversion rules

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use hapay::core::currency::{to_vnd, vnd_matches, MIN_GATEWAY_AMOUNT_VND};

proptest! {
    /// Whole-VND totals convert without change
    #[test]
    fn integral_totals_pass_through(amount in 0i64..1_000_000_000_000) {
        prop_assert_eq!(to_vnd(Decimal::from(amount)).unwrap(), amount);
    }

    /// The rounded value is never more than half a dong away from the total
    #[test]
    fn rounding_stays_within_half_a_dong(units in -10_000_000i64..10_000_000, cents in 0u32..100) {
        let total = Decimal::new(units * 100 + cents as i64, 2);
        let rounded = Decimal::from(to_vnd(total).unwrap());
        let distance = (total - rounded).abs();
        prop_assert!(distance <= dec!(0.5));
    }

    /// An order always matches its own converted amount
    #[test]
    fn order_total_matches_itself(units in 0i64..10_000_000, cents in 0u32..100) {
        let total = Decimal::new(units * 100 + cents as i64, 2);
        let amount = to_vnd(total).unwrap();
        prop_assert!(vnd_matches(total, amount));
    }

    /// Shifting the converted amount by any nonzero delta breaks the match
    #[test]
    fn shifted_amount_never_matches(units in 0i64..10_000_000, delta in 1i64..1000) {
        let total = Decimal::from(units);
        prop_assert!(!vnd_matches(total, units + delta));
        prop_assert!(!vnd_matches(total, units - delta));
    }
}

#[test]
fn midpoint_rounds_away_from_zero() {
    assert_eq!(to_vnd(dec!(150000.5)).unwrap(), 150001);
    assert_eq!(to_vnd(dec!(150000.49)).unwrap(), 150000);
    assert_eq!(to_vnd(dec!(-1500.5)).unwrap(), -1501);
    assert_eq!(to_vnd(dec!(0.5)).unwrap(), 1);
}

#[test]
fn out_of_range_total_is_an_error() {
    assert!(to_vnd(Decimal::MAX).is_err());
}

#[test]
fn gateway_minimum_is_one_thousand_vnd() {
    assert_eq!(MIN_GATEWAY_AMOUNT_VND, 1000);
}
