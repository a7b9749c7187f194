//! Rupee amounts are `Decimal` in the domain and integer paisa on the wire to
//! Khalti and in the database.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};

/// Upper bound for a caller-supplied shipping fee, in paisa (NPR 100,000).
pub const MAX_SHIPPING_FEE_PAISA: i64 = 10_000_000;

/// Upper bound for any order total, in paisa (NPR 1 billion).
pub const MAX_ORDER_TOTAL_PAISA: i64 = 100_000_000_000;

/// Decimal rupees to integer paisa, half away from zero. `None` when the
/// amount does not fit.
pub fn to_paisa(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub fn from_paisa(paisa: i64) -> Decimal {
    Decimal::new(paisa, 2)
}

/// True when `amount` has no fraction finer than one paisa.
pub fn has_paisa_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn paisa_rounding_and_range() {
        assert_eq!(to_paisa(dec!(250)), Some(25_000));
        assert_eq!(to_paisa(dec!(99.995)), Some(10_000));
        assert_eq!(from_paisa(25_050), dec!(250.50));
        assert_eq!(to_paisa(Decimal::MAX), None);
        assert_eq!(to_paisa(dec!(1000000000000000000000000000)), None);
    }

    #[test]
    fn precision_check_ignores_trailing_zeros() {
        assert!(has_paisa_precision(dec!(50.500)));
        assert!(has_paisa_precision(dec!(50)));
        assert!(!has_paisa_precision(dec!(50.005)));
    }
}
