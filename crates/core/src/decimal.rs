//! Quantity and money helpers.
//!
//! All quantities and amounts are `Decimal`. Money is held at two decimal
//! places; there is no multi-currency support.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Number of decimal places money is rounded to.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to 2 decimal places, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Total value of `quantity` units at `unit_cost`, rounded to money scale.
pub fn value_of(quantity: Decimal, unit_cost: Decimal) -> Decimal {
    round_money(quantity * unit_cost)
}

/// Whether two quantities differ by more than `epsilon`.
pub fn differs(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    (a - b).abs() > epsilon
}

/// Reject zero and negative quantities.
pub fn ensure_positive(quantity: Decimal, what: &str) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{what} must be positive (got {quantity})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(109.994)), dec!(109.99));
    }

    #[test]
    fn differs_uses_strict_epsilon() {
        assert!(!differs(dec!(10.00), dec!(10.01), dec!(0.01)));
        assert!(differs(dec!(10.00), dec!(10.02), dec!(0.01)));
    }

    #[test]
    fn ensure_positive_rejects_zero() {
        assert!(ensure_positive(dec!(0), "quantity").is_err());
        assert!(ensure_positive(dec!(-1), "quantity").is_err());
        assert!(ensure_positive(dec!(0.5), "quantity").is_ok());
    }
}
