use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::DomainError;

/// Currency amounts carry exactly two decimal places, halves rounding away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded
}

/// Values one line: `round(rate × quantity, 2)`.
///
/// Quantity must be strictly positive and the rate non-negative; the error names whichever
/// input field broke the rule.
pub fn value_line(
    rate: Decimal,
    rate_field: &'static str,
    quantity: Decimal,
    quantity_field: &'static str,
) -> Result<Decimal, DomainError> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(quantity_field, "must be greater than zero"));
    }
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(DomainError::validation(rate_field, "must not be negative"));
    }

    rate.checked_mul(quantity)
        .map(round_money)
        .ok_or_else(|| DomainError::validation(quantity_field, "line total is out of range"))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{round_money, value_line};
    use crate::errors::DomainError;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(1004, 3)), Decimal::new(100, 2));
        assert_eq!(round_money(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
    }

    #[test]
    fn amounts_always_show_cents() {
        assert_eq!(round_money(Decimal::from(5)).to_string(), "5.00");
        assert_eq!(round_money(Decimal::new(4249, 2)).to_string(), "42.49");
        assert_eq!(round_money(Decimal::new(-1, 3)).to_string(), "0.00");
    }

    #[test]
    fn hardware_line_is_rate_times_quantity() {
        let total = value_line(Decimal::new(10000, 2), "unit_cost", Decimal::from(3), "quantity")
            .expect("valid line");
        assert_eq!(total, Decimal::new(30000, 2));
    }

    #[test]
    fn fractional_hours_round_to_cents() {
        // 33.33 × 1.5 = 49.995
        let total = value_line(Decimal::new(3333, 2), "hourly_rate", Decimal::new(15, 1), "hours")
            .expect("valid line");
        assert_eq!(total, Decimal::new(5000, 2));
    }

    #[test]
    fn zero_rate_is_allowed() {
        let total = value_line(Decimal::ZERO, "unit_cost", Decimal::ONE, "quantity")
            .expect("free items are valid");
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn non_positive_quantity_names_the_field() {
        let error = value_line(Decimal::ONE, "hourly_rate", Decimal::ZERO, "hours")
            .expect_err("zero hours");
        assert!(matches!(error, DomainError::Validation { field: "hours", .. }));

        let error = value_line(Decimal::ONE, "hourly_rate", Decimal::new(-5, 1), "hours")
            .expect_err("negative hours");
        assert!(matches!(error, DomainError::Validation { field: "hours", .. }));
    }

    #[test]
    fn negative_rate_names_the_field() {
        let error = value_line(Decimal::new(-1, 2), "unit_cost", Decimal::ONE, "quantity")
            .expect_err("negative rate");
        assert!(matches!(error, DomainError::Validation { field: "unit_cost", .. }));
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let error = value_line(Decimal::MAX, "unit_cost", Decimal::from(2), "quantity")
            .expect_err("overflow");
        assert!(matches!(error, DomainError::Validation { .. }));
    }
}
