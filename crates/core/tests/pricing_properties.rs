//! Property-based tests for line valuation and quotation aggregation.

use proptest::prelude::*;
use quotedesk_core::cpq::{aggregate, round_money, value_line};
use rust_decimal::Decimal;

fn money_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=99_999).prop_map(|hundredths| Decimal::new(hundredths, 2))
}

fn line_totals_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(
        (money_strategy(), 1u32..500).prop_map(|(unit_cost, quantity)| {
            value_line(unit_cost, "unit_cost", Decimal::from(quantity), "quantity")
                .expect("valid line")
        }),
        0..12,
    )
}

/// Property: a line is worth its rate times its quantity, rounded to cents.
#[test]
fn prop_line_value_is_rounded_product() {
    proptest!(|(
        rate in money_strategy(),
        quarter_hours in 1i64..4_000,
    )| {
        let hours = Decimal::new(quarter_hours * 25, 2);
        let value = value_line(rate, "hourly_rate", hours, "hours").expect("valid line");

        prop_assert_eq!(value, round_money(rate * hours));
        prop_assert_eq!(value.scale(), 2);
        prop_assert!(!value.is_sign_negative());
    });
}

/// Property: every intermediate of the aggregate chains into the next one exactly.
///
/// This property tests that:
/// 1. subtotal_base is the hardware plus personnel totals
/// 2. subtotal is subtotal_base plus markup
/// 3. total is subtotal plus tax, with every amount carried at two decimals
#[test]
fn prop_aggregate_components_add_up() {
    proptest!(|(
        hardware in line_totals_strategy(),
        personnel in line_totals_strategy(),
        markup in percentage_strategy(),
        tax in percentage_strategy(),
    )| {
        let totals = aggregate(&hardware, &personnel, markup, tax).expect("aggregate");

        prop_assert_eq!(totals.hardware_total, hardware.iter().copied().sum::<Decimal>());
        prop_assert_eq!(totals.personnel_total, personnel.iter().copied().sum::<Decimal>());
        prop_assert_eq!(totals.subtotal_base, totals.hardware_total + totals.personnel_total);
        prop_assert_eq!(totals.subtotal, totals.subtotal_base + totals.markup_amount);
        prop_assert_eq!(totals.total_amount, totals.subtotal + totals.tax_amount);
        for amount in [
            totals.hardware_total,
            totals.personnel_total,
            totals.subtotal_base,
            totals.markup_amount,
            totals.subtotal,
            totals.tax_amount,
            totals.total_amount,
        ] {
            prop_assert_eq!(amount.scale(), 2);
            prop_assert!(!amount.is_sign_negative());
        }
    });
}

/// Property: aggregation is a pure function of its inputs and ignores line order.
#[test]
fn prop_aggregate_is_deterministic() {
    proptest!(|(
        hardware in line_totals_strategy(),
        personnel in line_totals_strategy(),
        markup in percentage_strategy(),
        tax in percentage_strategy(),
    )| {
        let first = aggregate(&hardware, &personnel, markup, tax).expect("aggregate");
        let second = aggregate(&hardware, &personnel, markup, tax).expect("aggregate");
        prop_assert_eq!(first, second);

        let mut reversed = hardware.clone();
        reversed.reverse();
        let reordered = aggregate(&reversed, &personnel, markup, tax).expect("aggregate");
        prop_assert_eq!(first, reordered);
    });
}

/// Property: with no markup and no tax the total is just the line sum.
#[test]
fn prop_zero_rates_leave_line_sum_untouched() {
    proptest!(|(
        hardware in line_totals_strategy(),
        personnel in line_totals_strategy(),
    )| {
        let totals =
            aggregate(&hardware, &personnel, Decimal::ZERO, Decimal::ZERO).expect("aggregate");

        prop_assert!(totals.markup_amount.is_zero());
        prop_assert!(totals.tax_amount.is_zero());
        prop_assert_eq!(totals.total_amount, totals.subtotal_base);
    });
}

/// Property: percentages outside 0..=999.99 are refused.
#[test]
fn prop_out_of_range_percentages_are_rejected() {
    proptest!(|(
        hardware in line_totals_strategy(),
        excess in 1i64..1_000_000,
    )| {
        let too_high = Decimal::new(99_999 + excess, 2);
        let negative = Decimal::new(-excess, 2);

        prop_assert!(aggregate(&hardware, &[], too_high, Decimal::ZERO).is_err());
        prop_assert!(aggregate(&hardware, &[], Decimal::ZERO, too_high).is_err());
        prop_assert!(aggregate(&hardware, &[], negative, Decimal::ZERO).is_err());
    });
}
