//! Estimated sales tax.
//!
//! This is an illustrative estimate shown next to the cart total, not a tax
//! engine. Rates come from a small static table keyed by two-letter state
//! code; unknown states fall back to [`DEFAULT_TAX_RATE`].

use rust_decimal::Decimal;

/// Rate applied when the state is missing or not in the table (7%).
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(7, 0, 0, false, 2);

/// Static state rate table as `(code, rate in thousandths of a percent)`.
const STATE_RATES: &[(&str, i64)] = &[
    ("AK", 0),
    ("CA", 8_250),
    ("DE", 0),
    ("FL", 6_000),
    ("GA", 4_000),
    ("IL", 6_250),
    ("MA", 6_250),
    ("MT", 0),
    ("NH", 0),
    ("NJ", 6_625),
    ("NY", 8_000),
    ("OR", 0),
    ("PA", 6_000),
    ("TX", 6_250),
    ("WA", 6_500),
];

/// Look up the rate for a state code (case-insensitive, whitespace ignored).
#[must_use]
pub fn tax_rate_for(state_code: &str) -> Decimal {
    let code = state_code.trim().to_ascii_uppercase();
    STATE_RATES
        .iter()
        .find(|(state, _)| *state == code)
        .map_or(DEFAULT_TAX_RATE, |(_, rate)| Decimal::new(*rate, 5))
}

/// Estimate tax on a subtotal: `max(0, subtotal * rate)`.
///
/// No rounding is applied; callers format to two decimals for display.
///
/// ```
/// use gi_foundation_core::estimate_tax;
/// use rust_decimal::Decimal;
///
/// assert_eq!(estimate_tax(Decimal::ONE_HUNDRED, "ca"), Decimal::new(825, 2));
/// ```
#[must_use]
pub fn estimate_tax(subtotal: Decimal, state_code: &str) -> Decimal {
    subtotal
        .saturating_mul(tax_rate_for(state_code))
        .max(Decimal::ZERO)
}
