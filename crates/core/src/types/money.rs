//! Monetary helpers built on decimal arithmetic.
//!
//! All amounts in the storefront are [`Decimal`] values in the currency's
//! standard unit (dollars). The payment processor expects integer minor units
//! (cents), so conversions live here alongside the display formatting used by
//! templates and e-mails.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places kept for monetary values.
pub const CENT_DECIMAL_PLACES: u32 = 2;

/// ISO 4217 currency codes accepted by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
}

impl CurrencyCode {
    /// The ISO code as sent to the processor.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::USD => "USD",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::USD => "$",
        }
    }
}

/// Round an amount to whole cents, half away from zero.
///
/// ```
/// use gi_foundation_core::round_cents;
/// use rust_decimal::Decimal;
///
/// assert_eq!(round_cents(Decimal::new(10_005, 3)), Decimal::new(1001, 2));
/// assert_eq!(round_cents(Decimal::new(10_004, 3)), Decimal::new(1000, 2));
/// ```
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CENT_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a dollar amount to integer cents.
///
/// Returns `None` if the amount does not fit in an `i64`.
#[must_use]
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    round_cents(amount).checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
}

/// Convert integer cents back to a dollar amount.
#[must_use]
pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, CENT_DECIMAL_PLACES)
}

/// Format an amount as US dollars with exactly two decimals (e.g. `$12.50`).
#[must_use]
pub fn format_usd(amount: Decimal) -> String {
    format!("{}{:.2}", CurrencyCode::USD.symbol(), round_cents(amount))
}
