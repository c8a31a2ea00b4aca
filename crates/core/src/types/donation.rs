//! Donation amount parsing and validation.
//!
//! Cart line items carry a pay-what-you-want donation per unit instead of a
//! fixed price. Entry is lenient: [`parse_donation_input`] turns anything
//! unusable into `None` so the cart can hold an unfinished value. The strict
//! check, [`validate_donation`], only runs when the donor tries to check out.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::round_cents;

/// Default minimum donation per unit, in dollars.
pub const DEFAULT_MIN_DONATION: Decimal = Decimal::TEN;

/// Largest donation per unit the cart will hold ($1,000,000).
///
/// Anything above it parses as "no amount", which keeps line totals and the
/// cart total far inside `Decimal`'s range.
pub const MAX_DONATION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Deployment-specific donation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationPolicy {
    /// Smallest accepted donation per unit.
    pub minimum: Decimal,
    /// Largest accepted donation per unit, never above [`MAX_DONATION`].
    #[serde(default = "default_maximum")]
    pub maximum: Decimal,
}

impl DonationPolicy {
    /// Create a policy with the given minimum, normalized to cents.
    #[must_use]
    pub fn new(minimum: Decimal) -> Self {
        Self {
            minimum: round_cents(minimum),
            maximum: MAX_DONATION,
        }
    }

    /// Lower the per-unit maximum. Values above [`MAX_DONATION`] are capped.
    #[must_use]
    pub fn with_maximum(mut self, maximum: Decimal) -> Self {
        self.maximum = round_cents(maximum).min(MAX_DONATION);
        self
    }

    /// Human-readable minimum, without trailing zeros for whole dollars
    /// (`$10`, `$12.50`).
    #[must_use]
    pub fn minimum_label(&self) -> String {
        dollar_label(self.minimum)
    }

    #[must_use]
    pub fn maximum_label(&self) -> String {
        dollar_label(self.maximum)
    }
}

impl Default for DonationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DONATION)
    }
}

const fn default_maximum() -> Decimal {
    MAX_DONATION
}

/// `$10`, `$12.50`, `$1,000,000`.
fn dollar_label(amount: Decimal) -> String {
    let whole = amount.trunc().normalize().to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if amount.fract().is_zero() {
        format!("${grouped}")
    } else {
        let cents = format!("{:.2}", amount.fract());
        format!("${grouped}{}", cents.trim_start_matches('0'))
    }
}

/// Outcome of validating a single donation amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonationValidation {
    pub is_valid: bool,
    /// The parsed amount rounded to cents, if any could be parsed.
    pub normalized_amount: Option<Decimal>,
    pub minimum: Decimal,
    pub message: String,
}

/// Parse raw donation input into a positive amount rounded to cents.
///
/// Accepts surrounding whitespace and an optional leading `$`, then reads the
/// longest numeric prefix (`"25.5 dollars"` parses as `25.50`). Empty,
/// unparseable, zero, negative and above-[`MAX_DONATION`] inputs all yield
/// `None`.
///
/// ```
/// use gi_foundation_core::parse_donation_input;
/// use rust_decimal::Decimal;
///
/// assert_eq!(parse_donation_input("15"), Some(Decimal::new(15, 0)));
/// assert_eq!(parse_donation_input("$12.345"), Some(Decimal::new(1235, 2)));
/// assert_eq!(parse_donation_input("abc"), None);
/// assert_eq!(parse_donation_input("-5"), None);
/// assert_eq!(parse_donation_input("79228162514264337593543950335"), None);
/// ```
#[must_use]
pub fn parse_donation_input(raw: &str) -> Option<Decimal> {
    parse_positive(raw).and_then(normalize_amount)
}

/// Positive number read from raw input, with no upper bound.
fn parse_positive(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed).trim_start();
    let prefix = numeric_prefix(trimmed);
    if prefix.is_empty() {
        return None;
    }
    let (negative, unsigned) = match prefix.as_bytes().first() {
        Some(b'-') => (true, prefix.get(1..).unwrap_or("")),
        Some(b'+') => (false, prefix.get(1..).unwrap_or("")),
        _ => (false, prefix),
    };
    if negative {
        return None;
    }
    let parsed: Decimal = if unsigned.starts_with('.') {
        format!("0{unsigned}").parse().ok()?
    } else {
        unsigned.parse().ok()?
    };
    (parsed > Decimal::ZERO).then_some(parsed)
}

/// Normalize an already-numeric amount: positive values up to
/// [`MAX_DONATION`], rounded to cents.
#[must_use]
pub fn normalize_amount(amount: Decimal) -> Option<Decimal> {
    if amount <= Decimal::ZERO {
        return None;
    }
    let rounded = round_cents(amount);
    (rounded > Decimal::ZERO && rounded <= MAX_DONATION).then_some(rounded)
}

/// Validate an optional amount against the policy bounds.
#[must_use]
pub fn validate_donation(amount: Option<Decimal>, policy: &DonationPolicy) -> DonationValidation {
    let over_maximum = amount.is_some_and(|a| round_cents(a) > policy.maximum);
    let normalized = amount.and_then(normalize_amount);
    let (is_valid, message) = match normalized {
        _ if over_maximum => (
            false,
            format!("Maximum donation is {}", policy.maximum_label()),
        ),
        None => (false, "Enter a donation amount".to_string()),
        Some(value) if value < policy.minimum => (
            false,
            format!("Minimum donation is {}", policy.minimum_label()),
        ),
        Some(_) => (true, "Donation amount is valid".to_string()),
    };

    DonationValidation {
        is_valid,
        normalized_amount: normalized,
        minimum: policy.minimum,
        message,
    }
}

/// Validate raw text input (parse, then validate).
///
/// Unlike [`parse_donation_input`], an amount above the maximum is reported
/// as such instead of as missing.
#[must_use]
pub fn validate_donation_input(raw: &str, policy: &DonationPolicy) -> DonationValidation {
    validate_donation(parse_positive(raw), policy)
}

/// Longest prefix of `s` that looks like `[+-]?digits[.digits]`.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > end + 1 {
            has_digits = true;
            end = frac_end;
        }
    }
    if has_digits { s.get(..end).unwrap_or("") } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min: i64) -> DonationPolicy {
        DonationPolicy::new(Decimal::new(min, 0))
    }

    #[test]
    fn test_parse_rejects_empty_and_junk() {
        assert_eq!(parse_donation_input(""), None);
        assert_eq!(parse_donation_input("   "), None);
        assert_eq!(parse_donation_input("abc"), None);
        assert_eq!(parse_donation_input("."), None);
        assert_eq!(parse_donation_input("$"), None);
    }

    #[test]
    fn test_parse_rejects_non_positive() {
        assert_eq!(parse_donation_input("0"), None);
        assert_eq!(parse_donation_input("-10"), None);
        assert_eq!(parse_donation_input("0.001"), None);
    }

    #[test]
    fn test_parse_rounds_to_cents() {
        assert_eq!(parse_donation_input("10.005"), Some(Decimal::new(1001, 2)));
        assert_eq!(parse_donation_input("10.004"), Some(Decimal::new(1000, 2)));
        assert_eq!(parse_donation_input(".5"), Some(Decimal::new(50, 2)));
    }

    #[test]
    fn test_parse_numeric_prefix() {
        assert_eq!(parse_donation_input("25.5 dollars"), Some(Decimal::new(2550, 2)));
        assert_eq!(parse_donation_input(" $ 20 "), Some(Decimal::new(20, 0)));
        assert_eq!(parse_donation_input("12."), Some(Decimal::new(12, 0)));
    }

    #[test]
    fn test_validate_missing_amount() {
        let result = validate_donation(None, &policy(10));
        assert!(!result.is_valid);
        assert_eq!(result.message, "Enter a donation amount");
        assert_eq!(result.normalized_amount, None);
    }

    #[test]
    fn test_validate_below_minimum() {
        let result = validate_donation(Some(Decimal::new(5, 0)), &policy(10));
        assert!(!result.is_valid);
        assert_eq!(result.message, "Minimum donation is $10");
        assert_eq!(result.normalized_amount, Some(Decimal::new(5, 0)));
    }

    #[test]
    fn test_validate_at_and_above_minimum() {
        assert!(validate_donation(Some(Decimal::new(10, 0)), &policy(10)).is_valid);
        assert!(validate_donation(Some(Decimal::new(15, 0)), &policy(10)).is_valid);
    }

    #[test]
    fn test_validate_input_text() {
        let result = validate_donation_input("9.999", &policy(10));
        assert!(result.is_valid, "9.999 rounds up to the $10 minimum");
    }

    #[test]
    fn test_parse_rejects_amounts_above_ceiling() {
        assert_eq!(parse_donation_input("1000000"), Some(MAX_DONATION));
        assert_eq!(parse_donation_input("1000000.01"), None);
        assert_eq!(parse_donation_input("79228162514264337593543950335"), None);
        assert_eq!(normalize_amount(Decimal::MAX), None);
    }

    #[test]
    fn test_validate_above_maximum() {
        let capped = policy(10).with_maximum(Decimal::new(5000, 0));
        let result = validate_donation(Some(Decimal::new(5001, 0)), &capped);
        assert!(!result.is_valid);
        assert_eq!(result.message, "Maximum donation is $5,000");
        assert!(validate_donation(Some(Decimal::new(5000, 0)), &capped).is_valid);

        let huge = validate_donation_input("79228162514264337593543950335", &policy(10));
        assert!(!huge.is_valid);
        assert_eq!(huge.message, "Maximum donation is $1,000,000");
        assert_eq!(huge.normalized_amount, None);
    }

    #[test]
    fn test_with_maximum_is_capped() {
        let policy = policy(10).with_maximum(Decimal::MAX);
        assert_eq!(policy.maximum, MAX_DONATION);
    }

    #[test]
    fn test_minimum_label() {
        assert_eq!(policy(1).minimum_label(), "$1");
        assert_eq!(
            DonationPolicy::new(Decimal::new(1250, 2)).minimum_label(),
            "$12.50"
        );
    }
}
