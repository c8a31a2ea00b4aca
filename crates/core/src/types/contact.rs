//! Contact and shipping field validators for the checkout form.
//!
//! Each field has an input normalizer (applied as the donor types) and an
//! independent predicate returning a [`FieldValidation`]. Neither depends on
//! any other field, so the form can validate fields one at a time on input
//! and blur as well as all together on submit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::email::{Email, EmailError};

/// Maximum characters kept for a ZIP+4 code (`12345-6789`).
const ZIP_MAX_LEN: usize = 10;

/// A checkout form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Name,
    Email,
    Address,
    City,
    State,
    Zip,
}

impl ContactField {
    /// Every field, in form order.
    pub const ALL: [Self; 6] = [
        Self::Name,
        Self::Email,
        Self::Address,
        Self::City,
        Self::State,
        Self::Zip,
    ];

    /// Form field name (also used in DOM ids).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Address => "address",
            Self::City => "city",
            Self::State => "state",
            Self::Zip => "zip",
        }
    }

    /// Label shown next to the input.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "Full name",
            Self::Email => "Email",
            Self::Address => "Street address",
            Self::City => "City",
            Self::State => "State",
            Self::Zip => "ZIP code",
        }
    }
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a field name is not recognized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown contact field: {0}")]
pub struct UnknownField(pub String);

impl FromStr for ContactField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

/// Outcome of validating one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValidation {
    pub is_valid: bool,
    /// Empty when valid.
    pub message: String,
}

impl FieldValidation {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            is_valid: true,
            message: String::new(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

/// Normalize raw input as it is typed.
///
/// - State: letters only, uppercased, at most two characters.
/// - ZIP: digits and dashes only, at most ten characters.
/// - Everything else is passed through untouched.
#[must_use]
pub fn normalize_field_input(field: ContactField, raw: &str) -> String {
    match field {
        ContactField::State => raw
            .chars()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_uppercase())
            .take(2)
            .collect(),
        ContactField::Zip => raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .take(ZIP_MAX_LEN)
            .collect(),
        _ => raw.to_string(),
    }
}

/// Validate a single field value.
#[must_use]
pub fn validate_field(field: ContactField, value: &str) -> FieldValidation {
    match field {
        ContactField::Name => validate_name(value),
        ContactField::Email => validate_email(value),
        ContactField::Address => validate_min_length(value, 5, "Please enter your street address"),
        ContactField::City => validate_min_length(value, 2, "Please enter your city"),
        ContactField::State => validate_state(value),
        ContactField::Zip => validate_zip(value),
    }
}

/// Full name: at least two characters of letters, spaces, hyphens or apostrophes.
#[must_use]
pub fn validate_name(value: &str) -> FieldValidation {
    let value = value.trim();
    if value.is_empty() {
        return FieldValidation::error("Please enter your full name");
    }
    if value.chars().count() < 2 {
        return FieldValidation::error("Name must be at least 2 characters");
    }
    let allowed = |c: char| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'';
    if !value.chars().all(allowed) {
        return FieldValidation::error(
            "Name can only contain letters, spaces, hyphens and apostrophes",
        );
    }
    FieldValidation::ok()
}

/// Email in `local@domain.tld` shape.
#[must_use]
pub fn validate_email(value: &str) -> FieldValidation {
    match Email::parse(value) {
        Ok(_) => FieldValidation::ok(),
        Err(EmailError::Empty) => FieldValidation::error("Please enter your email address"),
        Err(_) => FieldValidation::error("Please enter a valid email address"),
    }
}

/// Two-letter state code.
#[must_use]
pub fn validate_state(value: &str) -> FieldValidation {
    let value = value.trim();
    if value.is_empty() {
        return FieldValidation::error("Please enter your state");
    }
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return FieldValidation::error("Use the 2-letter state code (e.g. CA)");
    }
    FieldValidation::ok()
}

/// Five-digit ZIP, optionally followed by `-` and four digits.
#[must_use]
pub fn validate_zip(value: &str) -> FieldValidation {
    let value = value.trim();
    if value.is_empty() {
        return FieldValidation::error("Please enter your ZIP code");
    }
    let all_digits = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit());
    let valid = match value.split_once('-') {
        None => all_digits(value, 5),
        Some((base, plus4)) => all_digits(base, 5) && all_digits(plus4, 4),
    };
    if valid {
        FieldValidation::ok()
    } else {
        FieldValidation::error("Enter a 5-digit ZIP code (or ZIP+4)")
    }
}

fn validate_min_length(value: &str, min: usize, empty_message: &str) -> FieldValidation {
    let value = value.trim();
    if value.is_empty() {
        return FieldValidation::error(empty_message);
    }
    if value.chars().count() < min {
        return FieldValidation::error(format!("Must be at least {min} characters"));
    }
    FieldValidation::ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(validate_name("Mary-Jane O'Neil").is_valid);
        assert!(validate_name("José").is_valid);
        assert!(!validate_name("").is_valid);
        assert!(!validate_name("A").is_valid);
        assert!(!validate_name("R2D2").is_valid);
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("donor@example.org").is_valid);
        assert_eq!(
            validate_email("").message,
            "Please enter your email address"
        );
        assert!(!validate_email("donor@example").is_valid);
    }

    #[test]
    fn test_address_and_city_lengths() {
        assert!(validate_field(ContactField::Address, "1 Elm").is_valid);
        assert!(!validate_field(ContactField::Address, "1 El").is_valid);
        assert!(validate_field(ContactField::City, "LA").is_valid);
        assert!(!validate_field(ContactField::City, "L").is_valid);
    }

    #[test]
    fn test_state_normalized_and_validated() {
        let normalized = normalize_field_input(ContactField::State, "ca");
        assert_eq!(normalized, "CA");
        assert!(validate_state(&normalized).is_valid);
        assert_eq!(normalize_field_input(ContactField::State, "c4lif"), "CL");
        assert!(!validate_state("C").is_valid);
        assert!(!validate_state("C1").is_valid);
    }

    #[test]
    fn test_zip_rules() {
        assert!(!validate_zip("1234").is_valid);
        assert!(!validate_zip("123456").is_valid);
        assert!(validate_zip("12345").is_valid);
        assert!(validate_zip("12345-6789").is_valid);
        assert!(!validate_zip("12345-678").is_valid);
        assert!(!validate_zip("1234a").is_valid);
    }

    #[test]
    fn test_zip_input_filter() {
        assert_eq!(normalize_field_input(ContactField::Zip, "12a34 5"), "12345");
        assert_eq!(
            normalize_field_input(ContactField::Zip, "12345-67890123"),
            "12345-6789"
        );
    }

    #[test]
    fn test_field_round_trip_names() {
        for field in ContactField::ALL {
            assert_eq!(field.as_str().parse::<ContactField>().unwrap(), field);
        }
        assert!("phone".parse::<ContactField>().is_err());
    }
}
