//! Core types for the GI Foundation storefront.
//!
//! This module provides type-safe wrappers and pure validators for the
//! donation cart and checkout domain.

pub mod contact;
pub mod donation;
pub mod email;
pub mod id;
pub mod money;
pub mod status;
pub mod tax;

pub use contact::{
    ContactField, FieldValidation, UnknownField, normalize_field_input, validate_field,
};
pub use donation::{
    DEFAULT_MIN_DONATION, DonationPolicy, DonationValidation, MAX_DONATION, normalize_amount,
    parse_donation_input, validate_donation, validate_donation_input,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, format_usd, from_minor_units, round_cents, to_minor_units};
pub use status::*;
pub use tax::{DEFAULT_TAX_RATE, estimate_tax, tax_rate_for};
