//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;
use std::str::FromStr;

use gi_foundation_core::format_usd;
use rust_decimal::Decimal;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Returns the content hash for a static asset, computed at build time.
///
/// Unknown names hash to an empty string.
///
/// Usage in templates: `{{ "main.css"|asset_hash }}`
#[askama::filter_fn]
pub fn asset_hash(name: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(match name.to_string().as_str() {
        "main.css" => env!("CSS_HASH"),
        "cart.js" => env!("CART_JS_HASH"),
        "checkout.js" => env!("CHECKOUT_JS_HASH"),
        _ => "",
    })
}

/// Formats a decimal amount as US dollars.
///
/// Values that are not numbers pass through unchanged.
///
/// Usage in templates: `{{ product.suggested_amount|usd }}`
#[askama::filter_fn]
pub fn usd(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let raw = value.to_string();
    Ok(Decimal::from_str(raw.trim()).map_or(raw, format_usd))
}
