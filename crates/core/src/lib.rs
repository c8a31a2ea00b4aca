//! GI Foundation Core - Shared domain types.
//!
//! This crate provides the pure building blocks used by the storefront:
//! - Donation validation and 2-decimal money normalization
//! - Estimated sales tax lookup
//! - Contact/shipping field validators used by the checkout form
//! - Type-safe identifiers and payment enums
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no persistence. Everything here is deterministic and can be
//! exercised without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Money, donations, tax, contact fields, IDs and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
