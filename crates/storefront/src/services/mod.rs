//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `email` - Donor receipts and admin notifications over SMTP
//! - `transactions` - Append-only JSON transaction log

pub mod email;
pub mod transactions;

pub use email::{EmailService, Notifier};
pub use transactions::{TransactionLog, TransactionRecord};
