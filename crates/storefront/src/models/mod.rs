//! Session-backed models for storefront.

pub mod session;

pub use session::{Visit, keys};
