//! Session-stored visitor state.
//!
//! Each request loads the cart blob, panel state and open checkout from the
//! tower-sessions session, works on them, and writes them back. Unreadable
//! entries are logged and replaced with empty state.

use gi_foundation_core::DonationPolicy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower_sessions::Session;

use crate::cart::{CART_STORAGE_KEY, CartStore, MemoryStorage};
use crate::checkout::CheckoutSession;
use crate::render::PanelState;

/// Session keys.
pub mod keys {
    /// Persisted cart blob.
    pub const CART: &str = crate::cart::CART_STORAGE_KEY;

    /// Panel visibility, layout and focus.
    pub const PANEL: &str = "cart_panel";

    /// Open checkout, if any.
    pub const CHECKOUT: &str = "checkout_session";
}

/// Everything the storefront keeps for one visitor.
#[derive(Debug)]
pub struct Visit {
    pub cart: CartStore,
    pub panel: PanelState,
    pub checkout: Option<CheckoutSession>,
}

async fn get_or_default<T: DeserializeOwned>(session: &Session, key: &str) -> Option<T> {
    match session.get::<T>(key).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable session entry");
            None
        }
    }
}

async fn put<T: Serialize>(
    session: &Session,
    key: &str,
    value: Option<&T>,
) -> Result<(), tower_sessions::session::Error> {
    match value {
        Some(value) => session.insert(key, value).await,
        None => session.remove_value(key).await.map(|_| ()),
    }
}

impl Visit {
    /// Load the visitor's state.
    pub async fn load(session: &Session, policy: DonationPolicy) -> Self {
        let blob: Option<String> = get_or_default(session, keys::CART).await;
        let storage = blob.map_or_else(MemoryStorage::new, |blob| {
            MemoryStorage::with_entry(CART_STORAGE_KEY, blob)
        });

        let mut cart = CartStore::load(Box::new(storage), policy);
        let panel: PanelState = get_or_default(session, keys::PANEL).await.unwrap_or_default();
        cart.set_open(panel.is_open);

        Self {
            cart,
            panel,
            checkout: get_or_default::<CheckoutSession>(session, keys::CHECKOUT)
                .await
                .filter(CheckoutSession::is_open),
        }
    }

    /// Write the state back.
    ///
    /// # Errors
    ///
    /// Returns error if the session store rejects the write.
    pub async fn save(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        put(session, keys::CART, self.cart.persisted_blob().as_ref()).await?;
        put(session, keys::PANEL, Some(&self.panel)).await?;
        put(session, keys::CHECKOUT, self.checkout.as_ref()).await
    }

    /// Write the state back and flush it to the store immediately, so
    /// concurrent requests see it before this one finishes.
    ///
    /// # Errors
    ///
    /// Returns error if the session store rejects the write.
    pub async fn flush(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        self.save(session).await?;
        session.save().await
    }

    /// Drop the checkout when the cart it was opened for changes.
    pub fn cancel_checkout(&mut self) {
        if let Some(mut checkout) = self.checkout.take() {
            checkout.cancel();
            tracing::debug!(reference = %checkout.reference(), "Checkout cancelled by cart change");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;
    use crate::cart::ProductRef;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let session = session();
        let mut visit = Visit::load(&session, DonationPolicy::default()).await;
        assert!(visit.cart.is_empty());

        visit.cart.add_item(&ProductRef::new("tote").with_title("Tote"), None, 2);
        visit.panel.open();
        visit.save(&session).await.unwrap();

        let visit = Visit::load(&session, DonationPolicy::default()).await;
        assert_eq!(visit.cart.item_count(), 2);
        assert!(visit.panel.is_open);
        assert!(visit.checkout.is_none());

        let blob: String = session.get(keys::CART).await.unwrap().unwrap();
        assert!(blob.contains("\"tote\""));
    }

    #[tokio::test]
    async fn test_corrupt_cart_loads_empty() {
        let session = session();
        session.insert(keys::CART, "{not json").await.unwrap();
        session.insert(keys::PANEL, 42).await.unwrap();

        let visit = Visit::load(&session, DonationPolicy::default()).await;
        assert!(visit.cart.is_empty());
        assert!(!visit.panel.is_open);
    }
}
