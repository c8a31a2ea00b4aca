//! Cart change notifications.
//!
//! Every mutation on [`CartStore`](super::CartStore) emits its own event
//! followed by [`CartEvent::CartUpdated`]. Listeners receive the event together
//! with a fresh [`CartSummary`] snapshot.

use std::fmt;

use gi_foundation_core::ProductId;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use super::{CartSummary, ProductRef};

/// A cart change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// Emitted after every mutation, after the mutation's own event.
    CartUpdated,
    ItemAdded {
        product: ProductRef,
    },
    ItemRemoved {
        product_id: ProductId,
    },
    QuantityUpdated {
        product_id: ProductId,
        quantity: u32,
    },
    ItemDonationUpdated {
        product_id: ProductId,
        donation: Option<Decimal>,
    },
    CartCleared,
}

impl CartEvent {
    /// Event name as exposed to host pages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CartUpdated => "cartUpdated",
            Self::ItemAdded { .. } => "itemAdded",
            Self::ItemRemoved { .. } => "itemRemoved",
            Self::QuantityUpdated { .. } => "quantityUpdated",
            Self::ItemDonationUpdated { .. } => "itemDonationUpdated",
            Self::CartCleared => "cartCleared",
        }
    }

    /// Event detail: the event payload plus the cart snapshot under `cart`.
    #[must_use]
    pub fn detail(&self, cart: &CartSummary) -> Value {
        let cart = serde_json::to_value(cart).unwrap_or_default();
        match self {
            Self::CartUpdated | Self::CartCleared => json!({ "cart": cart }),
            Self::ItemAdded { product } => json!({ "product": product, "cart": cart }),
            Self::ItemRemoved { product_id } => json!({ "productId": product_id, "cart": cart }),
            Self::QuantityUpdated {
                product_id,
                quantity,
            } => json!({ "productId": product_id, "quantity": quantity, "cart": cart }),
            Self::ItemDonationUpdated {
                product_id,
                donation,
            } => json!({ "productId": product_id, "donation": donation, "cart": cart }),
        }
    }
}

/// Receives cart events.
///
/// Implemented for any `FnMut(&CartEvent, &CartSummary)` closure.
pub trait CartListener: Send + Sync {
    fn on_cart_event(&mut self, event: &CartEvent, cart: &CartSummary);
}

impl<F> CartListener for F
where
    F: FnMut(&CartEvent, &CartSummary) + Send + Sync,
{
    fn on_cart_event(&mut self, event: &CartEvent, cart: &CartSummary) {
        self(event, cart);
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Ordered listener list owned by one store.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Box<dyn CartListener>)>,
}

impl EventBus {
    pub fn subscribe(&mut self, listener: impl CartListener + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if the id is unknown or already removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver an event to every listener in subscription order.
    pub fn emit(&mut self, event: &CartEvent, cart: &CartSummary) {
        tracing::debug!(event = event.name(), listeners = self.listeners.len(), "cart event");
        for (_, listener) in &mut self.listeners {
            listener.on_cart_event(event, cart);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn empty_summary() -> CartSummary {
        CartSummary {
            item_count: 0,
            donation_total: Decimal::ZERO,
            items: Vec::new(),
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut bus = EventBus::default();
        let (tx, rx) = mpsc::channel();
        let id = bus.subscribe(move |event: &CartEvent, _: &CartSummary| {
            tx.send(event.name()).unwrap();
        });

        bus.emit(&CartEvent::CartCleared, &empty_summary());
        assert_eq!(rx.try_recv().unwrap(), "cartCleared");

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(bus.is_empty());

        bus.emit(&CartEvent::CartUpdated, &empty_summary());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ids_are_distinct() {
        let mut bus = EventBus::default();
        let a = bus.subscribe(|_: &CartEvent, _: &CartSummary| {});
        let b = bus.subscribe(|_: &CartEvent, _: &CartSummary| {});
        assert_ne!(a, b);
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_detail_carries_payload_and_cart() {
        let event = CartEvent::QuantityUpdated {
            product_id: ProductId::new("tote"),
            quantity: 3,
        };
        let detail = event.detail(&empty_summary());
        assert_eq!(detail["productId"], "tote");
        assert_eq!(detail["quantity"], 3);
        assert_eq!(detail["cart"]["itemCount"], 0);
    }
}
