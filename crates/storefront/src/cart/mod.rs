//! Donation cart store.
//!
//! `CartStore` owns the authoritative list of line items for one browser
//! session. Each line carries a pay-what-you-want donation per unit instead of
//! a fixed price. The store is synchronous: request handlers load it from the
//! session, apply one operation, and write the blob back.
//!
//! Every mutation runs the same sequence:
//! 1. apply the change
//! 2. recompute `item_count` and `donation_total`
//! 3. persist the full state
//! 4. emit the mutation's own event, then `cartUpdated`
//!
//! Donation entry is lenient ([`CartStore::set_donation`] never rejects).
//! Amounts are only enforced by [`CartStore::validate`] at checkout.

pub mod events;
pub mod storage;

use std::fmt;

use chrono::{DateTime, Utc};
use gi_foundation_core::{
    DonationPolicy, ProductId, normalize_amount, parse_donation_input, validate_donation,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use events::{CartEvent, CartListener, EventBus, SubscriptionId};
pub use storage::{CART_STORAGE_KEY, CartStorage, FileStorage, MemoryStorage, StorageError};

/// Title used when a product reference has none.
pub const DEFAULT_TITLE: &str = "Untitled Product";

/// Image used when a product reference has none.
pub const DEFAULT_IMAGE: &str = "/images/placeholder.jpg";

// =============================================================================
// Types
// =============================================================================

/// Product data snapshotted into the cart on add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ProductRef {
    #[must_use]
    pub fn new(id: impl Into<ProductId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// A cart line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: ProductId,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_image")]
    pub image: String,
    /// `None` until the donor enters a usable amount.
    #[serde(default)]
    pub donation_per_unit: Option<Decimal>,
    /// Read leniently from stored blobs: fractions are truncated, numeric
    /// strings are accepted and anything unusable becomes 1.
    #[serde(default = "default_quantity", deserialize_with = "lenient_quantity")]
    pub quantity: u32,
}

impl CartItem {
    fn from_product(product: &ProductRef, donation_per_unit: Option<Decimal>, quantity: u32) -> Self {
        Self {
            id: product.id.clone(),
            title: non_blank(product.title.as_deref()).unwrap_or(DEFAULT_TITLE).to_string(),
            description: non_blank(product.description.as_deref())
                .unwrap_or_default()
                .to_string(),
            image: non_blank(product.image.as_deref()).unwrap_or(DEFAULT_IMAGE).to_string(),
            donation_per_unit,
            quantity,
        }
    }

    /// `donation_per_unit * quantity`, or zero when no donation is set.
    /// Saturates at `Decimal::MAX` instead of overflowing.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.donation_per_unit.map_or(Decimal::ZERO, |amount| {
            amount
                .checked_mul(Decimal::from(self.quantity))
                .unwrap_or(Decimal::MAX)
        })
    }
}

/// The persisted cart blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default)]
    pub donation_total: Decimal,
    /// UI visibility flag. Always `false` after load.
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A line item with its derived total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub line_total: Decimal,
}

/// Point-in-time view of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub item_count: u32,
    pub donation_total: Decimal,
    pub items: Vec<CartLine>,
}

/// A line item whose donation does not pass validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub id: ProductId,
    pub title: String,
    pub message: String,
}

impl ItemError {
    /// DOM id of the donation input for this item.
    #[must_use]
    pub fn focus_target(&self) -> String {
        format!("donation-{}", self.id)
    }
}

/// Result of [`CartStore::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartValidation {
    /// True only when the cart is non-empty and every item passes.
    pub is_valid: bool,
    pub is_empty: bool,
    pub errors: Vec<ItemError>,
    pub minimum: Decimal,
    pub donation_total: Decimal,
}

impl CartValidation {
    #[must_use]
    pub fn first_error(&self) -> Option<&ItemError> {
        self.errors.first()
    }

    /// Error message for one item, if that item failed.
    #[must_use]
    pub fn error_for(&self, id: &ProductId) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| &error.id == id)
            .map(|error| error.message.as_str())
    }
}

// =============================================================================
// Store
// =============================================================================

/// The cart for one session.
pub struct CartStore {
    state: CartState,
    storage: Box<dyn CartStorage>,
    policy: DonationPolicy,
    bus: EventBus,
}

impl fmt::Debug for CartStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Load the cart from `storage`.
    ///
    /// A missing, unreadable or corrupt blob yields an empty cart. Failures are
    /// logged and never returned.
    #[must_use]
    pub fn load(storage: Box<dyn CartStorage>, policy: DonationPolicy) -> Self {
        let state = match storage.read(CART_STORAGE_KEY) {
            Ok(Some(blob)) => parse_state(&blob),
            Ok(None) => CartState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted cart, starting empty");
                CartState::default()
            }
        };

        let mut store = Self {
            state,
            storage,
            policy,
            bus: EventBus::default(),
        };
        store.state.is_open = false;
        store.recompute();
        store
    }

    /// Add `quantity` units of a product.
    ///
    /// Repeated adds of the same id accumulate quantity. The stored donation is
    /// only overwritten when `donation_per_unit` normalizes to an amount.
    /// Quantities below 1 are treated as 1. Returns `false` if the product has
    /// no id.
    pub fn add_item(
        &mut self,
        product: &ProductRef,
        donation_per_unit: Option<Decimal>,
        quantity: i64,
    ) -> bool {
        if product.id.is_empty() {
            tracing::warn!("Ignoring add_item for a product without an id");
            return false;
        }

        let quantity = clamp_quantity(quantity);
        let donation = donation_per_unit.and_then(normalize_amount);

        match self.find_mut(product.id.as_str()) {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(quantity);
                if donation.is_some() {
                    item.donation_per_unit = donation;
                }
            }
            None => self
                .state
                .items
                .push(CartItem::from_product(product, donation, quantity)),
        }

        self.commit(CartEvent::ItemAdded {
            product: product.clone(),
        });
        true
    }

    /// Remove an item. Returns `false` if it is not in the cart.
    pub fn remove_item(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let removed = self.state.items.remove(index);
        self.commit(CartEvent::ItemRemoved {
            product_id: removed.id,
        });
        true
    }

    /// Set an item's quantity. Zero or less removes the item.
    ///
    /// Returns `false` if the item is not in the cart.
    pub fn set_quantity(&mut self, id: &str, quantity: i64) -> bool {
        if quantity <= 0 {
            return self.remove_item(id);
        }
        let quantity = clamp_quantity(quantity);
        let Some(item) = self.find_mut(id) else {
            return false;
        };
        item.quantity = quantity;
        let product_id = item.id.clone();
        self.commit(CartEvent::QuantityUpdated {
            product_id,
            quantity,
        });
        true
    }

    /// Set an item's donation from raw text input.
    ///
    /// Unusable input clears the donation rather than being rejected. Returns
    /// `false` if the item is not in the cart.
    pub fn set_donation(&mut self, id: &str, raw: &str) -> bool {
        self.set_donation_amount(id, parse_donation_input(raw))
    }

    /// Set an item's donation from an already-parsed amount.
    pub fn set_donation_amount(&mut self, id: &str, amount: Option<Decimal>) -> bool {
        let donation = amount.and_then(normalize_amount);
        let Some(item) = self.find_mut(id) else {
            return false;
        };
        item.donation_per_unit = donation;
        let product_id = item.id.clone();
        self.commit(CartEvent::ItemDonationUpdated {
            product_id,
            donation,
        });
        true
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.state.items.clear();
        self.commit(CartEvent::CartCleared);
    }

    /// Snapshot of the cart with per-line totals.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            item_count: self.state.item_count,
            donation_total: self.state.donation_total,
            items: self
                .state
                .items
                .iter()
                .map(|item| CartLine {
                    item: item.clone(),
                    line_total: item.line_total(),
                })
                .collect(),
        }
    }

    /// Check every item's donation against the policy minimum.
    #[must_use]
    pub fn validate(&self) -> CartValidation {
        let errors: Vec<ItemError> = self
            .state
            .items
            .iter()
            .filter_map(|item| {
                let result = validate_donation(item.donation_per_unit, &self.policy);
                (!result.is_valid).then(|| ItemError {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    message: result.message,
                })
            })
            .collect();
        let is_empty = self.state.items.is_empty();

        CartValidation {
            is_valid: !is_empty && errors.is_empty(),
            is_empty,
            errors,
            minimum: self.policy.minimum,
            donation_total: self.state.donation_total,
        }
    }

    pub fn subscribe(&mut self, listener: impl CartListener + 'static) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Set the UI visibility flag. Not a mutation: nothing is persisted or emitted.
    pub const fn set_open(&mut self, open: bool) {
        self.state.is_open = open;
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.state.is_open
    }

    #[must_use]
    pub const fn state(&self) -> &CartState {
        &self.state
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.state.items
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<&CartItem> {
        self.state.items.iter().find(|item| item.id.as_str() == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    #[must_use]
    pub const fn item_count(&self) -> u32 {
        self.state.item_count
    }

    #[must_use]
    pub const fn donation_total(&self) -> Decimal {
        self.state.donation_total
    }

    #[must_use]
    pub const fn policy(&self) -> &DonationPolicy {
        &self.policy
    }

    /// The blob currently held by the storage backend.
    #[must_use]
    pub fn persisted_blob(&self) -> Option<String> {
        match self.storage.read(CART_STORAGE_KEY) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read back persisted cart");
                None
            }
        }
    }

    /// Release the storage backend.
    #[must_use]
    pub fn into_storage(self) -> Box<dyn CartStorage> {
        self.storage
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.state.items.iter().position(|item| item.id.as_str() == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut CartItem> {
        self.state.items.iter_mut().find(|item| item.id.as_str() == id)
    }

    fn commit(&mut self, event: CartEvent) {
        self.recompute();
        self.persist();
        let summary = self.summary();
        self.bus.emit(&event, &summary);
        self.bus.emit(&CartEvent::CartUpdated, &summary);
    }

    fn recompute(&mut self) {
        self.state.item_count = self
            .state
            .items
            .iter()
            .fold(0u32, |count, item| count.saturating_add(item.quantity));
        self.state.donation_total = self
            .state
            .items
            .iter()
            .map(CartItem::line_total)
            .fold(Decimal::ZERO, |total, line| {
                total.checked_add(line).unwrap_or(Decimal::MAX)
            });
    }

    fn persist(&mut self) {
        self.state.last_updated = Some(Utc::now());
        let blob = match serde_json::to_string(&self.state) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize cart");
                return;
            }
        };
        if let Err(e) = self.storage.write(CART_STORAGE_KEY, &blob) {
            tracing::warn!(error = %e, "Failed to persist cart");
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_state(blob: &str) -> CartState {
    match serde_json::from_str::<CartState>(blob) {
        Ok(state) => sanitize(state),
        Err(e) => {
            tracing::warn!(error = %e, "Corrupt cart blob, starting empty");
            CartState::default()
        }
    }
}

/// Drop id-less items, merge duplicate ids and re-normalize amounts.
fn sanitize(mut state: CartState) -> CartState {
    let mut items: Vec<CartItem> = Vec::with_capacity(state.items.len());
    for mut item in state.items.drain(..) {
        if item.id.is_empty() {
            continue;
        }
        item.quantity = item.quantity.max(1);
        item.donation_per_unit = item.donation_per_unit.and_then(normalize_amount);
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => items.push(item),
        }
    }
    state.items = items;
    state
}

/// Stored quantity as whatever JSON shape it was written in.
fn lenient_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let whole = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64).and_then(|d| d.trunc().to_i64())),
        Value::String(s) => leading_integer(&s),
        _ => None,
    };
    Ok(whole.map_or(1, clamp_quantity))
}

/// Integer at the start of `s` (`"3 units"` is 3), if any.
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let sign = usize::from(s.starts_with(['-', '+']));
    let digits = s
        .get(sign..)?
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    match s.get(..sign + digits)?.parse::<i64>() {
        Ok(n) => Some(n),
        // Too many digits for i64: treat as the largest quantity.
        Err(_) => Some(if s.starts_with('-') { i64::MIN } else { i64::MAX }),
    }
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity.max(1)).unwrap_or(u32::MAX)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

const fn default_quantity() -> u32 {
    1
}
