//! Cart panel rendering.
//!
//! One cart state is projected into two mounts: the desktop sidebar and the
//! mobile overlay. Only the surface matching the current [`LayoutMode`] is
//! open. Both are rendered from the same template so a mutation response can
//! replace them together with out-of-band swaps.
//!
//! Panel UI state ([`PanelState`]) lives in the session next to the cart blob
//! but is never part of it. Events fired by the store during a request are
//! collected with a [`RenderQueue`] and become the toast and the
//! `HX-Trigger` header.

pub mod views;

use std::sync::mpsc::{self, Receiver};

use askama::Template;
use askama_web::WebTemplate;
use gi_foundation_core::{ProductId, format_usd};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cart::{CartEvent, CartStore, CartSummary, DEFAULT_TITLE, SubscriptionId};
use crate::checkout::CheckoutSession;

pub use views::{
    CartItemView, CartView, CheckoutView, FieldView, MethodOption, MethodPanelView,
    PaymentInstructions, ReceiptView, SurfaceView, TotalsView,
};

/// Viewports at or below this width use the mobile overlay.
pub const MOBILE_BREAKPOINT_PX: u32 = 768;

/// Which cart surface is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Desktop,
    Mobile,
}

impl LayoutMode {
    pub const ALL: [Self; 2] = [Self::Desktop, Self::Mobile];

    #[must_use]
    pub const fn for_viewport(width: u32) -> Self {
        if width <= MOBILE_BREAKPOINT_PX {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }

    /// Element id of the surface container.
    #[must_use]
    pub const fn dom_id(self) -> &'static str {
        match self {
            Self::Desktop => "cart-sidebar",
            Self::Mobile => "cart-overlay",
        }
    }

    /// BEM block used for the surface's CSS classes.
    #[must_use]
    pub const fn css_block(self) -> &'static str {
        match self {
            Self::Desktop => "cart-sidebar",
            Self::Mobile => "cart-overlay",
        }
    }
}

/// The donation input the donor is typing in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub item_id: ProductId,
    pub caret: u32,
    /// Text exactly as typed, which may not parse yet (`"12."`).
    pub raw_value: String,
}

/// Outcome of a viewport width report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutChange {
    Unchanged,
    Switched {
        from: LayoutMode,
        to: LayoutMode,
        /// The panel was open and moved to the new surface.
        reopened: bool,
    },
}

/// Session-stored cart panel UI state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelState {
    pub is_open: bool,
    pub layout: LayoutMode,
    pub focus: Option<FocusState>,
    /// Swallows the next outside-click/Escape close. Set when the panel
    /// content is swapped for checkout, since the click that triggered the
    /// swap lands on an element that no longer exists.
    pub suppress_next_close: bool,
    /// Show "enter a donation amount" on items that have none yet.
    pub show_item_errors: bool,
}

impl PanelState {
    pub const fn open(&mut self) {
        self.is_open = true;
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.focus = None;
        self.suppress_next_close = false;
    }

    /// Returns the new open flag.
    pub fn toggle(&mut self) -> bool {
        if self.is_open {
            self.close();
        } else {
            self.open();
        }
        self.is_open
    }

    pub fn resize(&mut self, width: u32) -> LayoutChange {
        let to = LayoutMode::for_viewport(width);
        if to == self.layout {
            return LayoutChange::Unchanged;
        }
        let from = self.layout;
        let reopened = self.is_open;
        // The old surface's inputs are gone; a focused input can't survive.
        self.close();
        self.layout = to;
        if reopened {
            self.open();
        }
        LayoutChange::Switched { from, to, reopened }
    }

    /// Outside click or Escape. Returns whether the panel closed.
    pub fn dismiss(&mut self) -> bool {
        if self.suppress_next_close {
            self.suppress_next_close = false;
            return false;
        }
        if !self.is_open {
            return false;
        }
        self.close();
        true
    }

    pub fn outside_click(&mut self) -> bool {
        self.dismiss()
    }

    pub fn escape(&mut self) -> bool {
        self.dismiss()
    }

    /// Checkout replaced the panel content.
    pub fn show_checkout(&mut self) {
        self.is_open = true;
        self.focus = None;
        self.suppress_next_close = true;
        self.show_item_errors = false;
    }

    pub fn set_focus(&mut self, item_id: ProductId, raw_value: impl Into<String>, caret: u32) {
        self.focus = Some(FocusState {
            item_id,
            caret,
            raw_value: raw_value.into(),
        });
    }

    pub fn clear_focus(&mut self) {
        self.focus = None;
    }
}

// =============================================================================
// Event collection
// =============================================================================

/// A cart event observed during the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredEvent {
    pub event: CartEvent,
    pub detail: Value,
}

impl FiredEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.event.name()
    }
}

/// Listener that records the events a request fires.
#[derive(Debug)]
pub struct RenderQueue {
    subscription: SubscriptionId,
    receiver: Receiver<FiredEvent>,
}

impl RenderQueue {
    /// Subscribe to `cart`. Call [`Self::detach`] after mutating.
    pub fn attach(cart: &mut CartStore) -> Self {
        let (sender, receiver) = mpsc::channel();
        let subscription = cart.subscribe(move |event: &CartEvent, summary: &CartSummary| {
            // The receiver is dropped only after unsubscribing.
            let _ = sender.send(FiredEvent {
                event: event.clone(),
                detail: event.detail(summary),
            });
        });
        Self {
            subscription,
            receiver,
        }
    }

    /// Unsubscribe and return the events in firing order.
    pub fn detach(self, cart: &mut CartStore) -> Vec<FiredEvent> {
        cart.unsubscribe(self.subscription);
        self.receiver.try_iter().collect()
    }
}

/// `HX-Trigger` header value: a JSON object keyed by event name.
///
/// Repeated names keep the last detail, which carries the newest snapshot.
#[must_use]
pub fn hx_trigger(events: &[FiredEvent]) -> Option<String> {
    if events.is_empty() {
        return None;
    }
    serde_json::to_string(&Value::Object(trigger_map(events))).ok()
}

/// Event name to detail, for callers that add their own triggers.
#[must_use]
pub fn trigger_map(events: &[FiredEvent]) -> Map<String, Value> {
    events
        .iter()
        .map(|fired| (fired.name().to_string(), fired.detail.clone()))
        .collect()
}

/// Toast text for the last item added during the request.
#[must_use]
pub fn toast_for(events: &[FiredEvent]) -> Option<String> {
    events.iter().rev().find_map(|fired| match &fired.event {
        CartEvent::ItemAdded { product } => {
            let title = product
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE);
            Some(format!("{title} added to cart"))
        }
        _ => None,
    })
}

/// Header badge text.
#[must_use]
pub fn badge_label(count: u32) -> String {
    match count {
        0 => String::new(),
        1..=99 => count.to_string(),
        _ => "99+".to_string(),
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Everything the cart templates need for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCart {
    pub view: CartView,
    pub surfaces: Vec<SurfaceView>,
    pub checkout: Option<CheckoutView>,
    pub is_open: bool,
    pub toast: Option<String>,
    /// Value for the `HX-Trigger` header.
    pub trigger: Option<String>,
}

/// Builds [`RenderedCart`] values. Read-only with respect to the cart.
#[derive(Debug, Clone, Default)]
pub struct CartRenderer {
    instructions: PaymentInstructions,
}

impl CartRenderer {
    #[must_use]
    pub const fn new(instructions: PaymentInstructions) -> Self {
        Self { instructions }
    }

    #[must_use]
    pub const fn instructions(&self) -> &PaymentInstructions {
        &self.instructions
    }

    #[must_use]
    pub fn render(
        &self,
        cart: &CartStore,
        checkout: Option<&CheckoutSession>,
        panel: &PanelState,
        events: &[FiredEvent],
    ) -> RenderedCart {
        let validation = cart.validate();
        let items = cart
            .items()
            .iter()
            .map(|item| {
                CartItemView::new(
                    item,
                    &validation,
                    panel.focus.as_ref(),
                    panel.show_item_errors,
                    cart.policy(),
                )
            })
            .collect();

        let view = CartView {
            items,
            item_count: cart.item_count(),
            badge: badge_label(cart.item_count()),
            donation_total: format_usd(cart.donation_total()),
            minimum_label: cart.policy().minimum_label(),
            checkout_enabled: validation.is_valid,
            is_empty: cart.is_empty(),
        };

        let checkout = checkout
            .filter(|session| session.is_open())
            .map(|session| CheckoutView::new(session, self.totals(cart, session), &self.instructions));

        let surfaces = LayoutMode::ALL
            .into_iter()
            .map(|layout| SurfaceView::new(layout, panel.layout, panel.is_open, checkout.is_some()))
            .collect();

        RenderedCart {
            view,
            surfaces,
            checkout,
            is_open: panel.is_open,
            toast: toast_for(events),
            trigger: hx_trigger(events),
        }
    }

    /// Checkout totals, with a tax line once the state code is valid.
    #[must_use]
    pub fn totals(&self, cart: &CartStore, session: &CheckoutSession) -> TotalsView {
        let subtotal = cart.donation_total();
        TotalsView {
            donation_total: format_usd(subtotal),
            tax: session.estimated_tax(subtotal).map(format_usd),
            tax_state: session.contact().state.clone(),
        }
    }

    /// Payment instructions for the session's selected method.
    #[must_use]
    pub fn method_panel(&self, cart: &CartStore, session: &CheckoutSession) -> MethodPanelView {
        MethodPanelView::new(
            session.selected_method(),
            session.reference(),
            format_usd(cart.donation_total()),
            &self.instructions,
        )
    }
}

/// Both cart surfaces, the badge and the toast as out-of-band fragments.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_panel.html")]
pub struct CartPanelTemplate {
    pub panel: RenderedCart,
}

/// Fragments a donation keystroke can change, leaving the input being typed
/// into alone.
#[derive(Template, WebTemplate)]
#[template(path = "partials/donation_update.html")]
pub struct DonationUpdateTemplate {
    pub panel: RenderedCart,
    pub item_id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use gi_foundation_core::{ContactField, DonationPolicy};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::cart::{MemoryStorage, ProductRef};

    fn cart() -> CartStore {
        CartStore::load(Box::new(MemoryStorage::new()), DonationPolicy::default())
    }

    #[test]
    fn test_breakpoint() {
        assert_eq!(LayoutMode::for_viewport(320), LayoutMode::Mobile);
        assert_eq!(LayoutMode::for_viewport(768), LayoutMode::Mobile);
        assert_eq!(LayoutMode::for_viewport(769), LayoutMode::Desktop);
    }

    #[test]
    fn test_badge_label() {
        assert_eq!(badge_label(0), "");
        assert_eq!(badge_label(7), "7");
        assert_eq!(badge_label(99), "99");
        assert_eq!(badge_label(100), "99+");
    }

    #[test]
    fn test_toggle() {
        let mut panel = PanelState::default();
        assert!(panel.toggle());
        assert!(!panel.toggle());
        assert!(!panel.is_open);
    }

    #[test]
    fn test_resize_reopens_on_new_surface() {
        let mut panel = PanelState::default();
        panel.open();
        panel.set_focus(ProductId::from("A"), "12", 2);

        let change = panel.resize(400);
        assert_eq!(
            change,
            LayoutChange::Switched {
                from: LayoutMode::Desktop,
                to: LayoutMode::Mobile,
                reopened: true,
            }
        );
        assert!(panel.is_open);
        assert_eq!(panel.layout, LayoutMode::Mobile);
        assert!(panel.focus.is_none());

        assert_eq!(panel.resize(500), LayoutChange::Unchanged);
    }

    #[test]
    fn test_resize_while_closed_stays_closed() {
        let mut panel = PanelState::default();
        let change = panel.resize(600);
        assert!(matches!(change, LayoutChange::Switched { reopened: false, .. }));
        assert!(!panel.is_open);
    }

    #[test]
    fn test_suppression_consumes_one_close() {
        let mut panel = PanelState::default();
        panel.show_checkout();

        assert!(!panel.outside_click());
        assert!(panel.is_open);
        assert!(panel.escape());
        assert!(!panel.is_open);
        assert!(!panel.dismiss());
    }

    #[test]
    fn test_render_queue_collects_events() {
        let mut cart = cart();
        let queue = RenderQueue::attach(&mut cart);
        cart.add_item(&ProductRef::new("A").with_title("Journal"), None, 1);
        let events = queue.detach(&mut cart);

        let names: Vec<_> = events.iter().map(FiredEvent::name).collect();
        assert_eq!(names, ["itemAdded", "cartUpdated"]);
        assert_eq!(toast_for(&events).as_deref(), Some("Journal added to cart"));

        let trigger: Value = serde_json::from_str(&hx_trigger(&events).unwrap()).unwrap();
        assert_eq!(trigger["itemAdded"]["product"]["id"], "A");
        assert_eq!(trigger["cartUpdated"]["cart"]["itemCount"], 1);

        // Detached: later mutations are not collected.
        cart.clear();
        assert!(hx_trigger(&[]).is_none());
    }

    #[test]
    fn test_render_surfaces() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A"), None, 1);
        let mut panel = PanelState::default();
        panel.open();

        let rendered = CartRenderer::default().render(&cart, None, &panel, &[]);
        let [desktop, mobile] = rendered.surfaces.as_slice() else {
            panic!("expected two surfaces");
        };
        assert!(desktop.is_open);
        assert!(!mobile.is_open);
        assert_eq!(desktop.donation_input_id("A"), "donation-A");
        assert_eq!(mobile.donation_input_id("A"), "mobile-donation-A");
        assert_eq!(rendered.view.badge, "1");
        assert!(!rendered.view.checkout_enabled);
        assert!(rendered.toast.is_none());
    }

    #[test]
    fn test_missing_donation_error_shown_after_blocked_checkout() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A"), None, 1);
        cart.add_item(&ProductRef::new("B"), None, 1);
        cart.set_donation("B", "5");
        let mut panel = PanelState::default();
        let renderer = CartRenderer::default();

        let rendered = renderer.render(&cart, None, &panel, &[]);
        assert_eq!(rendered.view.items[0].error, None);
        assert_eq!(
            rendered.view.items[1].error.as_deref(),
            Some("Minimum donation is $10")
        );

        panel.show_item_errors = true;
        let rendered = renderer.render(&cart, None, &panel, &[]);
        assert_eq!(
            rendered.view.items[0].error.as_deref(),
            Some("Enter a donation amount")
        );
    }

    #[test]
    fn test_focus_preserves_raw_value() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A"), None, 1);
        cart.add_item(&ProductRef::new("B"), None, 1);
        cart.set_donation("A", "12.");
        cart.set_donation("B", "20");
        let mut panel = PanelState::default();
        panel.set_focus(ProductId::from("A"), "12.", 3);

        // B's quantity changes while A is being edited.
        cart.set_quantity("B", 2);
        let rendered = CartRenderer::default().render(&cart, None, &panel, &[]);
        let a = &rendered.view.items[0];
        let b = &rendered.view.items[1];
        assert_eq!(a.donation_input, "12.");
        assert!(a.has_focus);
        assert_eq!(a.caret, 3);
        assert_eq!(b.donation_input, "20.00");
        assert!(!b.has_focus);
        assert_eq!(b.line_total, "$40.00");
    }

    #[test]
    fn test_checkout_rendered_on_active_surface_with_tax() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A"), None, 1);
        cart.set_donation("A", "100");
        let mut rng = StdRng::seed_from_u64(3);
        let mut session = CheckoutSession::open(&cart, Utc::now(), &mut rng).unwrap();
        let mut panel = PanelState::default();
        panel.resize(400);
        panel.show_checkout();
        let renderer = CartRenderer::default();

        let rendered = renderer.render(&cart, Some(&session), &panel, &[]);
        let checkout = rendered.checkout.as_ref().unwrap();
        assert_eq!(checkout.totals.tax, None);
        assert!(rendered.surfaces.iter().any(|s| s.show_checkout && s.layout == LayoutMode::Mobile));
        assert!(!rendered.surfaces.iter().any(|s| s.show_checkout && s.layout == LayoutMode::Desktop));

        session.update_field(ContactField::State, "ca");
        let rendered = renderer.render(&cart, Some(&session), &panel, &[]);
        let totals = &rendered.checkout.as_ref().unwrap().totals;
        assert_eq!(totals.tax.as_deref(), Some("$8.25"));
        assert_eq!(totals.donation_total, "$100.00");

        session.cancel();
        let rendered = renderer.render(&cart, Some(&session), &panel, &[]);
        assert!(rendered.checkout.is_none());
    }

    #[test]
    fn test_panel_template_renders_both_surfaces() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A").with_title("Journal"), None, 1);
        let mut panel = PanelState::default();
        panel.open();

        let rendered = CartRenderer::default().render(&cart, None, &panel, &[]);
        let html = CartPanelTemplate { panel: rendered }.render().unwrap();
        assert!(html.contains(r#"id="cart-sidebar""#));
        assert!(html.contains(r#"id="cart-overlay""#));
        assert!(html.contains(r#"id="donation-A""#));
        assert!(html.contains(r#"id="mobile-donation-A""#));
        assert!(html.contains("cart-sidebar--open"));
        assert!(!html.contains("cart-overlay--open"));
    }

    #[test]
    fn test_typed_amount_above_maximum_is_explained() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A"), None, 1);
        let raw = "79228162514264337593543950335";
        cart.set_donation("A", raw);
        let mut panel = PanelState::default();
        let renderer = CartRenderer::default();

        panel.set_focus(ProductId::from("A"), raw, 29);
        let rendered = renderer.render(&cart, None, &panel, &[]);
        let a = &rendered.view.items[0];
        assert_eq!(a.error.as_deref(), Some("Maximum donation is $1,000,000"));
        assert_eq!(a.line_total, "$0.00");
        assert!(!rendered.view.checkout_enabled);

        panel.set_focus(ProductId::from("A"), "12", 2);
        let rendered = renderer.render(&cart, None, &panel, &[]);
        assert_eq!(rendered.view.items[0].error, None);
    }

    #[test]
    fn test_quantity_stepper_at_ceiling() {
        let mut cart = cart();
        cart.add_item(&ProductRef::new("A"), None, i64::MAX);
        cart.add_item(&ProductRef::new("B"), None, 1);

        let rendered = CartRenderer::default().render(&cart, None, &PanelState::default(), &[]);
        let a = &rendered.view.items[0];
        assert_eq!(a.quantity, u32::MAX);
        assert_eq!(a.quantity_up, u32::MAX);
        assert_eq!(a.quantity_down, u32::MAX - 1);
        assert_eq!(rendered.view.items[1].quantity_down, 0);
        assert_eq!(rendered.view.items[1].quantity_up, 2);

        let html = CartPanelTemplate { panel: rendered }.render().unwrap();
        assert_eq!(html.matches("disabled aria-label=\"Increase quantity\"").count(), 2);
    }
}
