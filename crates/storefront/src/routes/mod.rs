//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Home page (featured products)
//! GET  /health                    - Health check
//!
//! # Products
//! GET  /products                  - Catalog listing
//! GET  /products/{slug}           - Product detail with related products
//!
//! # Cart (HTMX, out-of-band fragments)
//! GET  /cart                      - Cart page (closes the panel)
//! GET  /cart/panel                - Both cart surfaces
//! POST /cart/add                  - Add item
//! POST /cart/quantity             - Set quantity (0 removes)
//! POST /cart/donation             - Set per-item donation
//! POST /cart/remove               - Remove item
//! POST /cart/clear                - Remove every item
//! POST /cart/toggle               - Open/close the panel
//! POST /cart/close                - Close the panel
//! POST /cart/dismiss              - Outside click / Escape
//! POST /cart/layout               - Viewport width report
//! GET  /cart/count                - Badge fragment
//!
//! # Checkout
//! POST /checkout/open             - Open checkout in the panel
//! POST /checkout/cancel           - Back to the cart
//! POST /checkout/field            - Field input
//! POST /checkout/blur             - Field lost focus
//! POST /checkout/method           - Select payment method
//! POST /checkout/validate         - Gate before card tokenization (JSON)
//! POST /checkout/pay              - Charge a card token
//! POST /checkout/confirm-transfer - Donor sent a Cash App / Zelle payment
//! POST /checkout/dismiss-error    - Close the payment error modal
//!
//! # Payments API
//! GET  /api/payments/config       - Public card widget settings
//! POST /api/payments/charge       - Raw charge relay
//! POST /api/payments/webhook      - Processor notifications
//! ```
//!
//! Cart and checkout mutations answer with every cart fragment marked
//! `hx-swap-oob`, plus the fired cart events in `HX-Trigger`. A donation
//! keystroke is the exception: it only refreshes what surrounds the input.

pub mod api;
pub mod cart;
pub mod checkout;
pub mod home;
pub mod products;

use askama::Template;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Map, Value};

use crate::middleware::{cart_rate_limiter, payment_rate_limiter};
use crate::models::Visit;
use crate::render::{
    CartPanelTemplate, DonationUpdateTemplate, FiredEvent, RenderedCart, trigger_map,
};
use crate::state::AppState;

/// `HX-Trigger` response header.
pub const HX_TRIGGER: HeaderName = HeaderName::from_static("hx-trigger");

/// Out-of-band cart fragments with the request's triggers.
pub struct CartFragments {
    panel: RenderedCart,
    triggers: Map<String, Value>,
    extra_html: String,
    status: StatusCode,
    editing: Option<String>,
}

impl CartFragments {
    /// Render the visitor's cart for a response.
    #[must_use]
    pub fn new(state: &AppState, visit: &Visit, events: &[FiredEvent]) -> Self {
        Self {
            panel: state
                .renderer()
                .render(&visit.cart, visit.checkout.as_ref(), &visit.panel, events),
            triggers: trigger_map(events),
            extra_html: String::new(),
            status: StatusCode::OK,
            editing: None,
        }
    }

    /// Render only the fragments around `item_id`'s donation input, which
    /// still has focus and must not be replaced.
    #[must_use]
    pub fn editing_donation(mut self, item_id: &str) -> Self {
        self.editing = Some(item_id.to_string());
        self
    }

    /// Add a client event to `HX-Trigger`.
    #[must_use]
    pub fn trigger(mut self, name: &str, detail: Value) -> Self {
        self.triggers.insert(name.to_string(), detail);
        self
    }

    /// Append more out-of-band markup after the cart fragments.
    #[must_use]
    pub fn append(mut self, html: String) -> Self {
        self.extra_html.push_str(&html);
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub const fn panel(&self) -> &RenderedCart {
        &self.panel
    }
}

impl IntoResponse for CartFragments {
    fn into_response(self) -> Response {
        let rendered = match self.editing {
            Some(item_id) => DonationUpdateTemplate {
                panel: self.panel,
                item_id,
            }
            .render(),
            None => CartPanelTemplate { panel: self.panel }.render(),
        };
        let mut body = match rendered {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to render cart panel");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        body.push_str(&self.extra_html);

        let mut response = (self.status, Html(body)).into_response();
        if let Some(value) = trigger_header(&self.triggers) {
            response.headers_mut().insert(HX_TRIGGER, value);
        }
        response
    }
}

/// Serialize triggers for the header. Product titles may be non-ASCII, so
/// the value is built from raw bytes.
pub(crate) fn trigger_header(triggers: &Map<String, Value>) -> Option<HeaderValue> {
    if triggers.is_empty() {
        return None;
    }
    let json = serde_json::to_string(triggers).ok()?;
    HeaderValue::from_bytes(json.as_bytes()).ok()
}

/// Cart state for a full page render.
pub async fn page_panel(state: &AppState, session: &tower_sessions::Session) -> RenderedCart {
    let visit = Visit::load(session, state.donation_policy()).await;
    state
        .renderer()
        .render(&visit.cart, visit.checkout.as_ref(), &visit.panel, &[])
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/panel", get(cart::panel))
        .route("/add", post(cart::add))
        .route("/quantity", post(cart::quantity))
        .route("/donation", post(cart::donation))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
        .route("/toggle", post(cart::toggle))
        .route("/close", post(cart::close))
        .route("/dismiss", post(cart::dismiss))
        .route("/layout", post(cart::layout))
        .route("/count", get(cart::count))
        .layer(cart_rate_limiter())
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    let payment = Router::new()
        .route("/pay", post(checkout::pay))
        .route("/confirm-transfer", post(checkout::confirm_transfer))
        .layer(payment_rate_limiter());

    Router::new()
        .route("/open", post(checkout::open))
        .route("/cancel", post(checkout::cancel))
        .route("/field", post(checkout::field))
        .route("/blur", post(checkout::blur))
        .route("/method", post(checkout::method))
        .route("/validate", post(checkout::validate))
        .route("/dismiss-error", post(checkout::dismiss_error))
        .layer(cart_rate_limiter())
        .merge(payment)
}

/// Create the payments API router.
pub fn payment_api_routes() -> Router<AppState> {
    let charge = Router::new()
        .route("/charge", post(api::payments::charge))
        .layer(payment_rate_limiter());

    Router::new()
        .route("/config", get(api::payments::config))
        .route("/webhook", post(api::payments::webhook))
        .merge(charge)
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/api/payments", payment_api_routes())
}
