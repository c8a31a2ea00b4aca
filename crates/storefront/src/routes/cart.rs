//! Cart route handlers.
//!
//! Every mutation loads the visitor's [`Visit`], applies one store operation
//! while a [`RenderQueue`] listens, saves, and answers with
//! [`CartFragments`]. Changing the cart cancels an open checkout.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gi_foundation_core::{ProductId, parse_donation_input};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::CartFragments;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::CspNonce;
use crate::models::Visit;
use crate::render::{LayoutChange, RenderQueue, RenderedCart, badge_label};
use crate::state::AppState;

/// Set quantity form data.
#[derive(Debug, Deserialize)]
pub struct QuantityForm {
    pub id: String,
    pub quantity: i64,
}

/// Donation input form data, posted on every keystroke and on blur.
#[derive(Debug, Deserialize)]
pub struct DonationForm {
    pub id: String,
    #[serde(default)]
    pub donation: String,
    /// Caret position inside the input.
    #[serde(default)]
    pub caret: u32,
    /// False when the post came from the input losing focus.
    #[serde(default)]
    pub focused: bool,
}

/// Remove item form data.
#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub id: String,
}

/// Outside click / Escape report.
#[derive(Debug, Deserialize)]
pub struct DismissForm {
    #[serde(default)]
    pub source: Option<String>,
}

/// Viewport width report.
#[derive(Debug, Deserialize)]
pub struct LayoutForm {
    pub width: u32,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub nonce: String,
    pub panel: RenderedCart,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub badge: String,
    pub item_count: u32,
    pub badge_oob: bool,
}

/// Display cart page. The page lists the cart itself, so the panel closes.
#[instrument(skip(state, session, nonce))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CspNonce(nonce): CspNonce,
) -> Result<CartShowTemplate> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    visit.panel.close();
    visit.save(&session).await?;

    Ok(CartShowTemplate {
        nonce,
        panel: state
            .renderer()
            .render(&visit.cart, visit.checkout.as_ref(), &visit.panel, &[]),
    })
}

/// Both surfaces as they stand (HTMX).
#[instrument(skip(state, session))]
pub async fn panel(State(state): State<AppState>, session: Session) -> CartFragments {
    let visit = Visit::load(&session, state.donation_policy()).await;
    CartFragments::new(&state, &visit, &[])
}

/// Add item to cart (HTMX).
///
/// Accepts `id`, optional `quantity`, optional `donation` and the product's
/// `option_<n>` selections. Without a usable donation the suggested amount
/// for the selections is stored.
#[instrument(skip(state, session, form))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<HashMap<String, String>>,
) -> Result<CartFragments> {
    let id = form
        .get("id")
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing product id".to_string()))?;
    let product = state
        .catalog()
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound(id.to_string()))?;

    let quantity = form
        .get("quantity")
        .and_then(|q| q.trim().parse::<i64>().ok())
        .unwrap_or(1);
    let selections: Vec<String> = (0..product.options.len())
        .map(|i| form.get(&format!("option_{i}")).cloned().unwrap_or_default())
        .collect();
    let donation = form
        .get("donation")
        .and_then(|raw| parse_donation_input(raw))
        .or_else(|| Some(product.suggested_amount(&selections)).filter(|a| *a > Decimal::ZERO));

    add_breadcrumb("cart", "Add to cart", &[("product_id", product.id.as_str())]);

    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let queue = RenderQueue::attach(&mut visit.cart);
    let added = visit.cart.add_item(&product.cart_ref(), donation, quantity);
    let events = queue.detach(&mut visit.cart);
    if added {
        visit.cancel_checkout();
    }
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &events))
}

/// Set item quantity (HTMX). Zero or less removes the item.
#[instrument(skip(state, session))]
pub async fn quantity(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<QuantityForm>,
) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let queue = RenderQueue::attach(&mut visit.cart);
    let changed = visit.cart.set_quantity(&form.id, form.quantity);
    let events = queue.detach(&mut visit.cart);
    if changed {
        visit.cancel_checkout();
    }
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &events))
}

/// Set the per-item donation from raw input (HTMX).
///
/// While the input keeps focus the raw text and caret are remembered, and the
/// response leaves the input out so later keystrokes are not overwritten. The
/// blur post re-renders everything, including the normalized amount.
#[instrument(skip(state, session))]
pub async fn donation(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<DonationForm>,
) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let queue = RenderQueue::attach(&mut visit.cart);
    let changed = visit.cart.set_donation(&form.id, &form.donation);
    let events = queue.detach(&mut visit.cart);

    let focused = form.focused && visit.cart.item(&form.id).is_some();
    let editing = focused && visit.checkout.is_none();
    if focused {
        visit
            .panel
            .set_focus(ProductId::from(form.id.as_str()), form.donation, form.caret);
    } else {
        visit.panel.clear_focus();
    }
    if changed {
        visit.cancel_checkout();
    }
    visit.save(&session).await?;

    let fragments = CartFragments::new(&state, &visit, &events);
    Ok(if editing {
        fragments.editing_donation(&form.id)
    } else {
        fragments
    })
}

/// Remove item from cart (HTMX).
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveForm>,
) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let queue = RenderQueue::attach(&mut visit.cart);
    let removed = visit.cart.remove_item(&form.id);
    let events = queue.detach(&mut visit.cart);
    if removed {
        visit.cancel_checkout();
        if visit.panel.focus.as_ref().is_some_and(|f| f.item_id.as_str() == form.id) {
            visit.panel.clear_focus();
        }
    }
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &events))
}

/// Remove every item (HTMX).
#[instrument(skip(state, session))]
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let queue = RenderQueue::attach(&mut visit.cart);
    visit.cart.clear();
    let events = queue.detach(&mut visit.cart);
    visit.cancel_checkout();
    visit.panel.clear_focus();
    visit.panel.show_item_errors = false;
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &events))
}

/// Open or close the panel (HTMX).
#[instrument(skip(state, session))]
pub async fn toggle(State(state): State<AppState>, session: Session) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let open = visit.panel.toggle();
    visit.cart.set_open(open);
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &[]))
}

/// Close the panel (HTMX). An open checkout is kept for when it reopens.
#[instrument(skip(state, session))]
pub async fn close(State(state): State<AppState>, session: Session) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    visit.panel.close();
    visit.cart.set_open(false);
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &[]))
}

/// Outside click or Escape (HTMX).
///
/// Answers `204 No Content` when nothing closed, including the one close
/// swallowed right after checkout replaced the panel content.
#[instrument(skip(state, session))]
pub async fn dismiss(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<DismissForm>,
) -> Result<Response> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let closed = match form.source.as_deref() {
        Some("escape") => visit.panel.escape(),
        _ => visit.panel.outside_click(),
    };
    visit.cart.set_open(visit.panel.is_open);
    visit.save(&session).await?;

    if !closed {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(CartFragments::new(&state, &visit, &[]).into_response())
}

/// Viewport width report (HTMX). Re-renders only when the breakpoint was
/// crossed.
#[instrument(skip(state, session))]
pub async fn layout(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LayoutForm>,
) -> Result<Response> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let change = visit.panel.resize(form.width);
    if change == LayoutChange::Unchanged {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    tracing::debug!(?change, "Cart layout changed");
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &[]).into_response())
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> CartCountTemplate {
    let visit = Visit::load(&session, state.donation_policy()).await;
    let item_count = visit.cart.item_count();

    CartCountTemplate {
        badge: badge_label(item_count),
        item_count,
        badge_oob: false,
    }
}
