//! Checkout route handlers.
//!
//! Checkout lives inside the cart panel. The session's [`CheckoutSession`]
//! is the only source of truth for the phase; the panel shows checkout
//! whenever one is open.
//!
//! Card flow: the widget script calls `/checkout/validate`, tokenizes only
//! when that passes, then posts the token to `/checkout/pay`. The pay route
//! stores the `Submitting` phase before calling the processor, so a second
//! submission while the first is in flight gets `409 Conflict`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use gi_foundation_core::{ContactField, PaymentMethod};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_sessions::Session;
use tracing::instrument;

use super::{CartFragments, HX_TRIGGER, trigger_header};
use crate::checkout::{CheckoutError, CheckoutPhase, CheckoutSession, MethodChange};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::Visit;
use crate::payments::{CardOutcome, ChargeRequest, PaymentGateway, settle_card_charge};
use crate::render::{CheckoutView, FieldView, RenderQueue};
use crate::services::transactions::TransactionRecord;
use crate::state::AppState;

/// Field input form data.
#[derive(Debug, Deserialize)]
pub struct FieldForm {
    pub field: ContactField,
    #[serde(default)]
    pub value: Option<String>,
}

/// Payment method form data.
#[derive(Debug, Deserialize)]
pub struct MethodForm {
    pub method: PaymentMethod,
}

/// Card token from the payment widget.
#[derive(Debug, Deserialize)]
pub struct PayForm {
    pub token: String,
}

/// Answer of the pre-tokenization gate.
#[derive(Debug, Serialize)]
pub struct GateResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Field error (and totals, when the state changed) as OOB fragments.
#[derive(Template, WebTemplate)]
#[template(path = "partials/checkout_field.html")]
pub struct CheckoutFieldTemplate {
    pub field: FieldView,
    pub refreshed: Option<CheckoutView>,
}

/// Payment instructions for the selected method as an OOB fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/checkout_method.html")]
pub struct CheckoutMethodTemplate {
    pub checkout: CheckoutView,
}

/// Dismissible payment failure modal.
#[derive(Template, WebTemplate)]
#[template(path = "partials/payment_error.html")]
pub struct PaymentErrorTemplate {
    pub message: String,
}

fn not_open() -> AppError {
    AppError::Checkout(CheckoutError::WrongPhase(CheckoutPhase::Closed))
}

fn checkout_view(state: &AppState, visit: &Visit) -> Option<CheckoutView> {
    state
        .renderer()
        .render(&visit.cart, visit.checkout.as_ref(), &visit.panel, &[])
        .checkout
}

/// Errors the donor can fix in the form; everything else is returned as-is.
const fn is_form_error(err: &CheckoutError) -> bool {
    matches!(
        err,
        CheckoutError::CartInvalid(_) | CheckoutError::FieldInvalid { .. }
    )
}

fn invalid_detail(err: &CheckoutError) -> Value {
    match err {
        CheckoutError::CartInvalid(blocked) => json!({
            "message": blocked.message,
            "focus": blocked.focus_target(),
        }),
        CheckoutError::FieldInvalid { field, message } => json!({
            "message": message,
            "focus": format!("checkout-{}", field.as_str()),
        }),
        other => json!({ "message": other.to_string() }),
    }
}

fn method_detail(change: MethodChange) -> Value {
    json!({
        "method": change.method,
        "armCardWidget": change.arm_card_widget,
    })
}

/// Open checkout in the panel (HTMX).
///
/// A fresh opening sends `paymentMethodChanged` so the page mounts the card
/// widget for the default method. Reopening a kept checkout does not.
///
/// A blocked cart keeps the item list, shows every item error and asks the
/// page to focus the first failing donation input.
#[instrument(skip(state, session))]
pub async fn open(State(state): State<AppState>, session: Session) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;

    if visit.checkout.is_some() {
        visit.panel.show_checkout();
        visit.save(&session).await?;
        return Ok(CartFragments::new(&state, &visit, &[]));
    }

    let opened = CheckoutSession::open(&visit.cart, Utc::now(), &mut rand::rng());
    match opened {
        Ok(checkout) => {
            tracing::info!(
                reference = %checkout.reference(),
                items = visit.cart.item_count(),
                "Checkout opened"
            );
            add_breadcrumb("checkout", "Checkout opened", &[("reference", checkout.reference())]);
            let opening = checkout.opening_method();
            visit.panel.show_checkout();
            visit.checkout = Some(checkout);
            visit.save(&session).await?;
            Ok(CartFragments::new(&state, &visit, &[])
                .trigger("paymentMethodChanged", method_detail(opening)))
        }
        Err(blocked) => {
            tracing::debug!(message = %blocked.message, "Checkout blocked");
            visit.panel.open();
            visit.panel.show_item_errors = true;
            visit.save(&session).await?;
            Ok(CartFragments::new(&state, &visit, &[]).trigger(
                "checkoutBlocked",
                json!({
                    "message": blocked.message,
                    "focus": blocked.focus_target(),
                    "itemId": blocked.first_error.as_ref().map(|e| e.id.as_str()),
                }),
            ))
        }
    }
}

/// Leave checkout and show the cart again (HTMX).
#[instrument(skip(state, session))]
pub async fn cancel(State(state): State<AppState>, session: Session) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    if let Some(mut checkout) = visit.checkout.take() {
        tracing::debug!(reference = %checkout.reference(), phase = ?checkout.phase(), "Checkout closed");
        checkout.cancel();
    }
    visit.save(&session).await?;

    Ok(CartFragments::new(&state, &visit, &[]))
}

/// Field input (HTMX). Errors stay hidden until the field is blurred or the
/// form was submitted.
#[instrument(skip(state, session, form), fields(field = ?form.field))]
pub async fn field(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<FieldForm>,
) -> Result<Response> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let Some(checkout) = visit.checkout.as_mut() else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let feedback = checkout.update_field(form.field, form.value.as_deref().unwrap_or_default());
    visit.save(&session).await?;

    Ok(field_response(&state, &visit, FieldView::from_feedback(&feedback), form.field))
}

/// Field lost focus (HTMX). The error is always shown from now on.
#[instrument(skip(state, session, form), fields(field = ?form.field))]
pub async fn blur(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<FieldForm>,
) -> Result<Response> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let Some(checkout) = visit.checkout.as_mut() else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    if let Some(value) = form.value.as_deref() {
        checkout.update_field(form.field, value);
    }
    let feedback = checkout.blur_field(form.field);
    visit.save(&session).await?;

    Ok(field_response(&state, &visit, FieldView::from_feedback(&feedback), form.field))
}

fn field_response(state: &AppState, visit: &Visit, field: FieldView, changed: ContactField) -> Response {
    let refreshed = if changed == ContactField::State {
        checkout_view(state, visit)
    } else {
        None
    };
    CheckoutFieldTemplate { field, refreshed }.into_response()
}

/// Select a payment method (HTMX).
///
/// Sends `paymentMethodChanged` with `armCardWidget` set only when the widget
/// was not yet armed in this opening, so the page mounts it once.
#[instrument(skip(state, session))]
pub async fn method(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<MethodForm>,
) -> Result<Response> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let checkout = visit.checkout.as_mut().ok_or_else(not_open)?;
    let change = checkout.select_method(form.method);
    visit.save(&session).await?;

    let view = checkout_view(&state, &visit).ok_or_else(not_open)?;
    let mut triggers = Map::new();
    triggers.insert("paymentMethodChanged".to_string(), method_detail(change));

    let mut response = CheckoutMethodTemplate { checkout: view }.into_response();
    if let Some(value) = trigger_header(&triggers) {
        response.headers_mut().insert(HX_TRIGGER, value);
    }
    Ok(response)
}

/// Gate the card widget must pass before tokenizing (JSON).
///
/// Marks the form submitted, so the next panel render shows every error.
#[instrument(skip(state, session))]
pub async fn validate(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<GateResponse>)> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let checkout = visit.checkout.as_mut().ok_or_else(not_open)?;
    let gate = checkout.pre_tokenize(&visit.cart);
    visit.save(&session).await?;

    match gate {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(GateResponse {
                ok: true,
                field: None,
                focus: None,
                message: None,
            }),
        )),
        Err(CheckoutError::FieldInvalid { field, message }) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(GateResponse {
                ok: false,
                field: Some(field.as_str()),
                focus: Some(format!("checkout-{}", field.as_str())),
                message: Some(message),
            }),
        )),
        Err(CheckoutError::CartInvalid(blocked)) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(GateResponse {
                ok: false,
                field: None,
                focus: blocked.focus_target(),
                message: Some(blocked.message),
            }),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Charge a card token (HTMX).
///
/// On success the panel shows the confirmation and the cart is empty. On a
/// decline the cart and form are kept and the error modal is added.
#[instrument(skip(state, session, form))]
pub async fn pay(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<PayForm>,
) -> Result<CartFragments> {
    if form.token.trim().is_empty() {
        return Err(AppError::BadRequest("missing card token".to_string()));
    }

    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let checkout = visit.checkout.as_mut().ok_or_else(not_open)?;
    if checkout.selected_method() != PaymentMethod::Card {
        return Err(CheckoutError::WrongMethod(checkout.selected_method()).into());
    }

    let intent = match checkout.begin_submit(&visit.cart) {
        Ok(intent) => intent,
        Err(e) if is_form_error(&e) => {
            visit.save(&session).await?;
            return Ok(CartFragments::new(&state, &visit, &[]).trigger("checkoutInvalid", invalid_detail(&e)));
        }
        Err(e) => return Err(e.into()),
    };
    let items = visit.cart.items().to_vec();
    // Other requests must see Submitting before the processor is called.
    visit.flush(&session).await?;

    add_breadcrumb("checkout", "Card payment submitted", &[("reference", &intent.reference)]);
    let result = state
        .square()
        .charge(ChargeRequest::from_intent(&intent, form.token))
        .await;

    let queue = RenderQueue::attach(&mut visit.cart);
    let checkout = visit.checkout.as_mut().ok_or_else(not_open)?;
    let outcome = settle_card_charge(checkout, &mut visit.cart, intent, result);
    let events = queue.detach(&mut visit.cart);
    let outcome = outcome?;
    visit.save(&session).await?;

    match outcome {
        CardOutcome::Paid {
            intent,
            receipt,
            payment,
        } => {
            let record =
                TransactionRecord::from_checkout(&intent, &receipt, &items, state.environment());
            state.record_transaction(&record).await;

            Ok(CartFragments::new(&state, &visit, &events).trigger(
                "paymentCompleted",
                json!({
                    "reference": receipt.reference,
                    "paymentId": payment.payment_id,
                }),
            ))
        }
        CardOutcome::Declined { message, .. } => {
            let modal = PaymentErrorTemplate {
                message: message.clone(),
            }
            .render()
            .map_err(|e| AppError::Internal(e.to_string()))?;

            Ok(CartFragments::new(&state, &visit, &events)
                .append(modal)
                .trigger("paymentFailed", json!({ "message": message })))
        }
    }
}

/// Donor closed the payment error modal (HTMX).
///
/// A failed checkout goes back to form entry and the panel drops the error.
/// The modal is cleared either way.
#[instrument(skip(state, session))]
pub async fn dismiss_error(
    State(state): State<AppState>,
    session: Session,
) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let dismissed = visit.checkout.as_mut().is_some_and(CheckoutSession::dismiss_error);
    if dismissed {
        tracing::debug!("Payment error dismissed");
        visit.save(&session).await?;
    }

    Ok(CartFragments::new(&state, &visit, &[]).append(EMPTY_MODAL_ROOT.to_string()))
}

/// Out-of-band fragment that empties the modal container.
const EMPTY_MODAL_ROOT: &str = r#"<div id="modal-root" hx-swap-oob="innerHTML"></div>"#;

/// Donor reports a Cash App / Zelle transfer as sent (HTMX).
///
/// Completes immediately with an awaiting-transfer receipt; staff reconcile
/// the transfer by its reference.
#[instrument(skip(state, session))]
pub async fn confirm_transfer(
    State(state): State<AppState>,
    session: Session,
) -> Result<CartFragments> {
    let mut visit = Visit::load(&session, state.donation_policy()).await;
    let items = visit.cart.items().to_vec();

    let queue = RenderQueue::attach(&mut visit.cart);
    let checkout = visit.checkout.as_mut().ok_or_else(not_open)?;
    let result = checkout.confirm_manual_transfer(&mut visit.cart);
    let events = queue.detach(&mut visit.cart);

    let (intent, receipt) = match result {
        Ok(confirmed) => confirmed,
        Err(e) if is_form_error(&e) => {
            visit.save(&session).await?;
            return Ok(CartFragments::new(&state, &visit, &[]).trigger("checkoutInvalid", invalid_detail(&e)));
        }
        Err(e) => return Err(e.into()),
    };
    visit.save(&session).await?;

    tracing::info!(
        reference = %receipt.reference,
        method = %receipt.method,
        amount = %receipt.amount,
        "Manual transfer confirmed"
    );
    let record = TransactionRecord::from_checkout(&intent, &receipt, &items, state.environment());
    state.record_transaction(&record).await;

    Ok(CartFragments::new(&state, &visit, &events))
}
