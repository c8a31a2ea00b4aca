//! Payments API routes.
//!
//! JSON endpoints for the card widget settings, a bare charge relay used by
//! standalone donation forms, and processor webhooks.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use gi_foundation_core::{PaymentStatus, TransactionKind};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::payments::{
    ChargeRequest, GENERIC_PAYMENT_ERROR, PaymentError, PaymentGateway, SIGNATURE_HEADER,
    WebhookAction, parse_webhook, verify_signature,
};
use crate::services::transactions::{CustomerRecord, TransactionRecord};
use crate::state::AppState;

/// Error response for API endpoints.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: Some(msg.into()),
            errors: Vec::new(),
        }
    }

    /// Processor failure: declines keep the processor's detail verbatim.
    fn from_payment(err: &PaymentError) -> Self {
        match err {
            PaymentError::Declined(detail) => Self {
                status: StatusCode::PAYMENT_REQUIRED,
                error: None,
                errors: vec![json!({ "detail": detail })],
            },
            _ => Self {
                status: StatusCode::BAD_GATEWAY,
                error: Some(GENERIC_PAYMENT_ERROR.to_string()),
                errors: Vec::new(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Public card widget settings.
#[derive(Debug, Serialize)]
pub struct PaymentConfigResponse {
    pub app_id: String,
    pub location_id: String,
    pub environment: &'static str,
}

/// GET /api/payments/config
pub async fn config(State(state): State<AppState>) -> Json<PaymentConfigResponse> {
    let square = &state.config().square;
    Json(PaymentConfigResponse {
        app_id: square.app_id.clone(),
        location_id: square.location_id.clone(),
        environment: square.environment.as_str(),
    })
}

/// Charge relay request.
#[derive(Debug, Deserialize)]
pub struct ChargeBody {
    #[serde(default, alias = "source_id", alias = "sourceId")]
    pub token: Option<String>,
    /// Amount in cents.
    pub amount: i64,
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub customer: Option<CustomerRecord>,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/payments/charge
///
/// Returns the processor's payment object as `{payment}`. Declines answer
/// `402` with the processor's `{errors}`; transport problems answer `502`.
///
/// # Errors
///
/// Returns `ApiError` if the request is incomplete or the charge fails.
#[instrument(skip(state, body), fields(amount = body.amount))]
pub async fn charge(
    State(state): State<AppState>,
    Json(body): Json<ChargeBody>,
) -> std::result::Result<Json<Value>, ApiError> {
    let token = body
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing payment token"))?;
    if body.amount <= 0 {
        return Err(ApiError::bad_request("Amount must be greater than zero"));
    }

    let mut request = ChargeRequest::relay(token, body.amount);
    request.note = body.note.filter(|n| !n.trim().is_empty());
    request.buyer_email = body
        .customer
        .as_ref()
        .map(|c| c.email.trim().to_string())
        .filter(|e| !e.is_empty());

    let payment = state.square().charge(request).await.map_err(|e| {
        tracing::warn!(error = %e, "Relay charge failed");
        ApiError::from_payment(&e)
    })?;

    let record = TransactionRecord::from_charge(
        body.kind.unwrap_or(TransactionKind::Donation),
        &payment.payment_id,
        payment.status,
        payment.amount_minor.unwrap_or(body.amount),
        body.customer,
        state.environment(),
    );
    tracing::info!(
        payment_id = %payment.payment_id,
        status = ?payment.status,
        "Relay charge accepted"
    );
    state.record_transaction(&record).await;

    Ok(Json(json!({ "payment": payment.raw })))
}

/// POST /api/payments/webhook
///
/// Verifies the processor signature, then applies each event to the
/// transaction log.
///
/// # Errors
///
/// Returns `Unauthorized` without a valid signature, `BadRequest` for a body
/// that is not an event, or a log error if a status update cannot be written.
#[instrument(skip(state, headers, body))]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let square = &state.config().square;
    let (Some(key), Some(url)) = (&square.webhook_signature_key, &square.webhook_url) else {
        tracing::warn!("Webhook received but no signature key is configured");
        return Err(AppError::Unauthorized("webhooks are not configured".to_string()));
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(key.expose_secret(), url, &body, signature) {
        tracing::warn!("Webhook signature mismatch");
        return Err(AppError::Unauthorized("invalid signature".to_string()));
    }

    let actions = parse_webhook(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    for action in actions {
        apply(&state, action).await?;
    }
    Ok(StatusCode::OK)
}

async fn apply(state: &AppState, action: WebhookAction) -> Result<()> {
    match action {
        WebhookAction::PaymentUpdated {
            payment_id,
            status,
            amount_minor,
        } => {
            let updated = state.transactions().update_status(&payment_id, status).await?;
            tracing::info!(%payment_id, ?status, updated, "Payment updated");
            if status == PaymentStatus::Completed {
                state.notifier().payment_completed(&payment_id, amount_minor).await;
            }
        }
        WebhookAction::PaymentCreated { payment_id } => {
            tracing::info!(%payment_id, "Payment created");
        }
        WebhookAction::RefundCreated {
            refund_id,
            payment_id,
        } => {
            let updated = state
                .transactions()
                .update_status(&payment_id, PaymentStatus::Refunded)
                .await?;
            tracing::info!(%refund_id, %payment_id, updated, "Refund created");
        }
        WebhookAction::Ignored { event_type } => {
            tracing::debug!(%event_type, "Ignoring webhook event");
        }
    }
    Ok(())
}
