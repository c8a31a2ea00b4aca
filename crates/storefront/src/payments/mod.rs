//! Card payments.
//!
//! The checkout flow talks to the processor through [`PaymentGateway`] so the
//! submit/complete/fail transitions can run against any implementation. The
//! production gateway is [`SquareClient`].

pub mod square;
pub mod webhook;

use std::future::Future;

use gi_foundation_core::PaymentStatus;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::cart::CartStore;
use crate::checkout::{CheckoutError, CheckoutReceipt, CheckoutSession, PaymentIntent};

pub use square::{SQUARE_VERSION, SquareClient, SquareEnvironment};
pub use webhook::{SIGNATURE_HEADER, WebhookAction, parse_webhook, verify_signature};

/// Message shown to the donor when the processor could not be reached.
pub const GENERIC_PAYMENT_ERROR: &str =
    "We couldn't process your payment right now. Please try again.";

/// Message shown when the processor answered but did not capture the charge.
pub const NOT_COMPLETED_MESSAGE: &str =
    "Your payment was not completed. Please try again or use another card.";

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Processor rejected the payment and said why.
    #[error("{0}")]
    Declined(String),

    /// Processor returned an error without a usable detail.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response or payload.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl PaymentError {
    /// Text safe to show the donor. Processor decline details are passed
    /// through verbatim; transport problems are not.
    #[must_use]
    pub fn donor_message(&self) -> String {
        match self {
            Self::Declined(detail) => detail.clone(),
            _ => GENERIC_PAYMENT_ERROR.to_string(),
        }
    }
}

/// A tokenized card charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Single-use token produced by the card widget.
    pub token: String,
    /// Amount in cents.
    pub amount_minor: i64,
    pub idempotency_key: String,
    pub note: Option<String>,
    pub buyer_email: Option<String>,
}

impl ChargeRequest {
    /// Charge for a checkout intent with a fresh idempotency key.
    #[must_use]
    pub fn from_intent(intent: &PaymentIntent, token: impl Into<String>) -> Self {
        let email = intent.contact.email.trim();
        Self {
            token: token.into(),
            amount_minor: intent.amount_minor,
            idempotency_key: Uuid::new_v4().to_string(),
            note: Some(intent.note.clone()),
            buyer_email: (!email.is_empty()).then(|| email.to_string()),
        }
    }

    /// Bare charge as sent by the relay endpoint.
    #[must_use]
    pub fn relay(token: impl Into<String>, amount_minor: i64) -> Self {
        Self {
            token: token.into(),
            amount_minor,
            idempotency_key: Uuid::new_v4().to_string(),
            note: None,
            buyer_email: None,
        }
    }
}

/// Processor confirmation of a charge.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount_minor: Option<i64>,
    /// The processor's payment object as returned.
    pub raw: Value,
}

/// Something that can charge a card token.
pub trait PaymentGateway: Send + Sync {
    /// Charge a card token.
    fn charge(
        &self,
        request: ChargeRequest,
    ) -> impl Future<Output = Result<PaymentReceipt, PaymentError>> + Send;
}

/// Result of a card checkout attempt.
#[derive(Debug)]
pub enum CardOutcome {
    /// Charged; the session is in `Success` and the cart was cleared.
    Paid {
        intent: PaymentIntent,
        receipt: CheckoutReceipt,
        payment: PaymentReceipt,
    },
    /// Charge failed; the session is in `Failed` with cart and form intact.
    Declined {
        intent: PaymentIntent,
        message: String,
    },
}

/// Run a card payment through the checkout state machine.
///
/// # Errors
///
/// Returns the checkout gate error (invalid form or cart, or a payment
/// already in flight) without contacting the processor. Processor failures
/// are not errors here: they produce [`CardOutcome::Declined`].
pub async fn pay_with_card<G: PaymentGateway>(
    gateway: &G,
    session: &mut CheckoutSession,
    cart: &mut CartStore,
    token: &str,
) -> Result<CardOutcome, CheckoutError> {
    let intent = session.begin_submit(cart)?;
    let result = gateway.charge(ChargeRequest::from_intent(&intent, token)).await;
    settle_card_charge(session, cart, intent, result)
}

/// Apply a processor result to a session already in `Submitting`.
///
/// Split from [`pay_with_card`] so callers can persist the `Submitting`
/// phase before awaiting the processor.
///
/// # Errors
///
/// Returns `WrongPhase` if the session is not submitting.
pub fn settle_card_charge(
    session: &mut CheckoutSession,
    cart: &mut CartStore,
    intent: PaymentIntent,
    result: Result<PaymentReceipt, PaymentError>,
) -> Result<CardOutcome, CheckoutError> {
    let message = match result {
        Ok(payment) if payment.status.is_success() => {
            let receipt = CheckoutReceipt::card(&intent, payment.payment_id.clone(), payment.status);
            session.complete(receipt.clone(), cart)?;
            tracing::info!(
                reference = %intent.reference,
                payment_id = %payment.payment_id,
                amount_minor = intent.amount_minor,
                "Card payment completed"
            );
            return Ok(CardOutcome::Paid {
                intent,
                receipt,
                payment,
            });
        }
        Ok(payment) => {
            tracing::warn!(
                reference = %intent.reference,
                payment_id = %payment.payment_id,
                status = ?payment.status,
                "Card payment not completed"
            );
            NOT_COMPLETED_MESSAGE.to_string()
        }
        Err(e) => {
            tracing::warn!(reference = %intent.reference, error = %e, "Card payment failed");
            e.donor_message()
        }
    };

    session.fail(message.clone())?;
    Ok(CardOutcome::Declined { intent, message })
}
