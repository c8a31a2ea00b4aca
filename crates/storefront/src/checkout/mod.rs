//! Checkout session state machine.
//!
//! A `CheckoutSession` exists only while the checkout panel is open. It holds
//! the selected payment method, a reference code generated once per opening,
//! and the contact/shipping form.
//!
//! ```text
//! Closed -> FormEntry -> Submitting -> Success
//!              ^             |
//!              +-- Failed <--+
//! ```
//!
//! Opening requires a valid cart. Leaving `FormEntry` requires every contact
//! field and the cart to pass. While `Submitting`, further submits are
//! rejected so a payment can only be in flight once.

pub mod form;
pub mod reference;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use gi_foundation_core::{
    ContactField, PaymentMethod, PaymentStatus, estimate_tax, normalize_field_input,
    to_minor_units, validate_field,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::{CartStore, ItemError};

pub use form::{ContactForm, FieldFeedback, FormReport};
pub use reference::{REFERENCE_PREFIX, generate_reference, is_reference};

/// Checkout lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Closed,
    FormEntry,
    Submitting,
    Success,
    /// Payment failed; the next donor action returns to `FormEntry`.
    Failed,
}

/// Returned when checkout cannot open because the cart is not ready.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CheckoutBlocked {
    /// First item whose donation fails validation (`None` for an empty cart).
    pub first_error: Option<ItemError>,
    pub message: String,
}

impl CheckoutBlocked {
    /// DOM id of the input that should receive focus.
    #[must_use]
    pub fn focus_target(&self) -> Option<String> {
        self.first_error.as_ref().map(ItemError::focus_target)
    }
}

/// Errors from checkout transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    CartInvalid(CheckoutBlocked),

    #[error("{message}")]
    FieldInvalid { field: ContactField, message: String },

    #[error("A payment is already being processed")]
    AlreadySubmitting,

    #[error("Checkout is {0:?}")]
    WrongPhase(CheckoutPhase),

    #[error("{0} is not available for this action")]
    WrongMethod(PaymentMethod),

    #[error("Donation total is out of range")]
    AmountOutOfRange,
}

/// Everything the payment step needs, captured when submission starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub method: PaymentMethod,
    pub reference: String,
    pub amount: Decimal,
    /// Amount in cents.
    pub amount_minor: i64,
    pub contact: ContactForm,
    pub note: String,
}

/// Outcome shown on the confirmation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub reference: String,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub payment_id: Option<String>,
    pub status: PaymentStatus,
    pub email: String,
}

impl CheckoutReceipt {
    /// Receipt for a processor-confirmed card payment.
    #[must_use]
    pub fn card(intent: &PaymentIntent, payment_id: String, status: PaymentStatus) -> Self {
        Self {
            reference: intent.reference.clone(),
            method: intent.method,
            amount: intent.amount,
            payment_id: Some(payment_id),
            status,
            email: intent.contact.email.trim().to_string(),
        }
    }

    /// Receipt for a donor-confirmed manual transfer.
    #[must_use]
    pub fn manual(intent: &PaymentIntent) -> Self {
        Self {
            reference: intent.reference.clone(),
            method: intent.method,
            amount: intent.amount,
            payment_id: None,
            status: PaymentStatus::AwaitingTransfer,
            email: intent.contact.email.trim().to_string(),
        }
    }
}

/// Result of selecting a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodChange {
    pub method: PaymentMethod,
    /// True only the first time the card widget should be mounted.
    pub arm_card_widget: bool,
}

/// Transient checkout state for one opening of the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    phase: CheckoutPhase,
    selected_method: PaymentMethod,
    reference: String,
    contact: ContactForm,
    form_submitted: bool,
    touched: BTreeSet<ContactField>,
    last_error: Option<String>,
    card_widget_armed: bool,
    receipt: Option<CheckoutReceipt>,
}

impl CheckoutSession {
    /// Open checkout for `cart`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutBlocked` naming the first failing item if the cart is
    /// empty or any donation is missing or below the minimum.
    pub fn open<R: Rng + ?Sized>(
        cart: &CartStore,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Self, CheckoutBlocked> {
        ensure_cart_ready(cart)?;
        let mut session = Self {
            phase: CheckoutPhase::FormEntry,
            selected_method: PaymentMethod::default(),
            reference: generate_reference(now, rng),
            contact: ContactForm::default(),
            form_submitted: false,
            touched: BTreeSet::new(),
            last_error: None,
            card_widget_armed: false,
            receipt: None,
        };
        if session.selected_method == PaymentMethod::Card {
            session.arm_card_widget();
        }
        Ok(session)
    }

    /// Method the panel opens with. A fresh opening with card selected has
    /// already armed the widget, and the page mounts it from this.
    #[must_use]
    pub const fn opening_method(&self) -> MethodChange {
        MethodChange {
            method: self.selected_method,
            arm_card_widget: self.card_widget_armed
                && matches!(self.selected_method, PaymentMethod::Card),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> CheckoutPhase {
        self.phase
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        !matches!(self.phase, CheckoutPhase::Closed)
    }

    #[must_use]
    pub const fn selected_method(&self) -> PaymentMethod {
        self.selected_method
    }

    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    #[must_use]
    pub const fn contact(&self) -> &ContactForm {
        &self.contact
    }

    #[must_use]
    pub const fn form_submitted(&self) -> bool {
        self.form_submitted
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub const fn receipt(&self) -> Option<&CheckoutReceipt> {
        self.receipt.as_ref()
    }

    /// Feedback for every field using the current display rules.
    #[must_use]
    pub fn field_feedback(&self) -> Vec<FieldFeedback> {
        form::feedback_for_all(&self.contact, &self.touched, self.form_submitted)
    }

    /// Estimated tax on `subtotal`, once the state field holds a valid code.
    #[must_use]
    pub fn estimated_tax(&self, subtotal: Decimal) -> Option<Decimal> {
        let state = self.contact.value(ContactField::State);
        validate_field(ContactField::State, state)
            .is_valid
            .then(|| estimate_tax(subtotal, state))
    }

    /// Store typed input. Errors are only shown once the form was submitted.
    pub fn update_field(&mut self, field: ContactField, raw: &str) -> FieldFeedback {
        self.recover();
        let value = normalize_field_input(field, raw);
        self.contact.set(field, value.clone());
        FieldFeedback {
            field,
            validation: validate_field(field, &value),
            value,
            show_error: self.form_submitted,
        }
    }

    /// Field lost focus: validate and always show the result.
    pub fn blur_field(&mut self, field: ContactField) -> FieldFeedback {
        self.touched.insert(field);
        let value = self.contact.value(field).to_string();
        FieldFeedback {
            field,
            validation: validate_field(field, &value),
            value,
            show_error: true,
        }
    }

    /// Validate every field and the cart, showing all errors from now on.
    pub fn validate_form(&mut self, cart: &CartStore) -> FormReport {
        self.form_submitted = true;
        FormReport {
            fields: self.field_feedback(),
            cart: cart.validate(),
        }
    }

    /// Gate that must pass before the card widget tokenizes.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySubmitting` while a payment is in flight, `WrongPhase`
    /// outside form entry, otherwise the first cart or field failure.
    pub fn pre_tokenize(&mut self, cart: &CartStore) -> Result<(), CheckoutError> {
        match self.phase {
            CheckoutPhase::FormEntry | CheckoutPhase::Failed => {}
            CheckoutPhase::Submitting => return Err(CheckoutError::AlreadySubmitting),
            phase => return Err(CheckoutError::WrongPhase(phase)),
        }

        let report = self.validate_form(cart);
        if !report.cart.is_valid {
            return Err(CheckoutError::CartInvalid(blocked_from(&report.cart)));
        }
        if let Some(invalid) = report.first_invalid() {
            return Err(CheckoutError::FieldInvalid {
                field: invalid.field,
                message: invalid.validation.message.clone(),
            });
        }
        Ok(())
    }

    /// `FormEntry -> Submitting`, capturing what the payment step needs.
    ///
    /// # Errors
    ///
    /// Fails with the same errors as [`Self::pre_tokenize`]. A second call
    /// while submitting fails with `AlreadySubmitting`.
    pub fn begin_submit(&mut self, cart: &CartStore) -> Result<PaymentIntent, CheckoutError> {
        self.pre_tokenize(cart)?;

        let amount = cart.donation_total();
        let amount_minor = to_minor_units(amount)
            .filter(|cents| *cents > 0)
            .ok_or(CheckoutError::AmountOutOfRange)?;

        self.phase = CheckoutPhase::Submitting;
        self.last_error = None;

        Ok(PaymentIntent {
            method: self.selected_method,
            reference: self.reference.clone(),
            amount,
            amount_minor,
            contact: self.contact.clone(),
            note: format!(
                "GI Associates Foundation {} ({} items)",
                self.reference,
                cart.item_count()
            ),
        })
    }

    /// `Submitting -> Success`. Clears the cart.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` unless a submission is in flight.
    pub fn complete(
        &mut self,
        receipt: CheckoutReceipt,
        cart: &mut CartStore,
    ) -> Result<(), CheckoutError> {
        if self.phase != CheckoutPhase::Submitting {
            return Err(CheckoutError::WrongPhase(self.phase));
        }
        self.phase = CheckoutPhase::Success;
        self.receipt = Some(receipt);
        cart.clear();
        Ok(())
    }

    /// `Submitting -> Failed`. Cart and contact values are kept for a retry.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` unless a submission is in flight.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<(), CheckoutError> {
        if self.phase != CheckoutPhase::Submitting {
            return Err(CheckoutError::WrongPhase(self.phase));
        }
        self.phase = CheckoutPhase::Failed;
        self.last_error = Some(detail.into());
        Ok(())
    }

    /// Donor dismissed the payment error: `Failed -> FormEntry` and the
    /// message is dropped. Returns `false` when there was nothing to dismiss.
    pub fn dismiss_error(&mut self) -> bool {
        if self.phase != CheckoutPhase::Failed {
            return false;
        }
        self.recover();
        self.last_error = None;
        true
    }

    /// Donor confirms a Cash App / Zelle transfer was sent.
    ///
    /// Runs the same gate as a card payment, then completes immediately with
    /// an awaiting-transfer receipt.
    ///
    /// # Errors
    ///
    /// Returns `WrongMethod` when card is selected, otherwise the errors of
    /// [`Self::begin_submit`].
    pub fn confirm_manual_transfer(
        &mut self,
        cart: &mut CartStore,
    ) -> Result<(PaymentIntent, CheckoutReceipt), CheckoutError> {
        if !self.selected_method.is_manual() {
            return Err(CheckoutError::WrongMethod(self.selected_method));
        }
        let intent = self.begin_submit(cart)?;
        let receipt = CheckoutReceipt::manual(&intent);
        self.complete(receipt.clone(), cart)?;
        Ok((intent, receipt))
    }

    /// Switch payment method. The reference does not change.
    pub fn select_method(&mut self, method: PaymentMethod) -> MethodChange {
        self.recover();
        self.selected_method = method;
        let arm_card_widget = method == PaymentMethod::Card && self.arm_card_widget();
        MethodChange {
            method,
            arm_card_widget,
        }
    }

    /// Returns `true` only the first time per opening.
    pub const fn arm_card_widget(&mut self) -> bool {
        if self.card_widget_armed {
            return false;
        }
        self.card_widget_armed = true;
        true
    }

    pub const fn cancel(&mut self) {
        self.phase = CheckoutPhase::Closed;
    }

    fn recover(&mut self) {
        if self.phase == CheckoutPhase::Failed {
            self.phase = CheckoutPhase::FormEntry;
        }
    }
}

fn ensure_cart_ready(cart: &CartStore) -> Result<(), CheckoutBlocked> {
    let validation = cart.validate();
    if validation.is_valid {
        Ok(())
    } else {
        Err(blocked_from(&validation))
    }
}

fn blocked_from(validation: &crate::cart::CartValidation) -> CheckoutBlocked {
    let first_error = validation.first_error().cloned();
    let message = first_error.as_ref().map_or_else(
        || "Your cart is empty".to_string(),
        |error| format!("{}: {}", error.title, error.message),
    );
    CheckoutBlocked {
        first_error,
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use gi_foundation_core::DonationPolicy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::cart::{MemoryStorage, ProductRef};

    fn cart_with(donation: Option<&str>) -> CartStore {
        let mut cart = CartStore::load(Box::new(MemoryStorage::new()), DonationPolicy::default());
        cart.add_item(&ProductRef::new("A").with_title("Journal"), None, 2);
        if let Some(raw) = donation {
            cart.set_donation("A", raw);
        }
        cart
    }

    fn open(cart: &CartStore) -> CheckoutSession {
        let mut rng = StdRng::seed_from_u64(1);
        CheckoutSession::open(cart, Utc::now(), &mut rng).unwrap()
    }

    fn fill(session: &mut CheckoutSession) {
        session.update_field(ContactField::Name, "Ada Lovelace");
        session.update_field(ContactField::Email, "ada@example.org");
        session.update_field(ContactField::Address, "12 Analytical Way");
        session.update_field(ContactField::City, "London");
        session.update_field(ContactField::State, "ca");
        session.update_field(ContactField::Zip, "94110");
    }

    #[test]
    fn test_open_blocked_by_invalid_cart() {
        let cart = cart_with(Some("5"));
        let mut rng = StdRng::seed_from_u64(1);
        let blocked = CheckoutSession::open(&cart, Utc::now(), &mut rng).unwrap_err();
        assert_eq!(blocked.focus_target().as_deref(), Some("donation-A"));
        assert!(blocked.message.contains("Minimum donation is $10"));

        let empty = CartStore::load(Box::new(MemoryStorage::new()), DonationPolicy::default());
        let blocked = CheckoutSession::open(&empty, Utc::now(), &mut rng).unwrap_err();
        assert!(blocked.focus_target().is_none());
    }

    #[test]
    fn test_open_generates_reference() {
        let cart = cart_with(Some("15"));
        let session = open(&cart);
        assert_eq!(session.phase(), CheckoutPhase::FormEntry);
        assert!(is_reference(session.reference()));
    }

    #[test]
    fn test_errors_hidden_until_submit() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);

        let feedback = session.update_field(ContactField::Zip, "1234");
        assert!(!feedback.validation.is_valid);
        assert!(!feedback.show_error);

        let feedback = session.blur_field(ContactField::Zip);
        assert!(feedback.show_error);

        session.validate_form(&cart);
        let feedback = session.update_field(ContactField::Zip, "123");
        assert!(feedback.show_error);
    }

    #[test]
    fn test_state_normalized_and_tax_estimated() {
        let cart = cart_with(Some("50"));
        let mut session = open(&cart);
        assert_eq!(session.estimated_tax(cart.donation_total()), None);

        let feedback = session.update_field(ContactField::State, "ca");
        assert_eq!(feedback.value, "CA");
        assert_eq!(
            session.estimated_tax(Decimal::ONE_HUNDRED),
            Some(Decimal::new(825, 2))
        );
    }

    #[test]
    fn test_begin_submit_requires_valid_form() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);
        session.update_field(ContactField::Name, "Ada Lovelace");

        let err = session.begin_submit(&cart).unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::FieldInvalid {
                field: ContactField::Email,
                ..
            }
        ));
        assert_eq!(session.phase(), CheckoutPhase::FormEntry);
        assert!(session.form_submitted());
    }

    #[test]
    fn test_begin_submit_rechecks_cart() {
        let mut cart = cart_with(Some("15"));
        let mut session = open(&cart);
        fill(&mut session);
        cart.set_donation("A", "");

        let err = session.begin_submit(&cart).unwrap_err();
        assert!(matches!(err, CheckoutError::CartInvalid(_)));
    }

    #[test]
    fn test_single_flight_submit() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);
        fill(&mut session);

        let intent = session.begin_submit(&cart).unwrap();
        assert_eq!(intent.amount, Decimal::new(30, 0));
        assert_eq!(intent.amount_minor, 3000);
        assert_eq!(intent.reference, session.reference());

        assert_eq!(
            session.begin_submit(&cart).unwrap_err(),
            CheckoutError::AlreadySubmitting
        );
    }

    #[test]
    fn test_failure_preserves_cart_and_form() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);
        fill(&mut session);
        let reference = session.reference().to_string();

        session.begin_submit(&cart).unwrap();
        session.fail("Card declined").unwrap();

        assert_eq!(session.phase(), CheckoutPhase::Failed);
        assert_eq!(session.last_error(), Some("Card declined"));
        assert_eq!(session.contact().name, "Ada Lovelace");
        assert_eq!(cart.item_count(), 2);

        // Retry goes straight back through the gate.
        session.begin_submit(&cart).unwrap();
        assert_eq!(session.phase(), CheckoutPhase::Submitting);
        assert_eq!(session.reference(), reference);
    }

    #[test]
    fn test_complete_clears_cart() {
        let mut cart = cart_with(Some("15"));
        let mut session = open(&cart);
        fill(&mut session);

        let intent = session.begin_submit(&cart).unwrap();
        let receipt = CheckoutReceipt::card(&intent, "pay_1".to_string(), PaymentStatus::Completed);
        session.complete(receipt, &mut cart).unwrap();

        assert_eq!(session.phase(), CheckoutPhase::Success);
        assert!(cart.is_empty());
        assert_eq!(session.receipt().unwrap().payment_id.as_deref(), Some("pay_1"));
    }

    #[test]
    fn test_complete_outside_submitting_fails() {
        let mut cart = cart_with(Some("15"));
        let mut session = open(&cart);
        let intent = PaymentIntent {
            method: PaymentMethod::Card,
            reference: session.reference().to_string(),
            amount: Decimal::ONE,
            amount_minor: 100,
            contact: ContactForm::default(),
            note: String::new(),
        };
        let receipt = CheckoutReceipt::manual(&intent);
        assert!(session.complete(receipt, &mut cart).is_err());
        assert!(!cart.is_empty());
    }

    #[test]
    fn test_manual_transfer_flow() {
        let mut cart = cart_with(Some("15"));
        let mut session = open(&cart);
        fill(&mut session);

        assert_eq!(
            session.confirm_manual_transfer(&mut cart).unwrap_err(),
            CheckoutError::WrongMethod(PaymentMethod::Card)
        );

        session.select_method(PaymentMethod::Zelle);
        let (intent, receipt) = session.confirm_manual_transfer(&mut cart).unwrap();
        assert_eq!(intent.method, PaymentMethod::Zelle);
        assert_eq!(receipt.status, PaymentStatus::AwaitingTransfer);
        assert_eq!(session.phase(), CheckoutPhase::Success);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_card_widget_armed_once_per_opening() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);
        let reference = session.reference().to_string();

        // Card is the default, so opening arms the widget.
        let opening = session.opening_method();
        assert_eq!(opening.method, PaymentMethod::Card);
        assert!(opening.arm_card_widget);
        assert!(!session.arm_card_widget());

        assert!(!session.select_method(PaymentMethod::CashApp).arm_card_widget);
        assert!(!session.select_method(PaymentMethod::Card).arm_card_widget);
        assert!(!session.select_method(PaymentMethod::Card).arm_card_widget);
        assert_eq!(session.reference(), reference);

        // The next opening arms again.
        let fresh = open(&cart);
        assert!(fresh.opening_method().arm_card_widget);
    }

    #[test]
    fn test_dismiss_error_returns_to_form_entry() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);
        fill(&mut session);
        assert!(!session.dismiss_error());

        session.begin_submit(&cart).unwrap();
        assert!(!session.dismiss_error());
        assert_eq!(session.phase(), CheckoutPhase::Submitting);

        session.fail("Card declined").unwrap();
        assert!(session.dismiss_error());
        assert_eq!(session.phase(), CheckoutPhase::FormEntry);
        assert_eq!(session.last_error(), None);
        assert_eq!(session.contact().name, "Ada Lovelace");
        assert!(!session.dismiss_error());
    }

    #[test]
    fn test_cancel_closes() {
        let cart = cart_with(Some("15"));
        let mut session = open(&cart);
        session.cancel();
        assert!(!session.is_open());
        assert!(matches!(
            session.pre_tokenize(&cart),
            Err(CheckoutError::WrongPhase(CheckoutPhase::Closed))
        ));
    }
}
