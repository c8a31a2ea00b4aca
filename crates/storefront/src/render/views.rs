//! Display data for cart and checkout templates.
//!
//! Everything here is pre-formatted so templates only print strings and
//! branch on booleans.

use gi_foundation_core::{
    ContactField, DonationPolicy, PaymentMethod, format_usd, validate_donation_input,
};

use crate::cart::{CartItem, CartValidation};
use crate::checkout::{CheckoutPhase, CheckoutReceipt, CheckoutSession, FieldFeedback};

use super::{FocusState, LayoutMode};

/// Cart line item display data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub quantity: u32,
    /// Quantities posted by the minus and plus buttons.
    pub quantity_down: u32,
    pub quantity_up: u32,
    /// Value for the donation input: the typed text while focused, otherwise
    /// the stored amount (`"15.00"`) or empty.
    pub donation_input: String,
    pub line_total: String,
    pub error: Option<String>,
    pub has_focus: bool,
    pub caret: u32,
}

impl CartItemView {
    pub(super) fn new(
        item: &CartItem,
        validation: &CartValidation,
        focus: Option<&FocusState>,
        show_errors: bool,
        policy: &DonationPolicy,
    ) -> Self {
        let focus = focus.filter(|f| f.item_id == item.id);
        let donation_input = focus.map_or_else(
            || {
                item.donation_per_unit
                    .map(|amount| format!("{amount:.2}"))
                    .unwrap_or_default()
            },
            |f| f.raw_value.clone(),
        );
        // Typed text is judged as typed, so an amount too large to store
        // still explains itself. A missing amount is only flagged once the
        // donor tried to check out.
        let error = match focus.filter(|f| !f.raw_value.trim().is_empty()) {
            Some(f) => {
                let typed = validate_donation_input(&f.raw_value, policy);
                (!typed.is_valid).then_some(typed.message)
            }
            None => validation
                .error_for(&item.id)
                .filter(|_| show_errors || item.donation_per_unit.is_some())
                .map(str::to_string),
        };

        Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            image: item.image.clone(),
            quantity: item.quantity,
            quantity_down: item.quantity.saturating_sub(1),
            quantity_up: item.quantity.saturating_add(1),
            donation_input,
            line_total: format_usd(item.line_total()),
            error,
            has_focus: focus.is_some(),
            caret: focus.map_or(0, |f| f.caret),
        }
    }
}

/// Cart totals and items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub badge: String,
    pub donation_total: String,
    pub minimum_label: String,
    pub checkout_enabled: bool,
    pub is_empty: bool,
}

/// One mount of the cart (desktop sidebar or mobile overlay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceView {
    pub layout: LayoutMode,
    pub dom_id: &'static str,
    pub css_block: &'static str,
    pub is_open: bool,
    /// The surface matching the current layout. Only it renders checkout and
    /// carries the canonical input ids.
    pub is_active: bool,
    pub id_prefix: String,
    pub show_checkout: bool,
}

impl SurfaceView {
    pub(super) fn new(layout: LayoutMode, active: LayoutMode, open: bool, checkout: bool) -> Self {
        let is_active = layout == active;
        Self {
            layout,
            dom_id: layout.dom_id(),
            css_block: layout.css_block(),
            is_open: open && is_active,
            is_active,
            id_prefix: if is_active {
                String::new()
            } else {
                format!("{}-", layout.as_str())
            },
            show_checkout: checkout && is_active,
        }
    }

    /// DOM id of the donation input for `item_id` on this surface.
    #[must_use]
    pub fn donation_input_id(&self, item_id: &str) -> String {
        format!("{}donation-{item_id}", self.id_prefix)
    }
}

/// One contact form input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub name: &'static str,
    pub label: &'static str,
    pub value: String,
    pub message: String,
    pub input_type: &'static str,
    pub autocomplete: &'static str,
    pub max_length: Option<u32>,
}

impl FieldView {
    #[must_use]
    pub fn from_feedback(feedback: &FieldFeedback) -> Self {
        let (input_type, autocomplete, max_length) = match feedback.field {
            ContactField::Name => ("text", "name", None),
            ContactField::Email => ("email", "email", None),
            ContactField::Address => ("text", "street-address", None),
            ContactField::City => ("text", "address-level2", None),
            ContactField::State => ("text", "address-level1", Some(2)),
            ContactField::Zip => ("text", "postal-code", Some(10)),
        };
        Self {
            name: feedback.field.as_str(),
            label: feedback.field.label(),
            value: feedback.value.clone(),
            message: feedback.visible_message().to_string(),
            input_type,
            autocomplete,
            max_length,
        }
    }
}

/// A payment method radio option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Manual-transfer and card widget settings shown in the checkout panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentInstructions {
    pub cashapp_handle: Option<String>,
    pub zelle_email: Option<String>,
    pub zelle_phone: Option<String>,
    pub square_app_id: String,
    pub square_location_id: String,
    pub square_sdk_url: String,
}

/// Payment instructions for the selected method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPanelView {
    pub method: PaymentMethod,
    pub is_card: bool,
    pub is_cashapp: bool,
    pub is_zelle: bool,
    pub reference: String,
    pub total: String,
    pub cashapp_handle: String,
    pub zelle_email: String,
    pub zelle_phone: String,
}

impl MethodPanelView {
    #[must_use]
    pub fn new(
        method: PaymentMethod,
        reference: &str,
        total: String,
        instructions: &PaymentInstructions,
    ) -> Self {
        Self {
            method,
            is_card: method == PaymentMethod::Card,
            is_cashapp: method == PaymentMethod::CashApp,
            is_zelle: method == PaymentMethod::Zelle,
            reference: reference.to_string(),
            total,
            cashapp_handle: instructions.cashapp_handle.clone().unwrap_or_default(),
            zelle_email: instructions.zelle_email.clone().unwrap_or_default(),
            zelle_phone: instructions.zelle_phone.clone().unwrap_or_default(),
        }
    }
}

/// Totals block shown in checkout (refreshed when the state field changes).
///
/// The tax line is an estimate for the donor's records. The amount charged is
/// always `donation_total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsView {
    pub donation_total: String,
    pub tax: Option<String>,
    pub tax_state: String,
}

/// Confirmation shown after checkout succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptView {
    pub reference: String,
    pub method_label: &'static str,
    pub amount: String,
    pub email: String,
    pub payment_id: String,
    pub awaiting_transfer: bool,
}

impl From<&CheckoutReceipt> for ReceiptView {
    fn from(receipt: &CheckoutReceipt) -> Self {
        Self {
            reference: receipt.reference.clone(),
            method_label: receipt.method.label(),
            amount: format_usd(receipt.amount),
            email: receipt.email.clone(),
            payment_id: receipt.payment_id.clone().unwrap_or_default(),
            awaiting_transfer: receipt.method.is_manual(),
        }
    }
}

/// Checkout panel display data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutView {
    pub reference: String,
    pub methods: Vec<MethodOption>,
    pub method_panel: MethodPanelView,
    pub fields: Vec<FieldView>,
    pub totals: TotalsView,
    pub last_error: Option<String>,
    pub submitting: bool,
    pub receipt: Option<ReceiptView>,
    pub square_app_id: String,
    pub square_location_id: String,
    pub square_sdk_url: String,
}

impl CheckoutView {
    pub(super) fn new(
        session: &CheckoutSession,
        totals: TotalsView,
        instructions: &PaymentInstructions,
    ) -> Self {
        let method = session.selected_method();
        let receipt = (session.phase() == CheckoutPhase::Success)
            .then(|| session.receipt().map(ReceiptView::from))
            .flatten();
        Self {
            reference: session.reference().to_string(),
            methods: PaymentMethod::ALL
                .into_iter()
                .map(|m| MethodOption {
                    value: m.as_str(),
                    label: m.label(),
                    selected: m == method,
                })
                .collect(),
            method_panel: MethodPanelView::new(
                method,
                session.reference(),
                totals.donation_total.clone(),
                instructions,
            ),
            fields: session
                .field_feedback()
                .iter()
                .map(FieldView::from_feedback)
                .collect(),
            totals,
            last_error: session.last_error().map(str::to_string),
            submitting: session.phase() == CheckoutPhase::Submitting,
            receipt,
            square_app_id: instructions.square_app_id.clone(),
            square_location_id: instructions.square_location_id.clone(),
            square_sdk_url: instructions.square_sdk_url.clone(),
        }
    }
}
