//! Contact and shipping form state.

use std::collections::BTreeSet;

use gi_foundation_core::{ContactField, FieldValidation, validate_field};
use serde::{Deserialize, Serialize};

use crate::cart::CartValidation;

/// Raw contact/shipping values as typed by the donor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl ContactForm {
    #[must_use]
    pub fn value(&self, field: ContactField) -> &str {
        match field {
            ContactField::Name => &self.name,
            ContactField::Email => &self.email,
            ContactField::Address => &self.address,
            ContactField::City => &self.city,
            ContactField::State => &self.state,
            ContactField::Zip => &self.zip,
        }
    }

    pub fn set(&mut self, field: ContactField, value: String) {
        let slot = match field {
            ContactField::Name => &mut self.name,
            ContactField::Email => &mut self.email,
            ContactField::Address => &mut self.address,
            ContactField::City => &mut self.city,
            ContactField::State => &mut self.state,
            ContactField::Zip => &mut self.zip,
        };
        *slot = value;
    }

    #[must_use]
    pub fn validate(&self, field: ContactField) -> FieldValidation {
        validate_field(field, self.value(field))
    }
}

/// Per-field outcome, with whether the error should be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFeedback {
    pub field: ContactField,
    /// The normalized value now held by the form.
    pub value: String,
    pub validation: FieldValidation,
    pub show_error: bool,
}

impl FieldFeedback {
    /// Message to display, empty when valid or hidden.
    #[must_use]
    pub fn visible_message(&self) -> &str {
        if self.show_error && !self.validation.is_valid {
            &self.validation.message
        } else {
            ""
        }
    }
}

/// Full-form validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormReport {
    pub fields: Vec<FieldFeedback>,
    pub cart: CartValidation,
}

impl FormReport {
    /// True when every field and the cart pass.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.cart.is_valid && self.fields.iter().all(|f| f.validation.is_valid)
    }

    #[must_use]
    pub fn first_invalid(&self) -> Option<&FieldFeedback> {
        self.fields.iter().find(|f| !f.validation.is_valid)
    }
}

/// Feedback for every field, in form order.
pub(crate) fn feedback_for_all(
    form: &ContactForm,
    touched: &BTreeSet<ContactField>,
    form_submitted: bool,
) -> Vec<FieldFeedback> {
    ContactField::ALL
        .into_iter()
        .map(|field| FieldFeedback {
            field,
            value: form.value(field).to_string(),
            validation: form.validate(field),
            show_error: form_submitted || touched.contains(&field),
        })
        .collect()
}
