//! Donor receipts and admin notifications.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates. Messages are
//! built as [`OutgoingEmail`] values first so what would be sent can be
//! inspected without a mail server.

use askama::Template;
use gi_foundation_core::{PaymentStatus, TransactionKind, format_usd, from_minor_units};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use super::transactions::TransactionRecord;
use crate::config::EmailConfig;

/// Organization name used in subjects and bodies.
pub const ORGANIZATION: &str = "GI Associates Foundation";

/// Cause line used in donation receipts.
pub const CAUSE: &str = "Victims of Domestic Violence & Human Trafficking";

#[derive(Template)]
#[template(path = "email/donation_receipt.html")]
struct DonationReceiptHtml<'a> {
    name: &'a str,
    amount: &'a str,
    transaction_id: &'a str,
    date: &'a str,
    organization: &'a str,
    cause: &'a str,
}

#[derive(Template)]
#[template(path = "email/donation_receipt.txt")]
struct DonationReceiptText<'a> {
    name: &'a str,
    amount: &'a str,
    transaction_id: &'a str,
    date: &'a str,
    organization: &'a str,
    cause: &'a str,
}

/// One line of an order email.
struct LineView {
    name: String,
    quantity: u32,
    total: String,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    amount: &'a str,
    reference: &'a str,
    items: &'a [LineView],
    address: &'a str,
    organization: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    amount: &'a str,
    reference: &'a str,
    items: &'a [LineView],
    address: &'a str,
    organization: &'a str,
}

#[derive(Template)]
#[template(path = "email/transfer_pending.html")]
struct TransferPendingHtml<'a> {
    name: &'a str,
    amount: &'a str,
    reference: &'a str,
    method: &'a str,
    organization: &'a str,
}

#[derive(Template)]
#[template(path = "email/transfer_pending.txt")]
struct TransferPendingText<'a> {
    name: &'a str,
    amount: &'a str,
    reference: &'a str,
    method: &'a str,
    organization: &'a str,
}

#[derive(Template)]
#[template(path = "email/admin_notification.html")]
struct AdminNotificationHtml<'a> {
    kind: &'a str,
    amount: &'a str,
    method: &'a str,
    status: &'a str,
    transaction_id: &'a str,
    payment_id: &'a str,
    reference: &'a str,
    name: &'a str,
    email: &'a str,
    address: &'a str,
    items: &'a [LineView],
    environment: &'a str,
}

#[derive(Template)]
#[template(path = "email/admin_notification.txt")]
struct AdminNotificationText<'a> {
    kind: &'a str,
    amount: &'a str,
    method: &'a str,
    status: &'a str,
    transaction_id: &'a str,
    payment_id: &'a str,
    reference: &'a str,
    name: &'a str,
    email: &'a str,
    address: &'a str,
    items: &'a [LineView],
    environment: &'a str,
}

#[derive(Template)]
#[template(path = "email/payment_completed.html")]
struct PaymentCompletedHtml<'a> {
    payment_id: &'a str,
    amount: &'a str,
}

#[derive(Template)]
#[template(path = "email/payment_completed.txt")]
struct PaymentCompletedText<'a> {
    payment_id: &'a str,
    amount: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    ///
    /// # Errors
    ///
    /// Returns error if an address is invalid or delivery fails.
    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(email.to.clone()))?)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )?;

        self.mailer.send(message).await?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

fn line_views(record: &TransactionRecord) -> Vec<LineView> {
    record
        .items
        .iter()
        .map(|item| LineView {
            name: item.name.clone(),
            quantity: item.quantity,
            total: format_usd(item.price * rust_decimal::Decimal::from(item.quantity)),
        })
        .collect()
}

/// Donor-facing message for a logged transaction, if one applies.
///
/// Completed charges get a receipt (donation) or confirmation (shop order);
/// manual transfers get payment instructions. Other statuses send nothing.
///
/// # Errors
///
/// Returns error if a template fails to render.
pub fn donor_email(record: &TransactionRecord) -> Result<Option<OutgoingEmail>, EmailError> {
    let Some(customer) = record.customer.as_ref().filter(|c| !c.email.trim().is_empty()) else {
        return Ok(None);
    };
    let amount = format_usd(record.amount);
    let reference = record.reference.as_deref().unwrap_or(record.transaction_id.as_str());
    let name = customer.name.as_str();

    let email = match (record.status, record.kind) {
        (PaymentStatus::AwaitingTransfer, _) => {
            let method = record.method.label();
            OutgoingEmail {
                to: customer.email.clone(),
                subject: format!("Complete your {method} payment - {ORGANIZATION}"),
                text: TransferPendingText { name, amount: &amount, reference, method, organization: ORGANIZATION }
                    .render()?,
                html: TransferPendingHtml { name, amount: &amount, reference, method, organization: ORGANIZATION }
                    .render()?,
            }
        }
        (PaymentStatus::Completed | PaymentStatus::Approved, TransactionKind::Donation) => {
            let date = record.timestamp.format("%B %-d, %Y").to_string();
            let transaction_id = record.transaction_id.as_str();
            OutgoingEmail {
                to: customer.email.clone(),
                subject: format!("Thank you for your donation - {ORGANIZATION}"),
                text: DonationReceiptText {
                    name,
                    amount: &amount,
                    transaction_id,
                    date: &date,
                    organization: ORGANIZATION,
                    cause: CAUSE,
                }
                .render()?,
                html: DonationReceiptHtml {
                    name,
                    amount: &amount,
                    transaction_id,
                    date: &date,
                    organization: ORGANIZATION,
                    cause: CAUSE,
                }
                .render()?,
            }
        }
        (PaymentStatus::Completed | PaymentStatus::Approved, TransactionKind::ShopOrder) => {
            let items = line_views(record);
            let address = customer.mailing_address();
            OutgoingEmail {
                to: customer.email.clone(),
                subject: format!("Order Confirmation - {ORGANIZATION}"),
                text: OrderConfirmationText {
                    name,
                    amount: &amount,
                    reference,
                    items: &items,
                    address: &address,
                    organization: ORGANIZATION,
                }
                .render()?,
                html: OrderConfirmationHtml {
                    name,
                    amount: &amount,
                    reference,
                    items: &items,
                    address: &address,
                    organization: ORGANIZATION,
                }
                .render()?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(email))
}

/// Admin notice for a logged transaction.
///
/// # Errors
///
/// Returns error if a template fails to render.
pub fn admin_email(record: &TransactionRecord, to: &str) -> Result<OutgoingEmail, EmailError> {
    let amount = format_usd(record.amount);
    let items = line_views(record);
    let customer = record.customer.clone().unwrap_or_default();
    let address = customer.mailing_address();
    let status = format!("{:?}", record.status);
    let kind = record.kind.label();
    let method = record.method.label();
    let payment_id = record.square_payment_id.as_deref().unwrap_or("-");
    let reference = record.reference.as_deref().unwrap_or("-");

    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: format!("New {kind} - {ORGANIZATION}"),
        text: AdminNotificationText {
            kind,
            amount: &amount,
            method,
            status: &status,
            transaction_id: record.transaction_id.as_str(),
            payment_id,
            reference,
            name: &customer.name,
            email: &customer.email,
            address: &address,
            items: &items,
            environment: &record.environment,
        }
        .render()?,
        html: AdminNotificationHtml {
            kind,
            amount: &amount,
            method,
            status: &status,
            transaction_id: record.transaction_id.as_str(),
            payment_id,
            reference,
            name: &customer.name,
            email: &customer.email,
            address: &address,
            items: &items,
            environment: &record.environment,
        }
        .render()?,
    })
}

/// Admin notice for a webhook-reported completion.
///
/// # Errors
///
/// Returns error if a template fails to render.
pub fn payment_completed_email(
    payment_id: &str,
    amount_minor: Option<i64>,
    to: &str,
) -> Result<OutgoingEmail, EmailError> {
    let amount = amount_minor.map_or_else(|| "unknown".to_string(), |m| format_usd(from_minor_units(m)));
    Ok(OutgoingEmail {
        to: to.to_string(),
        subject: format!("Payment Completed - {ORGANIZATION}"),
        text: PaymentCompletedText { payment_id, amount: &amount }.render()?,
        html: PaymentCompletedHtml { payment_id, amount: &amount }.render()?,
    })
}

/// Sends notifications when configured; logs otherwise.
///
/// Delivery failures are logged and never surface to the caller: a payment
/// that went through must not be reported as failed because mail did not.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    email: Option<EmailService>,
    admin_email: Option<String>,
}

impl Notifier {
    #[must_use]
    pub fn new(email: Option<EmailService>, admin_email: Option<String>) -> Self {
        Self { email, admin_email }
    }

    /// A notifier that only logs.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.email.is_some()
    }

    /// Messages that [`Self::transaction_recorded`] would send.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn messages_for(&self, record: &TransactionRecord) -> Result<Vec<OutgoingEmail>, EmailError> {
        let mut messages = Vec::new();
        if let Some(donor) = donor_email(record)? {
            messages.push(donor);
        }
        let notify_admin = record.status.is_success();
        if let Some(admin) = self.admin_email.as_deref().filter(|_| notify_admin) {
            messages.push(admin_email(record, admin)?);
        }
        Ok(messages)
    }

    /// Notify the donor and the admin about a logged transaction.
    pub async fn transaction_recorded(&self, record: &TransactionRecord) {
        match self.messages_for(record) {
            Ok(messages) => self.deliver(&messages).await,
            Err(e) => tracing::error!(
                transaction_id = %record.transaction_id,
                error = %e,
                "Failed to render transaction emails"
            ),
        }
    }

    /// Notify the admin that the processor reported a payment complete.
    pub async fn payment_completed(&self, payment_id: &str, amount_minor: Option<i64>) {
        let Some(admin) = self.admin_email.as_deref() else {
            return;
        };
        match payment_completed_email(payment_id, amount_minor, admin) {
            Ok(message) => self.deliver(std::slice::from_ref(&message)).await,
            Err(e) => tracing::error!(payment_id, error = %e, "Failed to render payment email"),
        }
    }

    async fn deliver(&self, messages: &[OutgoingEmail]) {
        let Some(service) = &self.email else {
            for message in messages {
                tracing::info!(to = %message.to, subject = %message.subject, "Email disabled, not sent");
            }
            return;
        };
        for message in messages {
            if let Err(e) = service.send(message).await {
                tracing::error!(to = %message.to, subject = %message.subject, error = %e, "Failed to send email");
            }
        }
    }
}
