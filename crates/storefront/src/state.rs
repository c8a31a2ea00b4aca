//! Application state shared across handlers.

use std::sync::Arc;

use gi_foundation_core::DonationPolicy;

use crate::catalog::Catalog;
use crate::config::StorefrontConfig;
use crate::payments::{PaymentError, SquareClient};
use crate::render::CartRenderer;
use crate::services::email::{EmailService, Notifier};
use crate::services::transactions::{TransactionLog, TransactionRecord};

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("email transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the catalog, payment client and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: Catalog,
    square: SquareClient,
    transactions: TransactionLog,
    notifier: Notifier,
    renderer: CartRenderer,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the Square client or SMTP transport cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let square = SquareClient::new(&config.square)?;
        let email = config.email.as_ref().map(EmailService::new).transpose()?;
        if email.is_none() {
            tracing::warn!("SMTP_HOST not set, donor and admin emails are disabled");
        }
        let notifier = Notifier::new(email, config.admin_email.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                catalog: Catalog::new(&config.catalog_path),
                transactions: TransactionLog::new(&config.data_dir),
                renderer: CartRenderer::new(config.payment_instructions()),
                square,
                notifier,
                config,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Get a reference to the Square payments client.
    #[must_use]
    pub fn square(&self) -> &SquareClient {
        &self.inner.square
    }

    #[must_use]
    pub fn transactions(&self) -> &TransactionLog {
        &self.inner.transactions
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    #[must_use]
    pub fn renderer(&self) -> &CartRenderer {
        &self.inner.renderer
    }

    /// Processor environment name stored with each transaction.
    #[must_use]
    pub fn environment(&self) -> &'static str {
        self.inner.config.square.environment.as_str()
    }

    /// Log a finished payment and send its e-mails.
    ///
    /// The payment already happened, so neither a log failure nor an e-mail
    /// failure is returned to the caller. Log failures go to Sentry.
    pub async fn record_transaction(&self, record: &TransactionRecord) {
        if let Err(e) = self.inner.transactions.append(record).await {
            let event_id = sentry::capture_error(&e);
            tracing::error!(
                error = %e,
                transaction_id = %record.transaction_id,
                sentry_event_id = %event_id,
                "Failed to log transaction"
            );
        }
        self.inner.notifier.transaction_recorded(record).await;
    }

    /// Donation rules applied to every cart.
    #[must_use]
    pub fn donation_policy(&self) -> DonationPolicy {
        self.inner.config.donation
    }
}
