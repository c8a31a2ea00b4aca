//! Append-only transaction log.
//!
//! Each completed or pending payment becomes one [`TransactionRecord`] in
//! `<dir>/transactions/YYYY-MM-DD.json`, a pretty-printed JSON array. Shop
//! orders are also written to `<dir>/orders/`. All writes go through one
//! mutex so concurrent requests never interleave a read-modify-write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gi_foundation_core::{
    PaymentMethod, PaymentStatus, TransactionId, TransactionKind, from_minor_units,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cart::CartItem;
use crate::checkout::{CheckoutReceipt, ContactForm, PaymentIntent};

/// Errors from reading or writing log files.
#[derive(Debug, Error)]
pub enum TransactionLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt log file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Donor contact details as recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

impl CustomerRecord {
    /// Single-line mailing address.
    #[must_use]
    pub fn mailing_address(&self) -> String {
        let region = format!("{} {}", self.state, self.zip);
        [self.address.as_str(), self.city.as_str(), region.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<&ContactForm> for CustomerRecord {
    fn from(form: &ContactForm) -> Self {
        Self {
            name: form.name.trim().to_string(),
            email: form.email.trim().to_string(),
            address: form.address.trim().to_string(),
            city: form.city.trim().to_string(),
            state: form.state.clone(),
            zip: form.zip.clone(),
        }
    }
}

/// One purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    /// Donation per unit.
    pub price: Decimal,
}

impl From<&CartItem> for RecordItem {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id.to_string(),
            name: item.title.clone(),
            quantity: item.quantity,
            price: item.donation_per_unit.unwrap_or_default(),
        }
    }
}

/// A logged payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub square_payment_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[serde(default)]
    pub customer: Option<CustomerRecord>,
    #[serde(default)]
    pub items: Vec<RecordItem>,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Record for a finished checkout. `items` must be captured before the
    /// cart is cleared.
    #[must_use]
    pub fn from_checkout(
        intent: &PaymentIntent,
        receipt: &CheckoutReceipt,
        items: &[CartItem],
        environment: &str,
    ) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            square_payment_id: receipt.payment_id.clone(),
            kind: TransactionKind::ShopOrder,
            method: receipt.method,
            reference: Some(receipt.reference.clone()),
            amount: receipt.amount,
            status: receipt.status,
            customer: Some(CustomerRecord::from(&intent.contact)),
            items: items.iter().map(RecordItem::from).collect(),
            timestamp: Utc::now(),
            environment: environment.to_string(),
            updated_at: None,
        }
    }

    /// Record for a bare charge made through the relay endpoint.
    #[must_use]
    pub fn from_charge(
        kind: TransactionKind,
        payment_id: &str,
        status: PaymentStatus,
        amount_minor: i64,
        customer: Option<CustomerRecord>,
        environment: &str,
    ) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            square_payment_id: Some(payment_id.to_string()),
            kind,
            method: PaymentMethod::Card,
            reference: None,
            amount: from_minor_units(amount_minor),
            status,
            customer,
            items: Vec::new(),
            timestamp: Utc::now(),
            environment: environment.to_string(),
            updated_at: None,
        }
    }
}

/// `txn_<32 hex>`.
#[must_use]
pub fn new_transaction_id() -> TransactionId {
    TransactionId::new(format!("txn_{}", Uuid::new_v4().simple()))
}

/// File-backed transaction log.
#[derive(Debug)]
pub struct TransactionLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl TransactionLog {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn transactions_dir(&self) -> PathBuf {
        self.dir.join("transactions")
    }

    #[must_use]
    pub fn orders_dir(&self) -> PathBuf {
        self.dir.join("orders")
    }

    /// Append a record to today's file (and the orders file for shop orders).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read, parsed or written. Existing
    /// files are never overwritten when they fail to parse.
    pub async fn append(&self, record: &TransactionRecord) -> Result<(), TransactionLogError> {
        let _guard = self.write_lock.lock().await;

        append_to(&self.transactions_dir(), record).await?;
        if record.kind == TransactionKind::ShopOrder {
            append_to(&self.orders_dir(), record).await?;
        }

        tracing::info!(
            transaction_id = %record.transaction_id,
            kind = ?record.kind,
            method = %record.method,
            status = ?record.status,
            "Transaction logged"
        );
        Ok(())
    }

    /// Set the status of the record with `payment_id`, newest file first.
    ///
    /// Returns `false` if no record matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or written.
    pub async fn update_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, TransactionLogError> {
        let _guard = self.write_lock.lock().await;

        let updated = update_in(&self.transactions_dir(), payment_id, status).await?;
        if updated {
            // Orders mirror shop-order transactions; keep them in step.
            update_in(&self.orders_dir(), payment_id, status).await?;
        }
        Ok(updated)
    }

    /// All records in one day's transactions file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn records_for(
        &self,
        day: chrono::NaiveDate,
    ) -> Result<Vec<TransactionRecord>, TransactionLogError> {
        read_records(&day_file(&self.transactions_dir(), day)).await
    }
}

fn day_file(dir: &Path, day: chrono::NaiveDate) -> PathBuf {
    dir.join(format!("{}.json", day.format("%Y-%m-%d")))
}

async fn read_records(path: &Path) -> Result<Vec<TransactionRecord>, TransactionLogError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| TransactionLogError::Corrupt {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_records(path: &Path, records: &[TransactionRecord]) -> Result<(), TransactionLogError> {
    let json = serde_json::to_vec_pretty(records)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

async fn append_to(dir: &Path, record: &TransactionRecord) -> Result<(), TransactionLogError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = day_file(dir, record.timestamp.date_naive());
    let mut records = read_records(&path).await?;
    records.push(record.clone());
    write_records(&path, &records).await
}

async fn update_in(
    dir: &Path,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<bool, TransactionLogError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    // Day files sort chronologically by name.
    files.sort_unstable_by(|a, b| b.cmp(a));

    for path in files {
        let mut records = match read_records(&path).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable log file");
                continue;
            }
        };
        let Some(record) = records
            .iter_mut()
            .find(|r| r.square_payment_id.as_deref() == Some(payment_id))
        else {
            continue;
        };
        record.status = status;
        record.updated_at = Some(Utc::now());
        write_records(&path, &records).await?;
        return Ok(true);
    }
    Ok(false)
}
