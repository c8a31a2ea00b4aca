//! Payment method, payment status and transaction kind enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the donor pays at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Card tokenized by the processor's web widget.
    #[default]
    Card,
    /// Manual transfer via Cash App.
    CashApp,
    /// Manual transfer via Zelle.
    Zelle,
}

impl PaymentMethod {
    pub const ALL: [Self; 3] = [Self::Card, Self::CashApp, Self::Zelle];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::CashApp => "cashapp",
            Self::Zelle => "zelle",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Card => "Credit / debit card",
            Self::CashApp => "Cash App",
            Self::Zelle => "Zelle",
        }
    }

    /// Manual methods are confirmed by the donor, not by the processor.
    #[must_use]
    pub const fn is_manual(self) -> bool {
        matches!(self, Self::CashApp | Self::Zelle)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognized payment method name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown payment method: {0}")]
pub struct UnknownPaymentMethod(pub String);

impl FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPaymentMethod(s.to_string()))
    }
}

/// Payment status as reported by the processor, plus the local
/// awaiting-transfer state used for manual methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Approved,
    Completed,
    Canceled,
    Failed,
    Refunded,
    /// Donor says they sent a Cash App / Zelle transfer; not yet reconciled.
    AwaitingTransfer,
    /// Any status string this build does not know about.
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Parse a processor status string; unknown values map to `Unknown`.
    #[must_use]
    pub fn from_processor(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "APPROVED" => Self::Approved,
            "COMPLETED" => Self::Completed,
            "CANCELED" | "CANCELLED" => Self::Canceled,
            "FAILED" => Self::Failed,
            "REFUNDED" => Self::Refunded,
            "AWAITING_TRANSFER" => Self::AwaitingTransfer,
            _ => Self::Unknown,
        }
    }

    /// True if money has been (or is being) captured.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Approved | Self::Completed | Self::AwaitingTransfer)
    }
}

/// What a transaction pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Donation,
    ShopOrder,
}

impl TransactionKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Donation => "Donation",
            Self::ShopOrder => "Shop order",
        }
    }
}
