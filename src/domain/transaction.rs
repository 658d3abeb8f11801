//! Transaction domain entity.
//! Framework-agnostic representation of a mobile-money payment.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Country code prepended to local phone numbers for the provider.
pub const COUNTRY_CODE: &str = "258";

/// Minutes a pending payment stays open before it expires.
pub const PAYMENT_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Expired => "expired",
        }
    }

    /// Human readable description returned alongside the status.
    pub fn message(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Payment awaiting confirmation",
            TransactionStatus::Success => "Payment confirmed successfully",
            TransactionStatus::Failed => "Payment failed",
            TransactionStatus::Expired => "Payment window expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only pending records move, and only into a terminal state.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_terminal()
    }

    /// Maps the provider's status vocabulary onto ours.
    pub fn from_gateway(raw: &str) -> Self {
        match raw {
            "Completed" | "Success" | "success" => TransactionStatus::Success,
            "Failed" | "failed" | "Cancelled" => TransactionStatus::Failed,
            _ => TransactionStatus::Pending,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity representing a payment transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub order_reference: String,
    pub amount: f64,
    pub phone_number: String,
    pub formatted_phone: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub checkout_request_id: Option<String>,
    pub mpesa_receipt: Option<String>,
}

impl Transaction {
    pub fn new(
        transaction_id: String,
        order_reference: String,
        amount: f64,
        phone_number: String,
        checkout_request_id: Option<String>,
    ) -> Self {
        Self::new_at(
            transaction_id,
            order_reference,
            amount,
            phone_number,
            checkout_request_id,
            Utc::now(),
        )
    }

    pub fn new_at(
        transaction_id: String,
        order_reference: String,
        amount: f64,
        phone_number: String,
        checkout_request_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let formatted_phone = format_phone(&phone_number);
        Self {
            transaction_id,
            order_reference,
            amount,
            phone_number,
            formatted_phone,
            status: TransactionStatus::Pending,
            created_at: now,
            expires_at: now + Duration::minutes(PAYMENT_WINDOW_MINUTES),
            confirmed_at: None,
            checkout_request_id,
            mpesa_receipt: None,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending && now >= self.expires_at
    }
}

/// Prefixes a local 9-digit number with the country code.
pub fn format_phone(phone_number: &str) -> String {
    format!("{}{}", COUNTRY_CODE, phone_number)
}

/// Locally issued id: `TXN-` followed by 16 uppercase hex characters.
pub fn generate_transaction_id() -> String {
    format!("TXN-{}", hex::encode_upper(rand::random::<[u8; 8]>()))
}
