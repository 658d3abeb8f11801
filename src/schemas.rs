use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::{Transaction, TransactionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentRequest {
    /// Total to charge, in meticais
    #[schema(example = 450.0)]
    pub amount: f64,
    /// Local 9-digit M-Pesa number
    #[schema(example = "841234567")]
    pub phone_number: String,
    #[schema(example = "ORD-ABC123")]
    pub order_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub success: bool,
    pub message: String,
    pub transaction_id: String,
    pub order_reference: String,
    pub amount: f64,
    pub phone_number: String,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

impl PaymentResponse {
    pub const STARTED: &'static str = "Payment started. Confirm on your phone.";

    pub fn started(tx: &Transaction) -> Self {
        Self {
            success: true,
            message: Self::STARTED.to_string(),
            transaction_id: tx.transaction_id.clone(),
            order_reference: tx.order_reference.clone(),
            amount: tx.amount,
            phone_number: tx.phone_number.clone(),
            status: tx.status,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub amount: f64,
    pub order_reference: String,
    pub message: String,
}

impl From<&Transaction> for PaymentStatusResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            status: tx.status,
            amount: tx.amount,
            order_reference: tx.order_reference.clone(),
            message: tx.status.message().to_string(),
        }
    }
}

/// In-band acknowledgement returned to the provider for every callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: u8,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Callback processed successfully".to_string(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            result_code: 1,
            result_desc: "Callback could not be processed".to_string(),
        }
    }
}

// Provider callback body: { "Body": { "stkCallback": { ... } } }

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<Value>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl StkCallback {
    /// Provider result code; accepts integers, whole floats and numeric strings.
    pub fn result_code(&self) -> Option<i64> {
        match self.result_code.as_ref()? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code() == Some(0)
    }

    /// Looks up a metadata item by name, rendering it as text.
    pub fn metadata_value(&self, name: &str) -> Option<String> {
        let item = self
            .callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?;

        match item.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
