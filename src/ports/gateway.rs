//! Outbound port to the mobile-money provider.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::TransactionStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway authentication failed: {0}")]
    Auth(String),

    #[error("gateway rejected the request: {0}")]
    Request(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("payment declined: {0}")]
    Declined(String),

    /// The provider accepted the request but named no transaction.
    #[error("provider returned no valid transaction id")]
    MissingTransactionId,
}

impl GatewayError {
    /// Network-level or upstream-auth failures, as opposed to a rejection.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::Auth(_) | GatewayError::Unavailable(_))
    }

    /// The provider answered but refused to start the payment. Never retried elsewhere.
    pub fn is_final(&self) -> bool {
        matches!(self, GatewayError::MissingTransactionId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Mock,
    Live,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Mock => "mock",
            GatewayMode::Live => "live",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiationRequest {
    pub phone_number: String,
    pub formatted_phone: String,
    pub amount: f64,
    pub order_reference: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInitiation {
    pub transaction_id: String,
    pub checkout_request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStatusReport {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub amount: f64,
    pub order_reference: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn mode(&self) -> GatewayMode;

    async fn initiate(&self, request: &InitiationRequest) -> Result<GatewayInitiation, GatewayError>;

    async fn query_status(&self, transaction_id: &str) -> Result<GatewayStatusReport, GatewayError>;

    /// Circuit breaker state of the underlying client, when there is one.
    fn circuit_state(&self) -> Option<String> {
        None
    }
}
