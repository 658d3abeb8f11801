//! Payment orchestration: validation, gateway strategy, lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::adapters::{LiveGateway, MockGateway};
use crate::config::Config;
use crate::domain::transaction::format_phone;
use crate::domain::{Transaction, TransactionStatus};
use crate::mpesa::MpesaClient;
use crate::ports::{
    GatewayError, GatewayInitiation, GatewayMode, InitiationRequest, PaymentGateway,
    RepositoryError, StatusChange, TransactionRepository,
};
use crate::schemas::{CallbackEnvelope, PaymentRequest, PaymentResponse, PaymentStatusResponse};
use crate::validation::{
    sanitize_string, validate_amount_range, validate_mpesa_number, ValidationError,
};

const INITIATION_FAILED: &str = "Could not start the payment. Check the number and try again.";
const RECEIPT_ITEM: &str = "MpesaReceiptNumber";

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Initiation(String),

    #[error("payment provider unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for PaymentError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(id) => PaymentError::NotFound(id),
            other => PaymentError::Internal(other.to_string()),
        }
    }
}

fn initiation_error(error: GatewayError) -> PaymentError {
    match error {
        GatewayError::Auth(_) | GatewayError::Unavailable(_) => {
            PaymentError::GatewayUnavailable(error.to_string())
        }
        GatewayError::Request(reason) => {
            PaymentError::Initiation(format!("{} ({})", INITIATION_FAILED, reason))
        }
        GatewayError::MissingTransactionId => {
            PaymentError::Initiation(format!("{} ({})", INITIATION_FAILED, error))
        }
        GatewayError::Declined(_) | GatewayError::InvalidResponse(_) => {
            PaymentError::Initiation(INITIATION_FAILED.to_string())
        }
    }
}

/// Drives the transaction lifecycle over an injected gateway and store.
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    fallback: Option<Arc<dyn PaymentGateway>>,
    store: Arc<dyn TransactionRepository>,
    simulate_confirmation_after: Option<Duration>,
    fallbacks: AtomicU64,
}

impl PaymentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn TransactionRepository>) -> Self {
        Self {
            gateway,
            fallback: None,
            store,
            simulate_confirmation_after: None,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Gateway used when the primary one fails to start a payment.
    pub fn with_fallback(mut self, fallback: Arc<dyn PaymentGateway>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Mock mode only: pending payments older than `after` count as confirmed.
    pub fn with_simulated_confirmation(mut self, after: Option<std::time::Duration>) -> Self {
        self.simulate_confirmation_after = after.and_then(|d| Duration::from_std(d).ok());
        self
    }

    /// Selects the gateway strategy once from configuration.
    pub fn from_config(config: &Config, store: Arc<dyn TransactionRepository>) -> Self {
        match config.gateway_mode() {
            GatewayMode::Mock => Self::new(Arc::new(MockGateway::random()), store)
                .with_simulated_confirmation(config.simulate_confirmation_after),
            GatewayMode::Live => {
                let client = MpesaClient::new(
                    config.mpesa_api_url.clone(),
                    config.mpesa_api_key.clone(),
                    config.mpesa_callback_url.clone(),
                );
                let service = Self::new(Arc::new(LiveGateway::new(client)), store);
                if config.fallback_to_mock {
                    service.with_fallback(Arc::new(MockGateway::random()))
                } else {
                    service
                }
            }
        }
    }

    pub fn gateway_mode(&self) -> GatewayMode {
        self.gateway.mode()
    }

    pub fn circuit_state(&self) -> Option<String> {
        self.gateway.circuit_state()
    }

    /// Number of initiations served by the fallback gateway.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub async fn tracked_transactions(&self) -> Result<usize, PaymentError> {
        Ok(self.store.count().await?)
    }

    pub async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentResponse, PaymentError> {
        validate_amount_range(request.amount)?;
        validate_mpesa_number(&request.phone_number)?;

        let order_reference = sanitize_string(&request.order_reference);
        let gateway_request = InitiationRequest {
            phone_number: request.phone_number.clone(),
            formatted_phone: format_phone(&request.phone_number),
            amount: request.amount,
            description: format!("Payment for order {}", order_reference),
            order_reference,
        };

        let initiation = match self.gateway.initiate(&gateway_request).await {
            Ok(initiation) => initiation,
            Err(error) => self.recover(error, &gateway_request).await?,
        };

        let tx = self
            .store
            .put(Transaction::new(
                initiation.transaction_id,
                gateway_request.order_reference,
                gateway_request.amount,
                gateway_request.phone_number,
                initiation.checkout_request_id,
            ))
            .await?;

        tracing::info!(
            transaction_id = %tx.transaction_id,
            order_reference = %tx.order_reference,
            amount = tx.amount,
            "Payment initiated"
        );

        Ok(PaymentResponse::started(&tx))
    }

    async fn recover(
        &self,
        error: GatewayError,
        request: &InitiationRequest,
    ) -> Result<GatewayInitiation, PaymentError> {
        let fallback = match self.fallback.as_ref() {
            Some(fallback) if !error.is_final() => fallback,
            _ => {
                tracing::warn!(
                    error = %error,
                    order_reference = %request.order_reference,
                    "Payment initiation failed"
                );
                return Err(initiation_error(error));
            }
        };

        let degraded = self.fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            error = %error,
            order_reference = %request.order_reference,
            fallbacks = degraded,
            "Primary gateway failed, serving payment from fallback gateway"
        );

        fallback.initiate(request).await.map_err(initiation_error)
    }

    pub async fn get_status(&self, transaction_id: &str) -> Result<PaymentStatusResponse, PaymentError> {
        let tx = match self.store.get(transaction_id).await {
            Ok(tx) => tx,
            Err(RepositoryError::NotFound(_)) => return self.remote_status(transaction_id).await,
            Err(e) => return Err(e.into()),
        };

        let tx = self.settle(tx, Utc::now()).await?;
        Ok(PaymentStatusResponse::from(&tx))
    }

    /// Only consulted for ids this process never issued. Never touches the store.
    async fn remote_status(&self, transaction_id: &str) -> Result<PaymentStatusResponse, PaymentError> {
        if self.gateway.mode() == GatewayMode::Live {
            match self.gateway.query_status(transaction_id).await {
                Ok(report) => {
                    return Ok(PaymentStatusResponse {
                        transaction_id: report.transaction_id,
                        status: report.status,
                        amount: report.amount,
                        order_reference: report.order_reference,
                        message: report.status.message().to_string(),
                    })
                }
                Err(e) => tracing::warn!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Provider status query failed"
                ),
            }
        }

        Err(PaymentError::NotFound(transaction_id.to_string()))
    }

    fn confirmation_due(&self, tx: &Transaction, now: DateTime<Utc>) -> bool {
        match self.simulate_confirmation_after {
            Some(after) if self.gateway.mode() == GatewayMode::Mock => {
                now - tx.created_at > after
            }
            _ => false,
        }
    }

    /// Moves a pending record to the state it should be in at `now`:
    /// simulated confirmation first, then expiry.
    async fn settle(&self, tx: Transaction, now: DateTime<Utc>) -> Result<Transaction, PaymentError> {
        if tx.status != TransactionStatus::Pending {
            return Ok(tx);
        }

        let change = if self.confirmation_due(&tx, now) {
            StatusChange::confirm(None, now)
        } else if tx.is_overdue(now) {
            StatusChange::expire()
        } else {
            return Ok(tx);
        };

        match self.store.transition(&tx.transaction_id, change).await {
            Ok(updated) => {
                tracing::info!(
                    transaction_id = %updated.transaction_id,
                    status = %updated.status,
                    "Pending payment settled"
                );
                Ok(updated)
            }
            // another writer settled it first
            Err(RepositoryError::InvalidTransition { .. }) => {
                Ok(self.store.get(&tx.transaction_id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Settles every pending record: simulated confirmations, then expiry.
    /// Returns how many records changed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, PaymentError> {
        let mut confirmed = 0;
        for tx in self.store.all().await? {
            if tx.status == TransactionStatus::Pending && self.confirmation_due(&tx, now) {
                if self.settle(tx, now).await?.status == TransactionStatus::Success {
                    confirmed += 1;
                }
            }
        }

        let expired = self.store.expire_overdue(now).await?;
        if confirmed > 0 || !expired.is_empty() {
            tracing::info!(
                confirmed,
                expired = expired.len(),
                "Swept pending payments"
            );
        }

        Ok(confirmed + expired.len())
    }

    /// Applies a provider callback. Never fails: problems are logged and
    /// reported as `false`.
    pub async fn handle_callback(&self, payload: &Value) -> bool {
        match self.apply_callback(payload).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!(error = %e, "Failed to process provider callback");
                false
            }
        }
    }

    async fn apply_callback(&self, payload: &Value) -> Result<bool, PaymentError> {
        let envelope: CallbackEnvelope = serde_json::from_value(payload.clone())
            .map_err(|e| ValidationError::new("Body.stkCallback", e.to_string()))?;
        let callback = envelope.body.stk_callback;

        if !callback.is_success() {
            tracing::info!(
                checkout_request_id = ?callback.checkout_request_id,
                result_code = ?callback.result_code(),
                result_desc = ?callback.result_desc,
                "Provider reported unsuccessful payment"
            );
            return Ok(false);
        }

        let Some(checkout_request_id) = callback.checkout_request_id.as_deref() else {
            tracing::warn!("Successful callback without CheckoutRequestID");
            return Ok(false);
        };

        let Some(tx) = self
            .store
            .find_by_checkout_request_id(checkout_request_id)
            .await?
        else {
            tracing::warn!(
                checkout_request_id = %checkout_request_id,
                "Callback does not match any transaction"
            );
            return Ok(false);
        };

        let receipt = callback.metadata_value(RECEIPT_ITEM);
        match self
            .store
            .transition(&tx.transaction_id, StatusChange::confirm(receipt, Utc::now()))
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    transaction_id = %updated.transaction_id,
                    checkout_request_id = %checkout_request_id,
                    "Payment confirmed by provider"
                );
                Ok(true)
            }
            Err(RepositoryError::InvalidTransition {
                from: TransactionStatus::Success,
                ..
            }) => {
                tracing::info!(
                    transaction_id = %tx.transaction_id,
                    "Duplicate confirmation callback ignored"
                );
                Ok(true)
            }
            Err(RepositoryError::InvalidTransition { from, .. }) => {
                tracing::warn!(
                    transaction_id = %tx.transaction_id,
                    status = %from,
                    "Confirmation arrived for a settled payment"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixedOutcome, InMemoryTransactionStore};
    use crate::ports::{GatewayStatusReport, StatusChange};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Scripted stand-in for the live provider.
    struct ScriptedGateway {
        initiation: Result<GatewayInitiation, GatewayError>,
        status: Result<GatewayStatusReport, GatewayError>,
        status_calls: Mutex<u32>,
    }

    impl ScriptedGateway {
        fn new(initiation: Result<GatewayInitiation, GatewayError>) -> Self {
            Self {
                initiation,
                status: Err(GatewayError::Unavailable("no script".to_string())),
                status_calls: Mutex::new(0),
            }
        }

        fn with_status(mut self, status: Result<GatewayStatusReport, GatewayError>) -> Self {
            self.status = status;
            self
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        fn mode(&self) -> GatewayMode {
            GatewayMode::Live
        }

        async fn initiate(&self, _request: &InitiationRequest) -> Result<GatewayInitiation, GatewayError> {
            self.initiation.clone()
        }

        async fn query_status(&self, _transaction_id: &str) -> Result<GatewayStatusReport, GatewayError> {
            *self.status_calls.lock().unwrap() += 1;
            self.status.clone()
        }
    }

    fn request(amount: f64, phone: &str, order: &str) -> PaymentRequest {
        PaymentRequest {
            amount,
            phone_number: phone.to_string(),
            order_reference: order.to_string(),
        }
    }

    fn mock_service(accept: bool) -> (PaymentService, Arc<InMemoryTransactionStore>) {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(MockGateway::new(Arc::new(FixedOutcome(accept))));
        (PaymentService::new(gateway, store.clone()), store)
    }

    fn is_local_id(id: &str) -> bool {
        id.strip_prefix("TXN-").map_or(false, |hex| {
            hex.len() == 16 && hex.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        })
    }

    fn callback(result_code: i64, checkout: &str, receipt: Option<&str>) -> Value {
        let mut items = vec![json!({"Name": "Amount", "Value": 450.0})];
        if let Some(receipt) = receipt {
            items.push(json!({"Name": "MpesaReceiptNumber", "Value": receipt}));
        }
        json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "m-1",
                    "CheckoutRequestID": checkout,
                    "ResultCode": result_code,
                    "ResultDesc": "done",
                    "CallbackMetadata": { "Item": items }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_mock_success_creates_pending_record() {
        let (service, store) = mock_service(true);

        let response = service
            .initiate(&request(450.0, "841234567", "ORD-1"))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.status, TransactionStatus::Pending);
        assert!(is_local_id(&response.transaction_id));
        assert_eq!(response.order_reference, "ORD-1");
        assert_eq!(response.phone_number, "841234567");

        let stored = store.get(&response.transaction_id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.formatted_phone, "258841234567");
        assert!(stored.checkout_request_id.is_some());
    }

    #[tokio::test]
    async fn test_mock_decline_fails_without_record() {
        let (service, store) = mock_service(false);

        let result = service.initiate(&request(450.0, "841234567", "ORD-1")).await;

        assert!(matches!(result, Err(PaymentError::Initiation(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_validation_runs_before_gateway() {
        let (service, store) = mock_service(true);

        let low = service.initiate(&request(0.5, "841234567", "ORD-2")).await;
        assert!(matches!(low, Err(PaymentError::Validation(ref e)) if e.message.contains("minimum")));

        let high = service.initiate(&request(50_000.5, "841234567", "ORD-2")).await;
        assert!(matches!(high, Err(PaymentError::Validation(_))));

        let prefix = service.initiate(&request(450.0, "123456789", "ORD-3")).await;
        assert!(
            matches!(prefix, Err(PaymentError::Validation(ref e)) if e.message.contains("invalid phone prefix"))
        );

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_through_status() {
        let (service, _store) = mock_service(true);
        let created = service
            .initiate(&request(1250.5, "871234567", "ORD-RT"))
            .await
            .unwrap();

        let status = service.get_status(&created.transaction_id).await.unwrap();
        assert_eq!(status.status, TransactionStatus::Pending);
        assert_eq!(status.amount, 1250.5);
        assert_eq!(status.order_reference, "ORD-RT");
        assert_eq!(status.message, "Payment awaiting confirmation");
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let (service, _store) = mock_service(true);
        let result = service.get_status("TXN-NONEXISTENT").await;
        assert!(matches!(result, Err(PaymentError::NotFound(ref id)) if id == "TXN-NONEXISTENT"));
    }

    #[tokio::test]
    async fn test_simulated_confirmation_after_threshold() {
        let (service, store) = mock_service(true);
        let service =
            service.with_simulated_confirmation(Some(std::time::Duration::from_secs(300)));

        let now = Utc::now();
        store
            .put(Transaction::new_at(
                "TXN-OLD".to_string(),
                "ORD-1".to_string(),
                100.0,
                "841234567".to_string(),
                None,
                now - Duration::minutes(6),
            ))
            .await
            .unwrap();
        store
            .put(Transaction::new_at(
                "TXN-FRESH".to_string(),
                "ORD-2".to_string(),
                100.0,
                "841234567".to_string(),
                None,
                now - Duration::minutes(2),
            ))
            .await
            .unwrap();

        let old = service.get_status("TXN-OLD").await.unwrap();
        assert_eq!(old.status, TransactionStatus::Success);
        assert!(store.get("TXN-OLD").await.unwrap().confirmed_at.is_some());

        let fresh = service.get_status("TXN-FRESH").await.unwrap();
        assert_eq!(fresh.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_no_simulation_unless_enabled() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new_at(
                "TXN-OLD".to_string(),
                "ORD-1".to_string(),
                100.0,
                "841234567".to_string(),
                None,
                Utc::now() - Duration::minutes(6),
            ))
            .await
            .unwrap();

        let status = service.get_status("TXN-OLD").await.unwrap();
        assert_eq!(status.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_overdue_pending_reads_as_expired() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new_at(
                "TXN-LATE".to_string(),
                "ORD-1".to_string(),
                100.0,
                "841234567".to_string(),
                None,
                Utc::now() - Duration::minutes(11),
            ))
            .await
            .unwrap();

        let status = service.get_status("TXN-LATE").await.unwrap();
        assert_eq!(status.status, TransactionStatus::Expired);
        assert_eq!(status.message, "Payment window expired");
    }

    #[tokio::test]
    async fn test_terminal_status_reads_are_stable() {
        let (service, store) = mock_service(true);
        let created = service
            .initiate(&request(450.0, "841234567", "ORD-1"))
            .await
            .unwrap();
        store
            .transition(
                &created.transaction_id,
                StatusChange::confirm(Some("RCP".to_string()), Utc::now()),
            )
            .await
            .unwrap();

        let before = store.get(&created.transaction_id).await.unwrap();
        for _ in 0..3 {
            let status = service.get_status(&created.transaction_id).await.unwrap();
            assert_eq!(status.status, TransactionStatus::Success);
        }
        let after = store.get(&created.transaction_id).await.unwrap();
        assert_eq!(before.confirmed_at, after.confirmed_at);
        assert_eq!(before.mpesa_receipt, after.mpesa_receipt);
    }

    #[tokio::test]
    async fn test_live_gateway_id_and_checkout_are_adopted() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Ok(GatewayInitiation {
            transaction_id: "MP-123".to_string(),
            checkout_request_id: Some("ws_CO_123".to_string()),
        })));
        let service = PaymentService::new(gateway, store.clone());

        let response = service
            .initiate(&request(450.0, "841234567", "ORD-1"))
            .await
            .unwrap();

        assert_eq!(response.transaction_id, "MP-123");
        let stored = store.get("MP-123").await.unwrap();
        assert_eq!(stored.checkout_request_id.as_deref(), Some("ws_CO_123"));
    }

    #[tokio::test]
    async fn test_live_failure_degrades_to_fallback() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Err(GatewayError::Unavailable(
            "connection refused".to_string(),
        ))));
        let service = PaymentService::new(gateway, store.clone())
            .with_fallback(Arc::new(MockGateway::new(Arc::new(FixedOutcome(true)))));

        let response = service
            .initiate(&request(450.0, "841234567", "ORD-1"))
            .await
            .unwrap();

        assert!(is_local_id(&response.transaction_id));
        assert_eq!(service.fallback_count(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_accepted_request_without_id_never_falls_back() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Err(GatewayError::MissingTransactionId)));
        let service = PaymentService::new(gateway, store.clone())
            .with_fallback(Arc::new(MockGateway::new(Arc::new(FixedOutcome(true)))));

        let result = service.initiate(&request(450.0, "841234567", "ORD-1")).await;

        assert!(matches!(result, Err(PaymentError::Initiation(ref m)) if m.contains("no valid transaction id")));
        assert_eq!(service.fallback_count(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_live_failure_without_fallback_surfaces() {
        let store = Arc::new(InMemoryTransactionStore::new());

        let down = PaymentService::new(
            Arc::new(ScriptedGateway::new(Err(GatewayError::Auth("401".to_string())))),
            store.clone(),
        );
        let result = down.initiate(&request(450.0, "841234567", "ORD-1")).await;
        assert!(matches!(result, Err(PaymentError::GatewayUnavailable(_))));

        let rejecting = PaymentService::new(
            Arc::new(ScriptedGateway::new(Err(GatewayError::Request(
                "Invalid MSISDN".to_string(),
            )))),
            store.clone(),
        );
        let result = rejecting.initiate(&request(450.0, "841234567", "ORD-1")).await;
        assert!(matches!(result, Err(PaymentError::Initiation(ref m)) if m.contains("Invalid MSISDN")));

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_id_is_resolved_by_live_gateway() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(
            ScriptedGateway::new(Err(GatewayError::Unavailable("unused".to_string()))).with_status(
                Ok(GatewayStatusReport {
                    transaction_id: "MP-9".to_string(),
                    status: TransactionStatus::Failed,
                    amount: 300.0,
                    order_reference: "ORD-9".to_string(),
                }),
            ),
        );
        let service = PaymentService::new(gateway.clone(), store.clone());

        let status = service.get_status("MP-9").await.unwrap();
        assert_eq!(status.status, TransactionStatus::Failed);
        assert_eq!(status.message, "Payment failed");
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(*gateway.status_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_local_record_wins_over_live_gateway() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Err(GatewayError::Unavailable(
            "unused".to_string(),
        ))));
        let service = PaymentService::new(gateway.clone(), store.clone());
        store
            .put(Transaction::new(
                "MP-1".to_string(),
                "ORD-1".to_string(),
                10.0,
                "841234567".to_string(),
                None,
            ))
            .await
            .unwrap();

        let status = service.get_status("MP-1").await.unwrap();
        assert_eq!(status.status, TransactionStatus::Pending);
        assert_eq!(*gateway.status_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_live_status_failure_is_not_found() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(ScriptedGateway::new(Err(GatewayError::Unavailable(
            "unused".to_string(),
        ))));
        let service = PaymentService::new(gateway, store);

        let result = service.get_status("MP-404").await;
        assert!(matches!(result, Err(PaymentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_successful_callback_confirms_matching_record() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new(
                "TXN-1".to_string(),
                "ORD-1".to_string(),
                450.0,
                "841234567".to_string(),
                Some("ws_CO_1".to_string()),
            ))
            .await
            .unwrap();

        assert!(service.handle_callback(&callback(0, "ws_CO_1", Some("NLJ7RT61SV"))).await);

        let tx = store.get("TXN-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.mpesa_receipt.as_deref(), Some("NLJ7RT61SV"));
        assert!(tx.confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_callback_without_receipt_still_confirms() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new(
                "TXN-1".to_string(),
                "ORD-1".to_string(),
                450.0,
                "841234567".to_string(),
                Some("ws_CO_1".to_string()),
            ))
            .await
            .unwrap();

        assert!(service.handle_callback(&callback(0, "ws_CO_1", None)).await);
        let tx = store.get("TXN-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert!(tx.mpesa_receipt.is_none());
    }

    #[tokio::test]
    async fn test_failed_or_unmatched_callbacks_change_nothing() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new(
                "TXN-1".to_string(),
                "ORD-1".to_string(),
                450.0,
                "841234567".to_string(),
                Some("ws_CO_1".to_string()),
            ))
            .await
            .unwrap();

        assert!(!service.handle_callback(&callback(1032, "ws_CO_1", None)).await);
        assert!(!service.handle_callback(&callback(0, "ws_CO_OTHER", Some("R"))).await);
        assert!(!service.handle_callback(&json!({"unexpected": true})).await);
        assert!(!service.handle_callback(&json!("not even an object")).await);

        let tx = store.get("TXN-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.mpesa_receipt.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_callback_is_acknowledged_once() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new(
                "TXN-1".to_string(),
                "ORD-1".to_string(),
                450.0,
                "841234567".to_string(),
                Some("ws_CO_1".to_string()),
            ))
            .await
            .unwrap();

        assert!(service.handle_callback(&callback(0, "ws_CO_1", Some("FIRST"))).await);
        assert!(service.handle_callback(&callback(0, "ws_CO_1", Some("SECOND"))).await);

        let tx = store.get("TXN-1").await.unwrap();
        assert_eq!(tx.mpesa_receipt.as_deref(), Some("FIRST"));
    }

    #[tokio::test]
    async fn test_callback_for_expired_payment_is_rejected() {
        let (service, store) = mock_service(true);
        store
            .put(Transaction::new(
                "TXN-1".to_string(),
                "ORD-1".to_string(),
                450.0,
                "841234567".to_string(),
                Some("ws_CO_1".to_string()),
            ))
            .await
            .unwrap();
        store.transition("TXN-1", StatusChange::expire()).await.unwrap();

        assert!(!service.handle_callback(&callback(0, "ws_CO_1", Some("LATE"))).await);
        assert_eq!(
            store.get("TXN-1").await.unwrap().status,
            TransactionStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_sweep_confirms_then_expires() {
        let (service, store) = mock_service(true);
        let service =
            service.with_simulated_confirmation(Some(std::time::Duration::from_secs(300)));
        let now = Utc::now();

        store
            .put(Transaction::new_at(
                "TXN-DUE".to_string(),
                "ORD-1".to_string(),
                100.0,
                "841234567".to_string(),
                None,
                now - Duration::minutes(6),
            ))
            .await
            .unwrap();
        store
            .put(Transaction::new_at(
                "TXN-NEW".to_string(),
                "ORD-2".to_string(),
                100.0,
                "841234567".to_string(),
                None,
                now,
            ))
            .await
            .unwrap();

        assert_eq!(service.sweep(now).await.unwrap(), 1);
        assert_eq!(
            store.get("TXN-DUE").await.unwrap().status,
            TransactionStatus::Success
        );

        let later = now + Duration::minutes(11);
        let service_without_simulation = PaymentService::new(
            Arc::new(MockGateway::new(Arc::new(FixedOutcome(true)))),
            store.clone(),
        );
        assert_eq!(service_without_simulation.sweep(later).await.unwrap(), 1);
        assert_eq!(
            store.get("TXN-NEW").await.unwrap().status,
            TransactionStatus::Expired
        );
    }
}
