//! Provider-backed implementation of PaymentGateway.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::TransactionStatus;
use crate::mpesa::MpesaClient;
use crate::ports::{
    GatewayError, GatewayInitiation, GatewayMode, GatewayStatusReport, InitiationRequest,
    PaymentGateway,
};

/// Fields that may carry the provider's id, most specific first.
const TRANSACTION_ID_FIELDS: &[&str] = &["TransactionID", "transactionId", "CheckoutRequestID"];

#[derive(Clone)]
pub struct LiveGateway {
    client: MpesaClient,
}

impl LiveGateway {
    pub fn new(client: MpesaClient) -> Self {
        Self { client }
    }
}

fn string_field(payload: &Value, name: &str) -> Option<String> {
    match payload.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_initiation(payload: &Value) -> Result<GatewayInitiation, GatewayError> {
    let transaction_id = TRANSACTION_ID_FIELDS
        .iter()
        .find_map(|field| string_field(payload, field))
        .ok_or(GatewayError::MissingTransactionId)?;

    Ok(GatewayInitiation {
        transaction_id,
        checkout_request_id: string_field(payload, "CheckoutRequestID"),
    })
}

fn parse_status(transaction_id: &str, payload: &Value) -> GatewayStatusReport {
    let raw = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("pending");
    let amount = match payload.get("amount") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    };

    GatewayStatusReport {
        transaction_id: transaction_id.to_string(),
        status: TransactionStatus::from_gateway(raw),
        amount,
        order_reference: string_field(payload, "accountReference").unwrap_or_default(),
    }
}

#[async_trait]
impl PaymentGateway for LiveGateway {
    fn mode(&self) -> GatewayMode {
        GatewayMode::Live
    }

    async fn initiate(&self, request: &InitiationRequest) -> Result<GatewayInitiation, GatewayError> {
        let payload = self
            .client
            .initiate_payment(
                &request.formatted_phone,
                request.amount,
                &request.order_reference,
                Some(&request.description),
            )
            .await?;

        parse_initiation(&payload)
    }

    async fn query_status(&self, transaction_id: &str) -> Result<GatewayStatusReport, GatewayError> {
        let payload = self.client.check_status(transaction_id).await?;
        Ok(parse_status(transaction_id, &payload))
    }

    fn circuit_state(&self) -> Option<String> {
        Some(self.client.circuit_state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefers_transaction_id_over_checkout_id() {
        let initiation = parse_initiation(&json!({
            "TransactionID": "MP-1",
            "CheckoutRequestID": "ws_CO_1"
        }))
        .unwrap();

        assert_eq!(initiation.transaction_id, "MP-1");
        assert_eq!(initiation.checkout_request_id.as_deref(), Some("ws_CO_1"));
    }

    #[test]
    fn test_falls_back_to_checkout_id() {
        let initiation = parse_initiation(&json!({ "CheckoutRequestID": "ws_CO_7" })).unwrap();
        assert_eq!(initiation.transaction_id, "ws_CO_7");
    }

    #[test]
    fn test_missing_ids_is_final() {
        let result = parse_initiation(&json!({ "ResponseCode": "0" }));
        assert_eq!(result, Err(GatewayError::MissingTransactionId));
        assert!(GatewayError::MissingTransactionId.is_final());
    }

    #[test]
    fn test_status_translation() {
        let report = parse_status(
            "MP-1",
            &json!({ "status": "Cancelled", "amount": "120.5", "accountReference": "ORD-9" }),
        );
        assert_eq!(report.status, TransactionStatus::Failed);
        assert_eq!(report.amount, 120.5);
        assert_eq!(report.order_reference, "ORD-9");

        let unknown = parse_status("MP-2", &json!({}));
        assert_eq!(unknown.status, TransactionStatus::Pending);
        assert_eq!(unknown.amount, 0.0);
        assert_eq!(unknown.order_reference, "");
    }
}
