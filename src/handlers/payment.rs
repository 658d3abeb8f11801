use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        Path, State,
    },
    Json,
};
use serde_json::Value;

use crate::error::AppError;
use crate::schemas::{CallbackAck, PaymentRequest, PaymentResponse, PaymentStatusResponse};
use crate::validation::{
    round_amount, validate_order_reference, validate_phone_format, validate_positive_amount,
    ValidationResult,
};
use crate::AppState;

/// Body-shape rules; violations are malformed requests, not business errors.
fn check_shape(request: &PaymentRequest) -> ValidationResult {
    validate_positive_amount(request.amount)?;
    validate_phone_format(&request.phone_number)?;
    validate_order_reference(&request.order_reference)
}

/// Starts a mobile-money payment; the payer confirms on their handset.
#[utoipa::path(
    post,
    path = "/api/payment",
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Payment started", body = PaymentResponse),
        (status = 400, description = "Amount out of range, invalid prefix, or payment rejected"),
        (status = 422, description = "Malformed request body"),
        (status = 503, description = "Payment provider unavailable"),
        (status = 500, description = "Unexpected error")
    ),
    tag = "Payment"
)]
pub async fn process_payment(
    State(state): State<AppState>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentResponse>, AppError> {
    let Json(mut request) = payload.map_err(|rejection| AppError::Unprocessable(rejection.body_text()))?;
    check_shape(&request).map_err(|e| AppError::Unprocessable(e.to_string()))?;
    request.amount = round_amount(request.amount);

    let response = state.payments.initiate(&request).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/payment/status/{transaction_id}",
    params(("transaction_id" = String, Path, description = "Transaction identifier")),
    responses(
        (status = 200, description = "Current payment status", body = PaymentStatusResponse),
        (status = 404, description = "Unknown transaction"),
        (status = 500, description = "Unexpected error")
    ),
    tag = "Payment"
)]
pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let status = state.payments.get_status(&transaction_id).await?;
    Ok(Json(status))
}

/// Raw callback body; aliased so `utoipa::path` does not try to infer a request body from it.
type CallbackBody = Result<Bytes, BytesRejection>;

/// Provider callback. Always answers 200; the outcome travels in `ResultCode`.
#[utoipa::path(
    post,
    path = "/api/payment/callback",
    responses(
        (status = 200, description = "Callback acknowledged", body = CallbackAck)
    ),
    tag = "Payment"
)]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    body: CallbackBody,
) -> Json<CallbackAck> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable provider callback");
            return Json(CallbackAck::rejected());
        }
    };

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, body_size = body.len(), "Unparseable provider callback");
            return Json(CallbackAck::rejected());
        }
    };

    if state.payments.handle_callback(&payload).await {
        Json(CallbackAck::accepted())
    } else {
        Json(CallbackAck::rejected())
    }
}
