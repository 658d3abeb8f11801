use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::services::PaymentError;

const INTERNAL_MESSAGE: &str = "Internal error while processing the payment. Try again later.";
const UNAVAILABLE_MESSAGE: &str = "Payment provider unavailable. Try again later.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payment initiation failed: {0}")]
    PaymentInitiation(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PaymentInitiation(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the caller. Server-side failures never leak detail.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            AppError::ServiceUnavailable(_) => UNAVAILABLE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::Validation(e) => AppError::Validation(e.message),
            PaymentError::NotFound(id) => AppError::NotFound(format!("Transaction {} not found", id)),
            PaymentError::Initiation(message) => AppError::PaymentInitiation(message),
            PaymentError::GatewayUnavailable(message) => AppError::ServiceUnavailable(message),
            PaymentError::Internal(message) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unprocessable_error_status_code() {
        let error = AppError::Unprocessable("phone_number: must be exactly 9 characters".to_string());
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unavailable_error_hides_provider_detail() {
        let error = AppError::ServiceUnavailable(
            "gateway authentication failed: token endpoint returned 401: invalid api key".to_string(),
        );
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.public_message(), UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let error = AppError::Internal("lock poisoned at store.rs:42".to_string());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), INTERNAL_MESSAGE);
    }

    #[test]
    fn test_payment_error_mapping() {
        let validation: AppError =
            PaymentError::Validation(ValidationError::new("amount", "amount out of range")).into();
        assert!(matches!(validation, AppError::Validation(ref m) if m == "amount out of range"));

        let missing: AppError = PaymentError::NotFound("TXN-X".to_string()).into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let declined: AppError = PaymentError::Initiation("declined".to_string()).into();
        assert_eq!(declined.status_code(), StatusCode::BAD_REQUEST);

        let down: AppError = PaymentError::GatewayUnavailable("timeout".to_string()).into();
        assert_eq!(down.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("Transaction TXN-NONEXISTENT not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_internal_error_response() {
        let error = AppError::Internal("boom".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
