pub mod payment;

use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// `mock` or `live`
    pub gateway_mode: String,
    /// Provider circuit breaker, live mode only
    pub gateway_circuit: Option<String>,
    pub tracked_transactions: usize,
    /// Initiations served by the simulated gateway after a live failure
    pub gateway_fallbacks: u64,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
        (status = 503, description = "Provider circuit is open", body = HealthStatus)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let payments = &state.payments;
    let gateway_circuit = payments.circuit_state();
    let tracked_transactions = payments.tracked_transactions().await.unwrap_or_default();

    let circuit_open = gateway_circuit.as_deref() == Some("open");
    let degraded = payments.fallback_count() > 0;

    let health_response = HealthStatus {
        status: if circuit_open {
            "unhealthy".to_string()
        } else if degraded {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        gateway_mode: payments.gateway_mode().as_str().to_string(),
        gateway_circuit,
        tracked_transactions,
        gateway_fallbacks: payments.fallback_count(),
    };

    let status_code = if circuit_open {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(health_response))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        payment::process_payment,
        payment::get_payment_status,
        payment::mpesa_callback,
    ),
    components(schemas(
        HealthStatus,
        crate::schemas::PaymentRequest,
        crate::schemas::PaymentResponse,
        crate::schemas::PaymentStatusResponse,
        crate::schemas::CallbackAck,
        crate::domain::TransactionStatus,
    )),
    tags(
        (name = "Payment", description = "M-Pesa payment initiation, status and callbacks"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
