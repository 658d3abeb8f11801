pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod mpesa;
pub mod ports;
pub mod schemas;
pub mod services;
pub mod utils;
pub mod validation;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;

use crate::services::PaymentService;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(payments: Arc<PaymentService>) -> Self {
        Self {
            payments,
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .route("/api/payment", post(handlers::payment::process_payment))
        .route(
            "/api/payment/status/:transaction_id",
            get(handlers::payment::get_payment_status),
        )
        .route("/api/payment/callback", post(handlers::payment::mpesa_callback))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .with_state(state)
}
