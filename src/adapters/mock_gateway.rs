//! Simulated gateway used when no provider credential is configured.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;

use crate::domain::transaction::generate_transaction_id;
use crate::ports::{
    GatewayError, GatewayInitiation, GatewayMode, GatewayStatusReport, InitiationRequest,
    PaymentGateway,
};

/// Success rate of the simulated provider.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.85;

/// Decides whether a simulated initiation is accepted.
pub trait OutcomeSource: Send + Sync {
    fn draw(&self) -> bool;
}

pub struct RandomOutcome {
    success_rate: f64,
}

impl RandomOutcome {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for RandomOutcome {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_RATE)
    }
}

impl OutcomeSource for RandomOutcome {
    fn draw(&self) -> bool {
        rand::thread_rng().gen_bool(self.success_rate)
    }
}

/// Always reports the same outcome.
pub struct FixedOutcome(pub bool);

impl OutcomeSource for FixedOutcome {
    fn draw(&self) -> bool {
        self.0
    }
}

#[derive(Clone)]
pub struct MockGateway {
    outcome: Arc<dyn OutcomeSource>,
}

impl MockGateway {
    pub fn new(outcome: Arc<dyn OutcomeSource>) -> Self {
        Self { outcome }
    }

    pub fn random() -> Self {
        Self::new(Arc::new(RandomOutcome::default()))
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn mode(&self) -> GatewayMode {
        GatewayMode::Mock
    }

    async fn initiate(&self, request: &InitiationRequest) -> Result<GatewayInitiation, GatewayError> {
        if !self.outcome.draw() {
            tracing::info!(
                order_reference = %request.order_reference,
                "Simulated gateway declined payment"
            );
            return Err(GatewayError::Declined(
                "simulated provider declined the request".to_string(),
            ));
        }

        Ok(GatewayInitiation {
            transaction_id: generate_transaction_id(),
            checkout_request_id: Some(format!(
                "ws_CO_{}",
                hex::encode(rand::random::<[u8; 8]>())
            )),
        })
    }

    async fn query_status(&self, transaction_id: &str) -> Result<GatewayStatusReport, GatewayError> {
        Err(GatewayError::Request(format!(
            "simulated gateway keeps no remote state for {}",
            transaction_id
        )))
    }
}
