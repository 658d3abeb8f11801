use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::PaymentService;

/// Periodically settles pending payments whose window has closed.
pub fn start(service: Arc<PaymentService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = service.sweep(Utc::now()).await {
                tracing::error!("Expiry sweep failed: {}", e);
            }
        }
    })
}
