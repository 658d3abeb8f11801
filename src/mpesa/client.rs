use chrono::{DateTime, Duration as ChronoDuration, Utc};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::ports::GatewayError;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const INITIATE_TIMEOUT: Duration = Duration::from_secs(30);

/// A cached token is reused until this long before it expires.
const TOKEN_REFRESH_MARGIN_MINUTES: i64 = 5;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - ChronoDuration::minutes(TOKEN_REFRESH_MARGIN_MINUTES)
    }
}

/// Body sent to the provider's processing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
    pub phone_number: String,
    pub amount: String,
    pub account_reference: String,
    pub transaction_desc: String,
    pub callback_url: String,
}

/// HTTP client for the mobile-money provider API
#[derive(Clone)]
pub struct MpesaClient {
    client: Client,
    base_url: String,
    api_key: String,
    callback_url: String,
    token: Arc<Mutex<Option<CachedToken>>>,
    circuit_breaker: Breaker,
}

impl MpesaClient {
    /// Creates a client; `callback_url` defaults to this service's callback route on the base URL
    pub fn new(base_url: String, api_key: String, callback_url: Option<String>) -> Self {
        Self::with_circuit_breaker(base_url, api_key, callback_url, 5, 30)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        api_key: String,
        callback_url: Option<String>,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(INITIATE_TIMEOUT)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        let base_url = base_url.trim_end_matches('/').to_string();
        let callback_url =
            callback_url.unwrap_or_else(|| format!("{}/api/payment/callback", base_url));

        MpesaClient {
            client,
            base_url,
            api_key,
            callback_url,
            token: Arc::new(Mutex::new(None)),
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Returns a bearer token, exchanging the API key for a new one when the
    /// cached token is missing or close to expiry.
    ///
    /// The cache lock is held across the exchange so concurrent callers wait
    /// for a single refresh.
    pub async fn get_access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(AUTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| GatewayError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Auth(format!("unreadable token response: {}", e)))?;
        let value = body
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| GatewayError::Auth("token response carried no access_token".to_string()))?;
        let ttl = body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        tracing::debug!(expires_in = ttl, "Obtained provider access token");
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
        });

        Ok(value)
    }

    /// Starts a payment on the payer's handset and returns the provider payload.
    pub async fn initiate_payment(
        &self,
        phone_number: &str,
        amount: f64,
        order_reference: &str,
        description: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let body = PaymentLinkRequest {
            phone_number: phone_number.to_string(),
            // the provider takes whole units
            amount: (amount.trunc() as i64).to_string(),
            account_reference: order_reference.to_string(),
            transaction_desc: description
                .map(str::to_string)
                .unwrap_or_else(|| format!("Payment for order {}", order_reference)),
            callback_url: self.callback_url.clone(),
        };

        self.guarded(async {
            let token = self.get_access_token().await?;
            let url = format!("{}/mpesa/payment/v1/processrequest", self.base_url);
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&body)
                .timeout(INITIATE_TIMEOUT)
                .send()
                .await
                .map_err(unavailable)?;

            let status = response.status();
            if status == StatusCode::OK || status == StatusCode::CREATED {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
            }

            let text = response.text().await.unwrap_or_default();
            Err(GatewayError::Request(provider_error_message(&text)))
        })
        .await
    }

    /// Queries the provider for the current state of a transaction.
    pub async fn check_status(&self, transaction_id: &str) -> Result<Value, GatewayError> {
        self.guarded(async {
            let token = self.get_access_token().await?;
            let url = format!("{}/mpesa/payment/v1/queryrequest", self.base_url);
            let response = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(&serde_json::json!({ "transactionId": transaction_id }))
                .timeout(STATUS_TIMEOUT)
                .send()
                .await
                .map_err(unavailable)?;

            if response.status() == StatusCode::OK {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
            }

            let text = response.text().await.unwrap_or_default();
            Err(GatewayError::Request(provider_error_message(&text)))
        })
        .await
    }

    /// Runs a provider call through the circuit breaker. Only availability
    /// failures count against the breaker; rejections do not.
    async fn guarded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        let result = self
            .circuit_breaker
            .call_with(|e: &GatewayError| e.is_unavailable(), call)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::Unavailable(
                "provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

fn unavailable(e: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(e.to_string())
}

/// Pulls the most specific error text out of a provider error body.
pub fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("errorMessage")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
