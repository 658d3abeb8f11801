use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::ports::GatewayMode;

const DEFAULT_SERVER_PORT: u16 = 8000;
const DEFAULT_API_URL: &str = "https://api.mpesa.com";
const DEFAULT_SIMULATED_CONFIRMATION_SECS: u64 = 300;
const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "sandbox",
            MpesaEnvironment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Clone)]
pub struct Config {
    pub server_port: u16,
    pub mpesa_api_key: String,
    pub mpesa_api_url: String,
    pub mpesa_environment: MpesaEnvironment,
    pub mpesa_callback_url: Option<String>,
    /// Live initiation failures degrade to the simulated gateway.
    pub fallback_to_mock: bool,
    /// Mock-only: pending payments read after this long report success.
    pub simulate_confirmation_after: Option<Duration>,
    pub expiry_sweep_interval: Option<Duration>,
    pub cors_origins: AllowedOrigins,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset and blank values
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mpesa_environment = match get("MPESA_ENVIRONMENT").as_deref() {
            None | Some("sandbox") => MpesaEnvironment::Sandbox,
            Some("production") => MpesaEnvironment::Production,
            Some(other) => anyhow::bail!(
                "MPESA_ENVIRONMENT must be 'sandbox' or 'production', got '{}'",
                other
            ),
        };

        let fallback_to_mock = match get("MPESA_FALLBACK_TO_MOCK") {
            Some(raw) => raw.parse::<bool>().map_err(|_| {
                anyhow::anyhow!("MPESA_FALLBACK_TO_MOCK must be 'true' or 'false'")
            })?,
            None => mpesa_environment == MpesaEnvironment::Sandbox,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Plain,
        };

        Ok(Config {
            server_port: get("SERVER_PORT")
                .map(|port| port.parse::<u16>())
                .transpose()?
                .unwrap_or(DEFAULT_SERVER_PORT),
            mpesa_api_key: get("MPESA_API_KEY").unwrap_or_default(),
            mpesa_api_url: get("MPESA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            mpesa_environment,
            mpesa_callback_url: get("MPESA_CALLBACK_URL"),
            fallback_to_mock,
            simulate_confirmation_after: parse_seconds(
                get("MPESA_SIMULATE_CONFIRMATION_SECS"),
                DEFAULT_SIMULATED_CONFIRMATION_SECS,
            )?,
            expiry_sweep_interval: parse_seconds(
                get("EXPIRY_SWEEP_INTERVAL_SECS"),
                DEFAULT_EXPIRY_SWEEP_SECS,
            )?,
            cors_origins: parse_allowed_origins(
                &get("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            )?,
            log_format,
        })
    }

    /// An empty API key selects the simulated gateway.
    pub fn gateway_mode(&self) -> GatewayMode {
        if self.mpesa_api_key.is_empty() {
            GatewayMode::Mock
        } else {
            GatewayMode::Live
        }
    }

    pub fn masked_api_key(&self) -> String {
        match self.mpesa_api_key.len() {
            0 => "<unset>".to_string(),
            n if n > 8 => format!(
                "{}****",
                self.mpesa_api_key.chars().take(4).collect::<String>()
            ),
            _ => "****".to_string(),
        }
    }
}

/// `0` disables the feature.
fn parse_seconds(raw: Option<String>, default: u64) -> anyhow::Result<Option<Duration>> {
    let secs = match raw {
        Some(value) => value.parse::<u64>()?,
        None => default,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn parse_allowed_origins(raw: &str) -> anyhow::Result<AllowedOrigins> {
    let value = raw.trim();
    if value == "*" {
        return Ok(AllowedOrigins::Any);
    }

    let origins = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();

    if origins.is_empty() {
        anyhow::bail!("CORS_ALLOWED_ORIGINS must be '*' or a comma-separated list of origins");
    }

    Ok(AllowedOrigins::List(origins))
}
