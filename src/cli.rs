use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::ports::GatewayMode;

#[derive(Parser)]
#[command(name = "mpesa-gateway")]
#[command(about = "M-Pesa payment initiation, status and callback service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Validate and print the effective configuration
    Config,
}

/// Human-readable summary of the effective configuration. Never prints the API key.
pub fn config_report(config: &Config) -> String {
    let seconds = |value: Option<std::time::Duration>| match value {
        Some(d) => format!("{}s", d.as_secs()),
        None => "disabled".to_string(),
    };

    let mut lines = vec![
        "=== Effective Configuration ===".to_string(),
        format!("Server port:              {}", config.server_port),
        format!("Gateway mode:             {}", config.gateway_mode().as_str()),
        format!("M-Pesa API key:           {}", config.masked_api_key()),
        format!("M-Pesa API URL:           {}", config.mpesa_api_url),
        format!("M-Pesa environment:       {}", config.mpesa_environment.as_str()),
        format!(
            "Callback URL:             {}",
            config
                .mpesa_callback_url
                .clone()
                .unwrap_or_else(|| format!("{}/api/payment/callback", config.mpesa_api_url))
        ),
        format!("Fallback to mock:         {}", config.fallback_to_mock),
        format!(
            "Simulated confirmation:   {}",
            seconds(config.simulate_confirmation_after)
        ),
        format!("Expiry sweep interval:    {}", seconds(config.expiry_sweep_interval)),
    ];

    if config.gateway_mode() == GatewayMode::Live && config.fallback_to_mock {
        lines.push(
            "Warning: live gateway failures will be served by the simulated gateway".to_string(),
        );
    }

    lines.join("\n")
}
