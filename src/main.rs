use clap::Parser;
use mpesa_gateway::adapters::InMemoryTransactionStore;
use mpesa_gateway::cli::{config_report, Cli, Commands};
use mpesa_gateway::config::{Config, LogFormat};
use mpesa_gateway::services::{expiry_sweeper, PaymentService};
use mpesa_gateway::{create_app, middleware, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Config => {
            println!("{}", config_report(&config));
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    init_tracing(config.log_format);

    let store = Arc::new(InMemoryTransactionStore::new());
    let payments = Arc::new(PaymentService::from_config(&config, store));
    tracing::info!(
        gateway_mode = payments.gateway_mode().as_str(),
        environment = config.mpesa_environment.as_str(),
        fallback_to_mock = config.fallback_to_mock,
        "Payment service initialized"
    );

    if let Some(interval) = config.expiry_sweep_interval {
        expiry_sweeper::start(payments.clone(), interval);
        tracing::info!("Expiry sweep running every {}s", interval.as_secs());
    }

    let app = create_app(AppState::new(payments))
        .layer(middleware::cors_layer(&config.cors_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
