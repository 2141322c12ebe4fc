use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use flightsurety_core::{Identity, SuretyConfig};
use flightsurety_service::{build_router, ServiceConfig, ServiceState};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "flightsuretyd", version, about = "FlightSurety REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8095
    #[arg(long, default_value = "127.0.0.1:8095", env = "FLIGHTSURETY_LISTEN")]
    listen: SocketAddr,
    /// Contract owner identity (administrative calls).
    #[arg(long, default_value = "owner", env = "FLIGHTSURETY_OWNER")]
    owner: String,
    /// Airline registered at initialization.
    #[arg(long, default_value = "airline-1", env = "FLIGHTSURETY_FIRST_AIRLINE")]
    first_airline: String,
    /// Identity the governance engine writes to the store as.
    #[arg(long, default_value = "flightsurety-app", env = "FLIGHTSURETY_ENGINE_ID")]
    engine_identity: String,
    /// JSON engine configuration. Missing fields take their defaults.
    #[arg(long, env = "FLIGHTSURETY_CONFIG")]
    config: Option<PathBuf>,
    /// JSON seed plan applied once at startup.
    #[arg(long, env = "FLIGHTSURETY_SEED")]
    seed: Option<PathBuf>,
    /// Overrides `oracle_gateway` from the configuration file.
    #[arg(long, env = "FLIGHTSURETY_ORACLE_GATEWAY")]
    oracle_gateway: Option<String>,
}

fn resolve_surety_config(cli: &Cli) -> anyhow::Result<SuretyConfig> {
    let mut config = match &cli.config {
        Some(path) => SuretyConfig::from_json_file(path)?,
        None => SuretyConfig::default(),
    };
    if let Some(gateway) = &cli.oracle_gateway {
        config.oracle_gateway = Identity::new(gateway.as_str());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "flightsurety_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let surety = resolve_surety_config(&cli)?;
    let config = ServiceConfig {
        owner: Identity::new(cli.owner.as_str()),
        first_airline: Identity::new(cli.first_airline.as_str()),
        engine_identity: Identity::new(cli.engine_identity.as_str()),
        surety,
        seed_plan: cli.seed.clone(),
    };
    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("flightsurety-service REST listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
