use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::info;

use kiln_kpi_gateway::config::{GatewayConfig, DEFAULT_PORT};
use kiln_kpi_gateway::monitoring::{self, LogLevel};
use kiln_kpi_gateway::{KpiGatewayServer, PredictionOrchestrator, ServerConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gateway configuration file (TOML, JSON, JSON5 or YAML)
    #[arg(short, long, env = "KPI_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the prediction API (default)
    Serve,
    /// Load the configuration and print the KPI table
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    let cli = Cli::parse();
    monitoring::init_tracing(cli.log_level)?;

    let config = GatewayConfig::load(cli.config.as_deref())?;
    let orchestrator =
        PredictionOrchestrator::from_config(&config).context("Failed to initialize prediction endpoints")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("Kiln KPI gateway starting up...");
            let server = KpiGatewayServer::new(
                ServerConfig {
                    host: cli.host,
                    port: cli.port,
                },
                orchestrator,
            );
            server.start(shutdown_signal()).await?;
        }
        Commands::CheckConfig => {
            let registry = orchestrator.registry();
            println!(
                "Project: {} ({}), evaluation: {:?}",
                config.project_id,
                config.location,
                orchestrator.scope()
            );
            for kpi in registry.definitions() {
                let backend = match kpi.backend() {
                    Some(backend) => format!("endpoint {}", backend.endpoint_id()),
                    None => "not configured".to_string(),
                };
                println!(
                    "  {:<50} {:>2} features  {}",
                    kpi.name(),
                    kpi.required_features().len(),
                    backend
                );
            }
            println!(
                "{} KPIs, {} with a prediction endpoint",
                registry.len(),
                registry.configured_count()
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
