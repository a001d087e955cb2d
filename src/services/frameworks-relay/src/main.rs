//! Main binary entry point for the Frameworks relay
//!
//! `frameworks-relay` (or `frameworks-relay serve`) runs the HTTP service.
//! `frameworks-relay prune-audit` trims the audit store once and exits, for
//! deployments that schedule retention externally.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frameworks_relay::config::ObservabilityConfig;
use frameworks_relay::{FileAuditStore, RelayConfig, RelayService, VERSION};
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "frameworks-relay", version, about = "Frameworks to Klaviyo webhook relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Delete all but the most recent audit artifacts and exit
    PruneAudit {
        /// Number of artifacts to keep; defaults to `audit.retain`
        #[arg(long)]
        retain: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        process::exit(1);
    }

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::PruneAudit { retain } => prune_audit(&config, retain).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn serve(config: RelayConfig) -> Result<()> {
    info!("Starting Frameworks relay v{}", VERSION);

    log_configuration(&config);

    let service = RelayService::new(config).context("Failed to initialize service")?;
    service.start().await.context("Service error")?;

    info!("Frameworks relay shutdown complete");
    Ok(())
}

async fn prune_audit(config: &RelayConfig, retain: Option<usize>) -> Result<()> {
    let retain = retain.unwrap_or(config.audit.retain);
    let store = FileAuditStore::new(config.audit.data_dir.clone());

    let deleted = store
        .prune(retain)
        .await
        .with_context(|| format!("Failed to prune {}", store.dir().display()))?;

    info!(deleted, retain, dir = %store.dir().display(), "Audit retention complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).or_else(|_| EnvFilter::try_new("info"))?;

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        "pretty" | "text" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_file(true)
                        .with_line_number(true)
                        .with_target(false),
                )
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()?;
        }
    }

    Ok(())
}

/// Summarize the effective configuration without leaking secrets
fn log_configuration(config: &RelayConfig) {
    info!(
        environment = %config.server.environment,
        klaviyo_url = %config.klaviyo.api_url,
        klaviyo_revision = %config.klaviyo.api_revision,
        profile_strategy = ?config.delivery.profile_strategy,
        max_attempts = config.delivery.max_attempts,
        delivery_deadline_secs = config.delivery.deadline_secs,
        "Loaded configuration"
    );

    if config.discord.webhook_url.is_some() {
        info!("Discord notifications: enabled");
    } else {
        warn!("Discord notifications: disabled");
    }

    match config.audit.prune_interval_secs {
        0 => info!(
            dir = %config.audit.data_dir.display(),
            "Audit retention: external (prune-audit)"
        ),
        secs => info!(
            dir = %config.audit.data_dir.display(),
            retain = config.audit.retain,
            every_secs = secs,
            "Audit retention: in-process"
        ),
    }
}
