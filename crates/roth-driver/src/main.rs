//! roth-driver - RotH mechanism driver daemon
//!
//! Listens for port and network lifecycle events and keeps the RotH agents'
//! tenant VRFs in step with the neutron topology.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use roth_driver::config::DEFAULT_CONFIG_PATH;
use roth_driver::{DriverConfig, EventListener, MechanismDriver, RedisTransport, RothMechanismDriver};
use roth_topology::SqlTopologyStore;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "roth-driver", version, about = "RotH tenant VRF driver")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overrides the configuration file (RUST_LOG wins over both)
    #[arg(long)]
    log_level: Option<String>,

    /// Load and validate the configuration, print it and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match DriverConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("roth-driver: {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check_config {
        return match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                println!("{}", rendered);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("roth-driver: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    info!("--- Starting roth-driver ---");

    match run(config).await {
        Ok(()) => {
            info!("roth-driver exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "roth-driver exiting with error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

async fn run(config: DriverConfig) -> anyhow::Result<()> {
    let shutdown = setup_signal_handlers();

    let store = SqlTopologyStore::connect(
        &config.database.connection,
        config.database.max_connections,
        config.database.acquire_timeout(),
    )
    .await
    .context("connecting to topology store")?;

    let transport = RedisTransport::connect(
        &config.messaging.redis_url,
        &config.messaging.topic,
        config.messaging.call_timeout(),
        config.messaging.reply_ttl(),
    )
    .await
    .context("connecting agent transport")?;

    let driver = Arc::new(RothMechanismDriver::new(Arc::new(store), Arc::new(transport)));
    driver.initialize();

    let listener = EventListener::new(
        &config.messaging.redis_url,
        &config.messaging.event_queue,
        config.messaging.reply_ttl(),
    )
    .context("creating event listener")?;
    listener.run(driver, shutdown).await;

    Ok(())
}

/// Returns a flag set on SIGINT or SIGTERM
fn setup_signal_handlers() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT");
                flag.store(true, Ordering::Relaxed);
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    {
        let flag = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM");
                    flag.store(true, Ordering::Relaxed);
                }
                Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
            }
        });
    }

    shutdown
}
