//! Moola Liquidation Bot
//!
//! Liquidation bot for Moola v2 on Celo.
//! Features:
//! - SortedOracles price cache and subgraph loan-book snapshot
//! - Health factor ranking in exact decimal arithmetic
//! - Flash-loan liquidations through the `LiquidateLoan` contract

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use moola_liquidator_api::SubgraphClient;
use moola_liquidator_chain::{
    CeloRegistry, LiquidateLoanContract, SortedOraclesReader, TransactionSender,
};
use moola_liquidator_core::{AppConfig, AssetRegistry, LiquidationBot};

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Console + file logging; the guard flushes the file on exit
    let _log_guard = init_tracing()?;

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Fatal configuration error");
            return Err(e.into());
        }
    };
    config.log_config();

    let bot = initialize_components(&config)?;

    info!("Starting Moola Liquidation Bot");
    bot.start().await;

    shutdown_signal().await;
    info!("Shutdown signal received");
    bot.stop();

    Ok(())
}

/// Install the tracing subscriber.
///
/// Level comes from `RUST_LOG`, then `CELO_LOG_LEVEL`, then `info`.
fn init_tracing() -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("CELO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let (file_layer, guard) = match AppConfig::log_file_from(|name| std::env::var(name).ok()) {
        Some(log_file) => {
            let path = Path::new(&log_file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("LOG_FILE {log_file:?} has no file name"))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn initialize_components(config: &AppConfig) -> Result<Arc<LiquidationBot>> {
    info!("Initializing components...");

    // Asset registry
    let mut assets = AssetRegistry::new(config.network);
    if let Some(bridge) = config.bridge_token {
        assets = assets.with_bridge(bridge);
    }
    let assets = Arc::new(assets);
    info!(network = %config.network, bridge = ?assets.bridge(), "Asset registry loaded");

    // Oracle reads through the Celo registry
    let registry = Arc::new(CeloRegistry::new(config.rpc_url.clone()));
    let rates = Arc::new(SortedOraclesReader::new(config.rpc_url.clone(), registry));

    // Subgraph client
    let loans = Arc::new(
        SubgraphClient::with_endpoint(config.subgraph_url.clone())
            .context("Failed to build subgraph client")?,
    );
    info!(endpoint = %loans.endpoint(), "Subgraph client configured");

    // Transaction sender (for signing and sending liquidation transactions)
    let tx_sender = Arc::new(
        TransactionSender::new(&config.private_key, &config.rpc_url, config.network.chain_id())
            .context("Failed to initialize transaction sender")?,
    );
    info!(address = %tx_sender.address, "Transaction sender initialized");

    // Settlement contract
    let contract = Arc::new(LiquidateLoanContract::new(config.liquidation_contract, tx_sender));
    info!(contract = %contract.address, "Liquidation contract configured");

    let bot = Arc::new(LiquidationBot::new(&config.bot, assets, rates, loans, contract));
    info!("All components initialized");

    Ok(bot)
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
    ╔╦╗┌─┐┌─┐┬  ┌─┐
    ║║║│ ││ ││  ├─┤
    ╩ ╩└─┘└─┘┴─┘┴ ┴
    Liquidation Bot v0.1.0
    "#);
}
