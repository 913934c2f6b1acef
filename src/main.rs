//! Lending Liquidation Bot
//!
//! Liquidation bot for an Aave V3-style lending market.
//! Features:
//! - Periodic health-factor scans over indexed borrowers
//! - Close-factor and collateral-cap aware sizing with a profit gate
//! - Direct aggregator swaps and principal-token redemption routes
//! - Flash-mint or flash-loan execution per debt asset

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::{LogNotifier, Notifier, OdosClient, PendleClient, SubgraphClient, WebhookNotifier};
use liquidator_chain::{
    AaveV3Addresses, AaveV3Pool, LiquidatorContract, LiquidatorKind, OnchainTokenRegistry,
    TransactionSender,
};
use liquidator_core::{
    AttemptLog, BackoffCache, BotConfig, ExecutionRouter, Liquidator, PositionReader,
    QuoteAssembler, Scanner, SystemClock,
};

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // Configuration errors abort before any component is built
    let config = BotConfig::load_from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    config.log_config();

    let scanner = initialize_components(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Starting liquidation bot...");
    scanner.run(shutdown_rx).await;
    info!("Liquidation bot stopped");

    Ok(())
}

/// Install the global subscriber; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug"));
    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

/// Build every component from the validated configuration.
async fn initialize_components(config: &BotConfig) -> Result<Scanner> {
    let rpc_url = config.chain.rpc_url.as_str();
    let contracts = &config.contracts;

    // Protocol reads
    let pool = Arc::new(
        AaveV3Pool::connect(
            rpc_url,
            AaveV3Addresses {
                pool: contracts.pool,
                oracle: contracts.oracle,
                data_provider: contracts.data_provider,
                liquidation_logic: contracts.liquidation_logic,
            },
        )
        .await
        .context("failed to connect pool reader")?,
    );
    let index = Arc::new(SubgraphClient::new(config.api.subgraph_url.clone()));
    let reader = Arc::new(PositionReader::new(pool, index, config.scanner.reader_limits()));

    // Quote sources
    let aggregator = Arc::new(
        OdosClient::new(config.chain.chain_id)
            .with_base_url(config.api.aggregator_url.clone())
            .with_simulation(config.api.simulate_swaps),
    );
    let yield_market = Arc::new(
        PendleClient::new(config.chain.chain_id).with_base_url(config.api.yield_market_url.clone()),
    );
    let tokens = Arc::new(OnchainTokenRegistry::new(rpc_url, contracts.pt_registry));
    let assembler = QuoteAssembler::new(
        aggregator,
        yield_market,
        tokens,
        config.liquidation.quote_settings(),
    )
    .with_unstake_wrappers(config.unstake_map());

    // Transaction sender (signs and sends liquidation transactions)
    let private_key = std::env::var(env::PRIVATE_KEY)
        .with_context(|| format!("{} must be set", env::PRIVATE_KEY))?;
    let tx_sender = Arc::new(
        TransactionSender::new(
            &private_key,
            rpc_url,
            config.chain.chain_id,
            config.chain.gas_limit,
        )
        .await
        .context("failed to initialize transaction sender")?,
    );

    // Liquidator contracts
    let router = ExecutionRouter::new(
        LiquidatorContract::new(
            LiquidatorKind::FlashMint,
            contracts.flash_mint_liquidator,
            tx_sender.clone(),
        ),
        LiquidatorContract::new(
            LiquidatorKind::FlashLoan,
            contracts.flash_loan_liquidator,
            tx_sender,
        ),
        config.flash_mintable.iter().copied(),
    );

    let clock = Arc::new(SystemClock);
    let backoff = Arc::new(
        BackoffCache::from_config(
            config.backoff.path.as_deref(),
            config.backoff.ignore_duration(),
            clock.clone(),
        )
        .context("failed to open backoff cache")?,
    );

    let notifier: Arc<dyn Notifier> = match &config.api.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let liquidator = Arc::new(
        Liquidator::new(reader.clone(), assembler, router, backoff, notifier, clock)
            .with_min_profit(config.liquidation.min_profit_usd)
            .with_attempt_log(AttemptLog::new(config.attempt_log.dir.clone())),
    );

    let scanner = Scanner::new(reader, liquidator, config.scanner.settings());

    info!("All components initialized");

    Ok(scanner)
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
    ╦  ┌─┐┌┐┌┌┬┐┬┌┐┌┌─┐  ╦  ┬┌─┐ ┬ ┬┬┌┬┐┌─┐┌┬┐┌─┐┬─┐
    ║  ├┤ │││ │││││││ ┬  ║  ││─┼┐│ ││ ││├─┤ │ │ │├┬┘
    ╩═╝└─┘┘└┘─┴┘┴┘└┘└─┘  ╩═╝┴└─┘└└─┘┴─┴┘┴ ┴ ┴ └─┘┴└─
    Liquidation Bot v0.1.0
    "#);
}
