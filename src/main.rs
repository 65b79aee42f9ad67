//! Tradeguard - Main Entry Point
//!
//! Wires the engine together and runs the scan/execute loop against the
//! marketplace API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tradeguard::alert::LogNotifier;
use tradeguard::common::traits::{MarketApi, TradeStore};
use tradeguard::config::types::ApiCredentials;
use tradeguard::config::load_config;
use tradeguard::engine::{BudgetLedger, Scanner};
use tradeguard::executor::{BuyExecutor, SellExecutor, WorkerPool};
use tradeguard::guard::{CircuitBreaker, RateLimiter};
use tradeguard::marketplace::{GuardedClient, MarketplaceRestClient};
use tradeguard::queue::InMemoryQueue;
use tradeguard::store::PgStore;

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Evaluate and log decisions without executing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting tradeguard");
    info!("configuration file: {}", args.config);

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config))?;
    if args.dry_run {
        config.trading.dry_run = true;
    }
    if config.trading.dry_run {
        warn!("dry run: decisions will be logged, nothing will be executed");
    }

    let store: Arc<dyn TradeStore> = Arc::new(PgStore::connect(&config.database).await?);

    let mut rest_client = MarketplaceRestClient::with_timeout(
        &config.marketplace.base_url,
        Duration::from_secs(config.marketplace.request_timeout_seconds),
    )?;
    if let Some(credentials) = ApiCredentials::from_config(&config.marketplace) {
        rest_client = rest_client.with_credentials(credentials);
    } else {
        warn!("no API credentials configured, authenticated calls will fail");
    }

    let notifier = Arc::new(LogNotifier);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let breaker = Arc::new(CircuitBreaker::new(config.circuit.clone()));
    let api: Arc<dyn MarketApi> = Arc::new(GuardedClient::new(
        Arc::new(rest_client),
        limiter,
        breaker,
        notifier.clone(),
    ));

    let ledger = Arc::new(BudgetLedger::new(config.budget.clone()));
    let initial = ledger.refresh_balance(api.as_ref(), store.as_ref()).await?;
    info!(
        balance = %initial.balance,
        state = %initial.state,
        "initial budget loaded"
    );

    let (queue, receiver) = InMemoryQueue::channel(config.worker.queue_size as usize);
    let queue = Arc::new(queue);

    let scanner = Scanner::new(
        Arc::clone(&api),
        Arc::clone(&store),
        Arc::clone(&ledger),
        queue.clone(),
        notifier.clone(),
        config.trading.dry_run,
    );

    let buy_executor = Arc::new(BuyExecutor::new(
        Arc::clone(&api),
        Arc::clone(&store),
        Arc::clone(&ledger),
    ));
    let sell_executor = Arc::new(SellExecutor::new(Arc::clone(&api), Arc::clone(&store)));
    let pool = Arc::new(WorkerPool::new(
        queue.clone(),
        receiver,
        buy_executor,
        sell_executor,
        Arc::clone(&store),
        config.worker.max_attempts,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = pool.spawn(config.worker.concurrency, shutdown_rx);
    info!(concurrency = config.worker.concurrency, "worker pool started");

    let mut buy_ticker = interval(Duration::from_secs(config.trading.buy_scan_interval_seconds));
    let mut sell_ticker = interval(Duration::from_secs(config.trading.sell_scan_interval_seconds));
    let mut balance_ticker = interval(Duration::from_secs(
        config.trading.balance_refresh_interval_seconds,
    ));
    let mut stats_ticker = interval(Duration::from_secs(
        config.trading.stats_refresh_interval_seconds,
    ));

    loop {
        tokio::select! {
            _ = buy_ticker.tick() => {
                if let Err(e) = scanner.scan_buys().await {
                    error!(error = %e, "buy scan failed");
                }
            }
            _ = sell_ticker.tick() => {
                if let Err(e) = scanner.reconcile_positions().await {
                    error!(error = %e, "position reconciliation failed");
                }
                if let Err(e) = scanner.scan_sells().await {
                    error!(error = %e, "sell scan failed");
                }
            }
            _ = balance_ticker.tick() => {
                if let Err(e) = scanner.refresh_budget(config.budget.soft_floor).await {
                    error!(error = %e, "budget refresh failed");
                }
            }
            _ = stats_ticker.tick() => {
                if let Err(e) = scanner.refresh_stats().await {
                    error!(error = %e, "stats refresh failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal, stopping workers");
                break;
            }
        }
    }

    // Workers finish their current item, then exit
    shutdown_tx.send(true).ok();
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "worker join failed");
        }
    }
    info!("shutdown complete");

    Ok(())
}
