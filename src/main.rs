use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use helix_tx::api::TradeGateway;
use helix_tx::core::{Config, RunMode};
use helix_tx::exchange::{BinanceClient, ExchangeClient, PaperExchange};
use helix_tx::queue::{spawn_workers, TaskQueue};
use helix_tx::settlement::{KeyedLocks, Reconciler, SettlementPipeline};
use helix_tx::storage::{MemoryStore, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // 1. Load config (optional path argument), then logging
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&PathBuf::from(path))?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},helix_tx=debug", config.app.log_level))
    });
    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!("helix-tx starting in {:?} mode", config.app.mode);

    // 2. Storage handle and exchange connectivity, injected everywhere
    let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let exchange: Arc<dyn ExchangeClient> = match config.app.mode {
        RunMode::Paper => Arc::new(PaperExchange::new()),
        RunMode::Live => {
            let api_key = config
                .exchange
                .api_key
                .clone()
                .or_else(|| std::env::var("EXCHANGE_API_KEY").ok())
                .ok_or_else(|| anyhow::anyhow!("missing exchange API key"))?;
            let api_secret = config
                .exchange
                .api_secret
                .clone()
                .or_else(|| std::env::var("EXCHANGE_API_SECRET").ok())
                .ok_or_else(|| anyhow::anyhow!("missing exchange API secret"))?;
            Arc::new(BinanceClient::new(
                api_key,
                api_secret,
                config.exchange.testnet,
            ))
        }
    };

    // 3. Settlement pipeline and worker pool
    let locks = Arc::new(KeyedLocks::new());
    let pipeline = Arc::new(SettlementPipeline::new(
        storage.clone(),
        exchange.clone(),
        locks.clone(),
    ));
    let (queue, rx) = TaskQueue::new(config.trading.queue_capacity);
    let workers = spawn_workers(config.trading.workers, rx, pipeline.clone());

    // 4. Resting-order reconciler cron
    let reconciler = config.reconcile.enabled.then(|| {
        Reconciler::new(
            storage.clone(),
            exchange.clone(),
            pipeline.clone(),
            Duration::from_secs(config.reconcile.interval_secs),
        )
        .spawn()
    });

    // 5. Gateway handed to the host web layer
    let gateway = TradeGateway::new(storage.clone(), queue.clone(), locks);
    tracing::info!("gateway ready, {} workers online", config.trading.workers);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown: cancelling background tasks");

    // Cron stops now; in-flight settlements run to completion once the
    // queue's senders are gone.
    if let Some(handle) = reconciler {
        handle.abort();
    }
    drop(gateway);
    drop(queue);
    for worker in workers {
        let _ = worker.await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}
