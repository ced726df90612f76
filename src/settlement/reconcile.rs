//! Resting-order reconciler - polls the exchange for LIMIT orders that
//! were left on the book and feeds newly-filled ones back through the
//! settlement path. Runs as a background task; cancelled on shutdown
//! without draining in-flight settlements.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{OrderStatus, Result};
use crate::exchange::ExchangeClient;
use crate::settlement::SettlementPipeline;
use crate::storage::Storage;

pub struct Reconciler {
    storage: Arc<dyn Storage>,
    exchange: Arc<dyn ExchangeClient>,
    pipeline: Arc<SettlementPipeline>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        storage: Arc<dyn Storage>,
        exchange: Arc<dyn ExchangeClient>,
        pipeline: Arc<SettlementPipeline>,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            exchange,
            pipeline,
            interval,
        }
    }

    /// Spawn the polling loop. The returned handle is aborted on
    /// shutdown.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("reconcile sweep failed: {}", e);
                }
            }
        })
    }

    /// One pass over resting orders. Failures are isolated per order.
    pub async fn sweep(&self) -> Result<()> {
        let resting = self.storage.find_resting_orders().await?;
        if resting.is_empty() {
            return Ok(());
        }
        debug!("polling {} resting orders", resting.len());

        for order in resting {
            let Some(remote_id) = order.remote_order_id.clone() else {
                continue;
            };

            match self.exchange.get_order(&order.symbol, &remote_id).await {
                Ok(remote) if remote.status == OrderStatus::Filled => {
                    info!("resting order {} filled remotely, settling", order.id);
                    if let Err(e) = self.pipeline.settle_resting(&order, &remote).await {
                        error!("settling resting order {} failed: {}", order.id, e);
                    }
                }
                Ok(remote) if remote.status == OrderStatus::Rejected => {
                    // stop polling an order the exchange gave up on
                    let mut rejected = order.clone();
                    rejected.status = OrderStatus::Rejected;
                    if let Err(e) = self.storage.update_order(&rejected).await {
                        error!("marking order {} rejected failed: {}", order.id, e);
                    }
                }
                Ok(_) => {} // still resting
                Err(e) => warn!("poll failed for order {}: {}", order.id, e),
            }
        }
        Ok(())
    }
}
