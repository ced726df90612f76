//! Task dispatch queue - decouples the request boundary from settlement.
//!
//! A flume MPMC channel hands each queued intent to exactly one worker.
//! Workers catch every pipeline error at the top of the loop, log it,
//! and move on; a failed task is dropped, never retried.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::{Error, OrderIntent, Result};
use crate::settlement::SettlementPipeline;

/// Producer handle held by the request boundary. Enqueue never blocks.
#[derive(Clone)]
pub struct TaskQueue {
    tx: flume::Sender<OrderIntent>,
}

impl TaskQueue {
    /// Build the queue. capacity 0 means unbounded.
    pub fn new(capacity: usize) -> (Self, flume::Receiver<OrderIntent>) {
        let (tx, rx) = if capacity == 0 {
            flume::unbounded()
        } else {
            flume::bounded(capacity)
        };
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, intent: OrderIntent) -> Result<()> {
        self.tx
            .try_send(intent)
            .map_err(|e| Error::Queue(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Spawn the settlement worker pool. Each worker drains the shared
/// receiver until the last sender is dropped.
pub fn spawn_workers(
    count: usize,
    rx: flume::Receiver<OrderIntent>,
    pipeline: Arc<SettlementPipeline>,
) -> Vec<JoinHandle<()>> {
    info!("starting {} settlement workers", count);
    (0..count)
        .map(|worker| {
            let rx = rx.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                while let Ok(intent) = rx.recv_async().await {
                    let intent_id = intent.intent_id;
                    debug!("worker {} picked up intent {}", worker, intent_id);
                    if let Err(e) = pipeline.process(intent).await {
                        // task isolation: log with context and drop
                        error!("settlement of intent {} failed: {}", intent_id, e);
                    }
                }
                debug!("worker {} stopping, queue closed", worker);
            })
        })
        .collect()
}
