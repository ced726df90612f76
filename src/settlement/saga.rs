//! Settlement saga - compensating-action table for the multi-document
//! ledger update. The storage layer only guarantees per-document
//! atomicity, so a failure partway through the Order/Transaction/
//! Portfolio/Credits/CreditsHistory sequence rolls the applied steps
//! back in reverse instead of leaving partial state behind.

use tracing::{error, warn};
use uuid::Uuid;

use crate::core::{Order, Result, Symbol, User};
use crate::portfolio::{restore_holding, PriorHolding};
use crate::storage::Storage;

/// One applied step, stored as the action that undoes it.
pub enum Compensation {
    RemoveTransaction(Uuid),
    RestoreHolding {
        user_id: String,
        symbol: Symbol,
        prior: PriorHolding,
    },
    RestoreUser(User),
    RestoreOrder(Order),
}

pub struct Saga<'a> {
    storage: &'a dyn Storage,
    applied: Vec<Compensation>,
}

impl<'a> Saga<'a> {
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self {
            storage,
            applied: Vec::new(),
        }
    }

    /// Record the undo for a step that just succeeded.
    pub fn record(&mut self, compensation: Compensation) {
        self.applied.push(compensation);
    }

    /// All steps landed; nothing to undo.
    pub fn commit(mut self) {
        self.applied.clear();
    }

    /// Undo applied steps in reverse order. Best effort: a failing
    /// compensation is logged and the rest still run.
    pub async fn compensate(mut self) {
        while let Some(compensation) = self.applied.pop() {
            if let Err(e) = self.run_one(&compensation).await {
                error!("compensation failed, manual reconciliation needed: {}", e);
            }
        }
    }

    async fn run_one(&self, compensation: &Compensation) -> Result<()> {
        match compensation {
            Compensation::RemoveTransaction(id) => {
                warn!("rolling back transaction {}", id);
                self.storage.delete_transaction(*id).await
            }
            Compensation::RestoreHolding {
                user_id,
                symbol,
                prior,
            } => {
                warn!("rolling back holding {}:{}", user_id, symbol);
                restore_holding(self.storage, user_id, symbol, prior).await
            }
            Compensation::RestoreUser(user) => {
                warn!("rolling back credits for {}", user.id);
                self.storage.save_user(user).await
            }
            Compensation::RestoreOrder(order) => {
                warn!("rolling back order {} to {:?}", order.id, order.status);
                self.storage.update_order(order).await
            }
        }
    }
}
