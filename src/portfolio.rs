//! Portfolio reconciler - per-user per-asset holdings under buy/sell
//! mutation. Neither operation is idempotent; the settlement pipeline
//! guarantees at-most-once invocation per fill via its intent claim.

use rust_decimal::Decimal;

use crate::core::{Error, Portfolio, Result, Symbol};
use crate::ledger::quantize;
use crate::storage::Storage;

/// Snapshot of a holding before a mutation, kept so a failed settlement
/// can put the row back.
#[derive(Debug, Clone)]
pub enum PriorHolding {
    Absent,
    Present(Portfolio),
}

/// Create the holding on first buy, otherwise fold the new cost basis
/// into the quantity-weighted average price.
pub async fn apply_buy(
    storage: &dyn Storage,
    user_id: &str,
    symbol: &Symbol,
    qty: Decimal,
    price: Decimal,
) -> Result<PriorHolding> {
    match storage.find_portfolio(user_id, symbol).await? {
        None => {
            storage
                .upsert_portfolio(&Portfolio {
                    user_id: user_id.to_string(),
                    symbol: symbol.clone(),
                    quantity: quantize(qty),
                    avg_buy_price: quantize(price),
                })
                .await?;
            Ok(PriorHolding::Absent)
        }
        Some(prior) => {
            let new_qty = prior.quantity + qty;
            let new_avg = (prior.quantity * prior.avg_buy_price + qty * price) / new_qty;
            storage
                .upsert_portfolio(&Portfolio {
                    user_id: user_id.to_string(),
                    symbol: symbol.clone(),
                    quantity: quantize(new_qty),
                    avg_buy_price: quantize(new_avg),
                })
                .await?;
            Ok(PriorHolding::Present(prior))
        }
    }
}

/// Decrement the holding; delete the row when it lands on exactly zero.
/// avg_buy_price is untouched on a partial sell.
pub async fn apply_sell(
    storage: &dyn Storage,
    user_id: &str,
    symbol: &Symbol,
    qty: Decimal,
) -> Result<PriorHolding> {
    let prior = storage
        .find_portfolio(user_id, symbol)
        .await?
        .ok_or(Error::InsufficientHoldings {
            have: Decimal::ZERO,
            want: qty,
        })?;

    if prior.quantity < qty {
        return Err(Error::InsufficientHoldings {
            have: prior.quantity,
            want: qty,
        });
    }

    let remaining = quantize(prior.quantity - qty);
    if remaining.is_zero() {
        storage.delete_portfolio(user_id, symbol).await?;
    } else {
        storage
            .upsert_portfolio(&Portfolio {
                quantity: remaining,
                ..prior.clone()
            })
            .await?;
    }
    Ok(PriorHolding::Present(prior))
}

/// Put a holding back to its pre-mutation state. Compensation path only.
pub async fn restore_holding(
    storage: &dyn Storage,
    user_id: &str,
    symbol: &Symbol,
    prior: &PriorHolding,
) -> Result<()> {
    match prior {
        PriorHolding::Absent => storage.delete_portfolio(user_id, symbol).await,
        PriorHolding::Present(row) => storage.upsert_portfolio(row).await,
    }
}
