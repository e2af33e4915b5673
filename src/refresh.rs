//! Refresh runner: the periodic job that feeds the watch-list through the cascade and
//! persists what came back.
//!
//! The orchestrator never touches storage; this module is the caller that lists pending
//! addresses, resolves them and writes each resolved balance. A failed write only affects
//! its own address.

use crate::database::BalanceStore;
use crate::fallback_batch::MAX_BATCH_ADDRESSES;
use crate::metrics;
use crate::orchestrator::ResolutionOrchestrator;
use crate::types::{AddressOutcome, AddressRef, ResolutionOutcome};
use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info, warn};

/// Counts for one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub requested: usize,
    pub updated: usize,
    pub failed: usize,
    pub write_errors: usize,
}

/// One refresh pass over the stalest `limit` addresses (capped at 50).
pub async fn refresh_batch(
    store: &dyn BalanceStore,
    orchestrator: &ResolutionOrchestrator,
    limit: usize,
) -> Result<RefreshSummary> {
    let limit = limit.min(MAX_BATCH_ADDRESSES);
    let rows = store.list_pending(limit).await?;
    if rows.is_empty() {
        info!("No addresses in database.");
        return Ok(RefreshSummary::default());
    }

    info!("🔄 Starting batch update for {} addresses...", rows.len());
    let refs: Vec<AddressRef> = rows.iter().map(|r| r.to_ref()).collect();
    let outcomes = orchestrator.resolve(&refs).await;

    let mut summary = RefreshSummary {
        requested: refs.len(),
        ..RefreshSummary::default()
    };
    for outcome in &outcomes {
        match persist_outcome(store, outcome).await {
            Ok(true) => summary.updated += 1,
            Ok(false) => summary.failed += 1,
            Err(e) => {
                summary.write_errors += 1;
                metrics::increment_store_write_errors();
                error!("❌ Failed to store balance for {}: {:#}", outcome.address.address, e);
            }
        }
    }

    info!(
        "✅ Batch update done: {} updated, {} failed, {} write errors",
        summary.updated, summary.failed, summary.write_errors
    );
    Ok(summary)
}

/// Interactive update of one stored address.
pub async fn refresh_one(
    store: &dyn BalanceStore,
    orchestrator: &ResolutionOrchestrator,
    id: i64,
) -> Result<AddressOutcome> {
    let row = store
        .get_address(id)
        .await?
        .ok_or_else(|| anyhow!("address id {} not found", id))?;

    let outcome = orchestrator.resolve_one(&row.to_ref()).await;
    persist_outcome(store, &outcome).await?;
    Ok(outcome)
}

/// Writes a resolved balance; returns false for unresolved outcomes.
async fn persist_outcome(store: &dyn BalanceStore, outcome: &AddressOutcome) -> Result<bool> {
    match outcome.outcome {
        ResolutionOutcome::Resolved { balance, method } => {
            store
                .write_balance(outcome.address.id, balance, Utc::now(), method)
                .await?;
            info!("Updated {}: {} BTC ({})", outcome.address.address, balance, method);
            Ok(true)
        }
        ResolutionOutcome::Unresolved => {
            warn!("Failed to update {}", outcome.address.address);
            Ok(false)
        }
    }
}
