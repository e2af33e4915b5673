//! # Resolution Orchestrator
//!
//! The `ResolutionOrchestrator` drives the balance cascade for a list of addresses.
//!
//! ## Overview
//!
//! The cascade is an ordered list of [`ResolutionTier`]s. Each tier receives the addresses
//! that are still unresolved, and returns the balances it found plus the addresses it
//! could not resolve. The next tier only starts once the previous one has finished.
//!
//! Default tiers, in priority order:
//!
//! 1. **Primary** ([`PrimaryTier`]): full node `scantxoutset`. One address uses the single
//!    query (`Primary`); several addresses use one batch scan plus attribution
//!    (`PrimaryBatch`), which resolves every address, zero included.
//! 2. **Fallback batch** ([`FallbackBatchTier`]): chunks of at most 50 addresses against
//!    the multi-address explorer (`FallbackBatch`).
//! 3. **Fallback single** ([`FallbackSingleTier`]): one request per remaining address
//!    (`FallbackSingle`).
//!
//! With `allow_fallback = false` only the primary tier is installed, so a node failure
//! leaves every address `Unresolved` and no public service is contacted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use addr_balance_monitor::orchestrator::ResolutionOrchestrator;
//! use addr_balance_monitor::settings::Settings;
//! use addr_balance_monitor::types::AddressRef;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = Settings::new()?;
//! let orchestrator = ResolutionOrchestrator::from_settings(&settings)?;
//! let outcomes = orchestrator
//!     .resolve(&[AddressRef::new(1, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")])
//!     .await;
//! # Ok(())
//! # }
//! ```

use crate::fallback_batch::{BatchBalanceLookup, BlockchainInfoClient};
use crate::fallback_single::{BlockCypherClient, SingleBalanceLookup};
use crate::metrics;
use crate::primary_source::{NodeRpcClient, PrimarySource};
use crate::settings::{Fallback, Settings};
use crate::source_error::SourceError;
use crate::types::{
    AddressOutcome, AddressRef, Descriptor, ResolutionMethod, ResolutionOutcome,
};
use crate::utils::create_chunks;
use crate::utxo_attributor::{SubstringAttributor, UtxoAttributor};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Balance found by a tier for one address.
#[derive(Debug, Clone, PartialEq)]
pub struct TierResolution {
    pub address: String,
    pub balance: Decimal,
    pub method: ResolutionMethod,
}

/// What one tier did with its pending set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TierResult {
    pub resolved: Vec<TierResolution>,
    /// Addresses handed on to the next tier, in the order received
    pub still_pending: Vec<String>,
}

impl TierResult {
    fn unavailable(pending: Vec<String>) -> Self {
        Self {
            resolved: Vec::new(),
            still_pending: pending,
        }
    }
}

/// One stage of the cascade.
#[async_trait]
pub trait ResolutionTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolves what it can out of `pending` (non-empty, no duplicates, caller order).
    async fn resolve(&self, pending: Vec<String>) -> TierResult;
}

/// Full node tier: single scan for one address, batch scan plus attribution otherwise.
pub struct PrimaryTier {
    source: Arc<dyn PrimarySource>,
    attributor: Arc<dyn UtxoAttributor>,
}

impl PrimaryTier {
    pub fn new(source: Arc<dyn PrimarySource>, attributor: Arc<dyn UtxoAttributor>) -> Self {
        Self { source, attributor }
    }
}

#[async_trait]
impl ResolutionTier for PrimaryTier {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn resolve(&self, pending: Vec<String>) -> TierResult {
        if let [address] = pending.as_slice() {
            let descriptor = Descriptor::for_address(address);
            return match self.source.query_single(&descriptor).await {
                Ok(balance) => TierResult {
                    resolved: vec![TierResolution {
                        address: address.clone(),
                        balance,
                        method: ResolutionMethod::Primary,
                    }],
                    still_pending: Vec::new(),
                },
                Err(e) => {
                    report_source_error(self.name(), &e);
                    TierResult::unavailable(pending)
                }
            };
        }

        let descriptors: Vec<Descriptor> = pending
            .iter()
            .map(|a| Descriptor::for_address(a))
            .collect();

        match self.source.query_batch(&descriptors).await {
            Ok(records) => {
                debug!(
                    "[primary] batch scan returned {} unspent outputs for {} addresses",
                    records.len(),
                    pending.len()
                );
                let balances = self.attributor.attribute(&pending, &records);
                TierResult {
                    resolved: balances
                        .into_iter()
                        .map(|(address, balance)| TierResolution {
                            address,
                            balance,
                            method: ResolutionMethod::PrimaryBatch,
                        })
                        .collect(),
                    still_pending: Vec::new(),
                }
            }
            Err(e) => {
                report_source_error(self.name(), &e);
                TierResult::unavailable(pending)
            }
        }
    }
}

/// Multi-address explorer tier, chunked to the service limit.
pub struct FallbackBatchTier {
    client: Arc<dyn BatchBalanceLookup>,
    chunk_size: usize,
    max_concurrent: usize,
}

impl FallbackBatchTier {
    pub fn new(client: Arc<dyn BatchBalanceLookup>, chunk_size: usize, max_concurrent: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.clamp(1, crate::fallback_batch::MAX_BATCH_ADDRESSES),
            max_concurrent: max_concurrent.max(1),
        }
    }
}

#[async_trait]
impl ResolutionTier for FallbackBatchTier {
    fn name(&self) -> &'static str {
        "fallback_batch"
    }

    async fn resolve(&self, pending: Vec<String>) -> TierResult {
        let chunks = create_chunks(&pending, self.chunk_size);
        debug!(
            "[fallback_batch] {} addresses in {} chunks (max {} per chunk)",
            pending.len(),
            chunks.len(),
            self.chunk_size
        );

        let client = &self.client;
        // buffered() yields in submission order, so chunk order is kept
        let responses: Vec<(Vec<String>, Result<HashMap<String, Decimal>, SourceError>)> =
            stream::iter(chunks)
                .map(|chunk| async move {
                    let response = client.lookup(&chunk).await;
                    (chunk, response)
                })
                .buffered(self.max_concurrent)
                .collect()
                .await;

        let mut result = TierResult::default();
        for (chunk, response) in responses {
            let balances = match response {
                Ok(balances) => balances,
                Err(e) => {
                    report_source_error(self.name(), &e);
                    HashMap::new()
                }
            };
            for address in chunk {
                match balances.get(&address) {
                    Some(balance) => result.resolved.push(TierResolution {
                        address,
                        balance: *balance,
                        method: ResolutionMethod::FallbackBatch,
                    }),
                    None => result.still_pending.push(address),
                }
            }
        }
        result
    }
}

/// Single-address explorer tier.
pub struct FallbackSingleTier {
    client: Arc<dyn SingleBalanceLookup>,
    max_concurrent: usize,
}

impl FallbackSingleTier {
    pub fn new(client: Arc<dyn SingleBalanceLookup>, max_concurrent: usize) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
        }
    }
}

#[async_trait]
impl ResolutionTier for FallbackSingleTier {
    fn name(&self) -> &'static str {
        "fallback_single"
    }

    async fn resolve(&self, pending: Vec<String>) -> TierResult {
        let client = &self.client;
        let responses: Vec<(String, Result<Decimal, SourceError>)> = stream::iter(pending)
            .map(|address| async move {
                let response = client.lookup(&address).await;
                (address, response)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut result = TierResult::default();
        for (address, response) in responses {
            match response {
                Ok(balance) => result.resolved.push(TierResolution {
                    address,
                    balance,
                    method: ResolutionMethod::FallbackSingle,
                }),
                Err(e) => {
                    debug!("[fallback_single] {} unresolved: {}", address, e);
                    report_source_error(self.name(), &e);
                    result.still_pending.push(address);
                }
            }
        }
        result
    }
}

fn report_source_error(tier: &'static str, err: &SourceError) {
    metrics::increment_source_errors(tier, err.kind());
    match err {
        SourceError::NotFound(_) => debug!("[{}] {}", tier, err),
        _ => warn!("⚠️ [{}] source unavailable: {}", tier, err),
    }
}

/// Runs the cascade over a list of addresses.
pub struct ResolutionOrchestrator {
    tiers: Vec<Box<dyn ResolutionTier>>,
}

impl ResolutionOrchestrator {
    /// Builds the default cascade. Fallback tiers are only installed when
    /// `config.allow_fallback` is set.
    pub fn new(
        primary: Arc<dyn PrimarySource>,
        attributor: Arc<dyn UtxoAttributor>,
        batch: Arc<dyn BatchBalanceLookup>,
        single: Arc<dyn SingleBalanceLookup>,
        config: &Fallback,
    ) -> Self {
        let mut tiers: Vec<Box<dyn ResolutionTier>> =
            vec![Box::new(PrimaryTier::new(primary, attributor))];
        if config.allow_fallback {
            tiers.push(Box::new(FallbackBatchTier::new(
                batch,
                config.effective_chunk_size(),
                config.max_concurrent_requests,
            )));
            tiers.push(Box::new(FallbackSingleTier::new(
                single,
                config.max_concurrent_requests,
            )));
        }
        Self { tiers }
    }

    /// Cascade with an explicit tier list, applied in the given order.
    pub fn with_tiers(tiers: Vec<Box<dyn ResolutionTier>>) -> Self {
        Self { tiers }
    }

    /// Wires the network clients described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let primary = Arc::new(NodeRpcClient::new(&settings.rpc)?);
        let batch = Arc::new(BlockchainInfoClient::new(&settings.fallback)?);
        let single = Arc::new(BlockCypherClient::new(&settings.fallback)?);
        Ok(Self::new(
            primary,
            Arc::new(SubstringAttributor),
            batch,
            single,
            &settings.fallback,
        ))
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Resolves every address, returning exactly one outcome per entry of `addresses`,
    /// in the same order. Repeated address strings are queried once and share the outcome.
    pub async fn resolve(&self, addresses: &[AddressRef]) -> Vec<AddressOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("resolution_run", %run_id, addresses = addresses.len());
        self.resolve_inner(addresses).instrument(span).await
    }

    /// Interactive single-address resolve; same cascade, pending set of one.
    pub async fn resolve_one(&self, address: &AddressRef) -> AddressOutcome {
        let mut outcomes = self.resolve(std::slice::from_ref(address)).await;
        outcomes.pop().unwrap_or_else(|| AddressOutcome {
            address: address.clone(),
            outcome: ResolutionOutcome::Unresolved,
        })
    }

    async fn resolve_inner(&self, addresses: &[AddressRef]) -> Vec<AddressOutcome> {
        let start = Instant::now();

        let mut results: IndexMap<String, Option<(Decimal, ResolutionMethod)>> = IndexMap::new();
        for address in addresses {
            results.entry(address.address.clone()).or_insert(None);
        }
        let mut pending: Vec<String> = results.keys().cloned().collect();

        for tier in &self.tiers {
            if pending.is_empty() {
                break;
            }
            let handed = pending.len();
            metrics::increment_tier_attempts(tier.name(), handed);

            let tier_result = tier.resolve(pending).await;
            let mut accepted = 0usize;
            for resolution in tier_result.resolved {
                if resolution.balance < Decimal::ZERO {
                    warn!(
                        "[{}] ignoring negative balance {} for {}",
                        tier.name(),
                        resolution.balance,
                        resolution.address
                    );
                    continue;
                }
                match results.get_mut(&resolution.address) {
                    Some(slot) if slot.is_none() => {
                        *slot = Some((resolution.balance, resolution.method));
                        metrics::increment_resolved(resolution.method.metric_name());
                        accepted += 1;
                    }
                    Some(_) => warn!(
                        "[{}] ignoring second result for already resolved {}",
                        tier.name(),
                        resolution.address
                    ),
                    None => warn!(
                        "[{}] ignoring result for unrequested {}",
                        tier.name(),
                        resolution.address
                    ),
                }
            }

            // Next tier sees exactly what is still unresolved, in caller order
            pending = results
                .iter()
                .filter(|(_, r)| r.is_none())
                .map(|(a, _)| a.clone())
                .collect();
            if pending.len() != tier_result.still_pending.len() {
                debug!(
                    "[{}] reported {} pending, {} actually unresolved",
                    tier.name(),
                    tier_result.still_pending.len(),
                    pending.len()
                );
            }
            info!(
                "[{}] resolved {}/{} addresses, {} left",
                tier.name(),
                accepted,
                handed,
                pending.len()
            );
        }

        if !pending.is_empty() {
            metrics::increment_unresolved(pending.len());
            warn!(
                "⚠️ {} addresses unresolved after {} tiers",
                pending.len(),
                self.tiers.len()
            );
        }

        let elapsed = start.elapsed();
        metrics::record_resolution_run(elapsed);
        debug!("resolution run finished in {:?}", elapsed);

        addresses
            .iter()
            .map(|address| {
                let outcome = match results.get(&address.address) {
                    Some(Some((balance, method))) => ResolutionOutcome::Resolved {
                        balance: *balance,
                        method: *method,
                    },
                    _ => ResolutionOutcome::Unresolved,
                };
                AddressOutcome {
                    address: address.clone(),
                    outcome,
                }
            })
            .collect()
    }
}
