//! # Address Balance Monitor
//!
//! Balance resolution for a watch-list of Bitcoin addresses. A trusted full node is asked
//! first; public block explorers are used only for whatever the node could not answer.
//!
//! ## Overview
//!
//! Every resolution run produces exactly one [`types::ResolutionOutcome`] per requested
//! address: either a balance together with the method that produced it, or `Unresolved`.
//! Source failures never abort a run; they push addresses down the cascade.
//!
//! ## Architecture
//!
//! ### Sources
//! Full node `scantxoutset` over JSON-RPC, a multi-address explorer (≤ 50 addresses per
//! request) and a single-address explorer.
//!
//! ### Cascade
//! The [`orchestrator::ResolutionOrchestrator`] runs the tiers in priority order and keeps
//! the first balance found for each address.
//!
//! ### Watch-list & Refresh
//! A Postgres-backed watch-list and the refresh runner that persists resolved balances.

// Core Types
/// Addresses, descriptors, unspent records and resolution outcomes
pub mod types;
/// Errors reported by balance sources
pub mod source_error;

// Balance Sources
/// Full node JSON-RPC client (`scantxoutset`, `getblockchaininfo`)
pub mod primary_source;
/// Attribution of batch-scan unspents to addresses
pub mod utxo_attributor;
/// Rate-limited JSON over HTTP shared by the explorer clients
pub mod http_source;
/// Multi-address explorer client
pub mod fallback_batch;
/// Single-address explorer client
pub mod fallback_single;

// Cascade
/// Resolution orchestrator and its tiers
pub mod orchestrator;

// Watch-list
/// Operator input parsing
pub mod watchlist;
/// PostgreSQL watch-list store
pub mod database;
/// Periodic and interactive refresh
pub mod refresh;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// General utilities
pub mod utils;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use orchestrator::ResolutionOrchestrator;
pub use settings::Settings;
pub use source_error::SourceError;
pub use types::{AddressRef, ResolutionMethod, ResolutionOutcome};
