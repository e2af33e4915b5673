use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A watched address as persisted by the balance store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedAddress {
    pub id: i64,
    pub label: String,
    pub address: String,
    /// Last known confirmed balance in whole coins
    pub balance: Decimal,
    /// Label of the source that produced `balance` (None until first resolution)
    pub method: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WatchedAddress {
    pub fn to_ref(&self) -> AddressRef {
        AddressRef {
            id: self.id,
            address: self.address.clone(),
        }
    }
}

/// Entry parsed from operator input, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAddress {
    pub label: String,
    pub address: String,
}

/// What the engine needs to know about an address: store id plus the address text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressRef {
    pub id: i64,
    pub address: String,
}

impl AddressRef {
    pub fn new(id: i64, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

/// Query key understood by the full node: `addr(<address>)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Descriptor(String);

impl Descriptor {
    pub fn for_address(address: &str) -> Self {
        Self(format!("addr({address})"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unspent output as returned by a batch scan, reduced to what summation needs.
///
/// `desc` is the node's descriptor text for the output, e.g. `addr(bc1q...)#checksum`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnspentRecord {
    pub desc: String,
    pub amount: Decimal,
}

impl UnspentRecord {
    pub fn new(desc: impl Into<String>, amount: Decimal) -> Self {
        Self {
            desc: desc.into(),
            amount,
        }
    }
}

/// Cascade tier that produced a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionMethod {
    /// Full node, single descriptor scan
    Primary,
    /// Full node, multi descriptor scan plus attribution
    PrimaryBatch,
    /// Public multi-address lookup
    FallbackBatch,
    /// Public single-address lookup
    FallbackSingle,
}

impl ResolutionMethod {
    /// Label persisted next to the balance.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primary => "RPC",
            Self::PrimaryBatch => "RPC Batch",
            Self::FallbackBatch => "Blockchain.info Batch",
            Self::FallbackSingle => "BlockCypher",
        }
    }

    /// Short name used for metrics labels.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryBatch => "primary_batch",
            Self::FallbackBatch => "fallback_batch",
            Self::FallbackSingle => "fallback_single",
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved {
        balance: Decimal,
        method: ResolutionMethod,
    },
    Unresolved,
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    pub fn balance(&self) -> Option<Decimal> {
        match self {
            Self::Resolved { balance, .. } => Some(*balance),
            Self::Unresolved => None,
        }
    }

    pub fn method(&self) -> Option<ResolutionMethod> {
        match self {
            Self::Resolved { method, .. } => Some(*method),
            Self::Unresolved => None,
        }
    }
}

/// Outcome for one requested address.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressOutcome {
    pub address: AddressRef,
    pub outcome: ResolutionOutcome,
}
