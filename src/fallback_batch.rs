//! First fallback tier: multi-address balance lookup (blockchain.info `balance?active=`).
//!
//! Up to [`MAX_BATCH_ADDRESSES`] addresses per request. The service answers with an object
//! keyed by address; addresses it does not know are simply missing from the answer, which
//! callers read as "unresolved here", not as an error.

use crate::http_source::JsonHttpSource;
use crate::settings::Fallback;
use crate::source_error::SourceError;
use crate::types::conversions::subunits_to_coin;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Largest address list accepted per batch request.
pub const MAX_BATCH_ADDRESSES: usize = 50;

const SOURCE_NAME: &str = "blockchain.info";

#[async_trait]
pub trait BatchBalanceLookup: Send + Sync {
    /// Balances (whole coins) for whichever of `addresses` the service could resolve.
    /// Passing more than [`MAX_BATCH_ADDRESSES`] addresses is a contract violation.
    async fn lookup(&self, addresses: &[String]) -> Result<HashMap<String, Decimal>, SourceError>;
}

// Response: {"<addr>": {"final_balance": 0, "n_tx": 0, "total_received": 0}, ...}
type MultiBalanceResponse = HashMap<String, AddressBalance>;

#[derive(Debug, Deserialize)]
struct AddressBalance {
    #[serde(default)]
    final_balance: Option<i64>,
}

pub struct BlockchainInfoClient {
    http: JsonHttpSource,
    separator: String,
}

impl BlockchainInfoClient {
    pub fn new(config: &Fallback) -> Result<Self> {
        let http = JsonHttpSource::new(
            SOURCE_NAME,
            &config.batch_base_url,
            Duration::from_secs(config.batch_timeout_seconds.max(1)),
            config.requests_per_second,
        )?;
        Ok(Self {
            http,
            separator: config.batch_separator.clone(),
        })
    }
}

#[async_trait]
impl BatchBalanceLookup for BlockchainInfoClient {
    async fn lookup(&self, addresses: &[String]) -> Result<HashMap<String, Decimal>, SourceError> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        if addresses.len() > MAX_BATCH_ADDRESSES {
            return Err(SourceError::Contract {
                source_name: SOURCE_NAME,
                message: format!(
                    "{} addresses requested, at most {} allowed",
                    addresses.len(),
                    MAX_BATCH_ADDRESSES
                ),
            });
        }

        let mut url = self.http.url("balance")?;
        url.query_pairs_mut()
            .append_pair("active", &addresses.join(&self.separator));

        let response: MultiBalanceResponse = self.http.get_json(url).await?;
        let balances = balances_from_response(addresses, response);
        debug!(
            "[{}] resolved {}/{} addresses",
            SOURCE_NAME,
            balances.len(),
            addresses.len()
        );
        Ok(balances)
    }
}

fn balances_from_response(
    requested: &[String],
    mut response: MultiBalanceResponse,
) -> HashMap<String, Decimal> {
    let mut balances = HashMap::with_capacity(requested.len());
    for address in requested {
        let Some(entry) = response.remove(address) else {
            continue;
        };
        let Some(subunits) = entry.final_balance else {
            continue;
        };
        match subunits_to_coin(subunits) {
            Ok(balance) => {
                balances.insert(address.clone(), balance);
            }
            Err(e) => warn!("⚠️ [{}] ignoring balance for {}: {}", SOURCE_NAME, address, e),
        }
    }
    if !response.is_empty() {
        debug!(
            "[{}] ignoring {} unrequested entries in response",
            SOURCE_NAME,
            response.len()
        );
    }
    balances
}
