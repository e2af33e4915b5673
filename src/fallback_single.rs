//! Last-resort tier: single-address balance lookup (BlockCypher `addrs/{address}/balance`).

use crate::http_source::JsonHttpSource;
use crate::settings::Fallback;
use crate::source_error::SourceError;
use crate::types::conversions::subunits_to_coin;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use url::form_urlencoded;

const SOURCE_NAME: &str = "blockcypher";

#[async_trait]
pub trait SingleBalanceLookup: Send + Sync {
    /// Balance (whole coins) of one address.
    async fn lookup(&self, address: &str) -> Result<Decimal, SourceError>;
}

#[derive(Debug, Deserialize)]
struct AddressBalanceResponse {
    #[serde(default)]
    final_balance: Option<i64>,
}

pub struct BlockCypherClient {
    http: JsonHttpSource,
}

impl BlockCypherClient {
    pub fn new(config: &Fallback) -> Result<Self> {
        let http = JsonHttpSource::new(
            SOURCE_NAME,
            &config.single_base_url,
            Duration::from_secs(config.single_timeout_seconds.max(1)),
            config.requests_per_second,
        )?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SingleBalanceLookup for BlockCypherClient {
    async fn lookup(&self, address: &str) -> Result<Decimal, SourceError> {
        let encoded: String = form_urlencoded::byte_serialize(address.as_bytes()).collect();
        let url = self.http.url(&format!("addrs/{encoded}/balance"))?;
        let response: AddressBalanceResponse = self.http.get_json(url).await?;
        balance_from_response(response)
    }
}

fn balance_from_response(response: AddressBalanceResponse) -> Result<Decimal, SourceError> {
    let subunits = response
        .final_balance
        .ok_or_else(|| SourceError::protocol(SOURCE_NAME, "response without final_balance"))?;
    subunits_to_coin(subunits).map_err(|e| SourceError::protocol(SOURCE_NAME, e.to_string()))
}
