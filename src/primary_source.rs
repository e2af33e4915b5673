//! # Primary Source (full node JSON-RPC)
//!
//! Balance queries against a Bitcoin Core node through `scantxoutset`, which answers from
//! the node's UTXO set without needing a wallet or an address index.
//!
//! - **Single**: `scantxoutset start ["addr(A)"]` and read `total_amount`
//! - **Batch**: `scantxoutset start ["addr(A)", "addr(B)", ...]` and return `unspents`;
//!   the node sums across all descriptors, so per-address attribution happens in
//!   [`crate::utxo_attributor`]
//!
//! Every failure (transport, credentials, HTTP status, RPC error, missing fields) is a
//! [`SourceError`]; callers treat all of them as "unavailable".

use crate::settings::Rpc;
use crate::source_error::SourceError;
use crate::types::conversions::json_number_to_decimal;
use crate::types::{Descriptor, UnspentRecord};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use std::time::{Duration, Instant};

const SOURCE_NAME: &str = "full node";
const RPC_REQUEST_ID: &str = "addr-monitor";

/// The authoritative balance source.
#[async_trait]
pub trait PrimarySource: Send + Sync {
    /// Scans all descriptors in one call. An empty list is a valid answer (nothing unspent).
    async fn query_batch(&self, descriptors: &[Descriptor]) -> Result<Vec<UnspentRecord>, SourceError>;

    /// Scans one descriptor and returns its total unspent amount.
    async fn query_single(&self, descriptor: &Descriptor) -> Result<Decimal, SourceError>;
}

/// Chain summary shown by the operator CLI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeStatus {
    pub chain: String,
    pub blocks: u64,
    #[serde(default)]
    pub headers: u64,
    #[serde(default, rename = "verificationprogress")]
    pub verification_progress: f64,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct ScanResult {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    unspents: Option<Vec<RawUnspent>>,
    #[serde(default)]
    total_amount: Option<Number>,
}

#[derive(Deserialize)]
struct RawUnspent {
    desc: String,
    amount: Number,
}

/// JSON-RPC client for a Bitcoin Core compatible node.
pub struct NodeRpcClient {
    endpoint: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl NodeRpcClient {
    pub fn new(config: &Rpc) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint(),
            user: config.user.clone(),
            password: config.password.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issues one JSON-RPC call and returns the `result` member.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, SourceError> {
        let start = Instant::now();
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: RPC_REQUEST_ID,
            method,
            params,
        };

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .json(&request);
        if !self.user.is_empty() {
            builder = builder.basic_auth(&self.user, Some(&self.password));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SourceError::transport(SOURCE_NAME, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::transport(SOURCE_NAME, e))?;

        debug!(
            "[RPC] {} -> HTTP {} in {:?} ({} bytes)",
            method,
            status.as_u16(),
            start.elapsed(),
            body.len()
        );

        decode_envelope(status, &body)
    }

    pub async fn blockchain_info(&self) -> Result<NodeStatus, SourceError> {
        let result = self.call("getblockchaininfo", json!([])).await?;
        serde_json::from_value(result)
            .map_err(|e| SourceError::protocol(SOURCE_NAME, format!("getblockchaininfo: {e}")))
    }

    async fn scan(&self, descriptors: &[Descriptor]) -> Result<ScanResult, SourceError> {
        let result = self
            .call("scantxoutset", json!(["start", descriptors]))
            .await?;
        let scan: ScanResult = serde_json::from_value(result)
            .map_err(|e| SourceError::protocol(SOURCE_NAME, format!("scantxoutset: {e}")))?;
        if scan.success == Some(false) {
            return Err(SourceError::protocol(SOURCE_NAME, "scantxoutset reported success=false"));
        }
        Ok(scan)
    }
}

#[async_trait]
impl PrimarySource for NodeRpcClient {
    async fn query_batch(&self, descriptors: &[Descriptor]) -> Result<Vec<UnspentRecord>, SourceError> {
        let scan = self.scan(descriptors).await.map_err(|e| {
            warn!("⚠️ [RPC] batch scan of {} descriptors failed: {}", descriptors.len(), e);
            e
        })?;
        unspents_from_scan(scan)
    }

    async fn query_single(&self, descriptor: &Descriptor) -> Result<Decimal, SourceError> {
        let scan = self
            .scan(std::slice::from_ref(descriptor))
            .await
            .map_err(|e| {
                warn!("⚠️ [RPC] scan of {} failed: {}", descriptor, e);
                e
            })?;
        total_from_scan(scan)
    }
}

fn decode_envelope(status: StatusCode, body: &str) -> Result<Value, SourceError> {
    let envelope = serde_json::from_str::<RpcEnvelope>(body);

    if status != StatusCode::OK {
        // Bitcoin Core answers RPC errors with HTTP 500 and a populated `error`
        if let Ok(RpcEnvelope { error: Some(err), .. }) = &envelope {
            if !err.is_null() {
                return Err(SourceError::protocol(
                    SOURCE_NAME,
                    format!("HTTP {}: {}", status.as_u16(), describe_rpc_error(err)),
                ));
            }
        }
        return Err(SourceError::from_status(SOURCE_NAME, status));
    }

    let envelope = envelope
        .map_err(|e| SourceError::protocol(SOURCE_NAME, format!("invalid JSON envelope: {e}")))?;
    if let Some(err) = envelope.error.filter(|e| !e.is_null()) {
        return Err(SourceError::protocol(SOURCE_NAME, describe_rpc_error(&err)));
    }
    match envelope.result {
        Some(result) if !result.is_null() => Ok(result),
        _ => Err(SourceError::protocol(SOURCE_NAME, "missing result")),
    }
}

fn describe_rpc_error(err: &Value) -> String {
    let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown RPC error");
    format!("code {code}: {message}")
}

fn unspents_from_scan(scan: ScanResult) -> Result<Vec<UnspentRecord>, SourceError> {
    let raw = scan
        .unspents
        .ok_or_else(|| SourceError::protocol(SOURCE_NAME, "scan result without unspents"))?;
    raw.into_iter()
        .map(|u| {
            let amount = json_number_to_decimal(&u.amount)
                .map_err(|e| SourceError::protocol(SOURCE_NAME, e.to_string()))?;
            Ok(UnspentRecord::new(u.desc, amount))
        })
        .collect()
}

fn total_from_scan(scan: ScanResult) -> Result<Decimal, SourceError> {
    let total = scan
        .total_amount
        .ok_or_else(|| SourceError::protocol(SOURCE_NAME, "scan result without total_amount"))?;
    json_number_to_decimal(&total).map_err(|e| SourceError::protocol(SOURCE_NAME, e.to_string()))
}
