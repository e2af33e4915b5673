// src/http_source.rs

use crate::source_error::SourceError;
use anyhow::Result;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate-limited JSON GET client for one public HTTP service.
#[derive(Clone)]
pub struct JsonHttpSource {
    name: &'static str,
    base_url: Url,
    client: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl JsonHttpSource {
    pub fn new(
        name: &'static str,
        base_url: &str,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps);

        Ok(Self {
            name,
            base_url,
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::Contract {
                source_name: self.name,
                message: format!("invalid path {path:?}: {e}"),
            })
    }

    /// Waits for the rate limiter, issues the GET and decodes a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        self.limiter.until_ready().await;

        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::transport(self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!("[{}] GET {} -> HTTP {}", self.name, url, status.as_u16());
            return Err(SourceError::from_status(self.name, status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::transport(self.name, e))?;
        debug!(
            "[{}] GET {} -> {} bytes in {:?}",
            self.name,
            url,
            bytes.len(),
            start.elapsed()
        );

        serde_json::from_slice(&bytes)
            .map_err(|e| SourceError::protocol(self.name, format!("JSON parse failed: {e}")))
    }
}
