//! Content retrieval boundary - the watchdog consumes fetched bytes through
//! the [`Fetch`] trait so tests can substitute canned responses.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::warn;

use crate::error::{Result, WatchError};

/// One fetched response. Ephemeral; never persisted.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub status: u16,
    /// URL after following redirects
    pub final_url: String,
}

/// Retrieval seam between the watchdog core and the network
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, verify_tls: bool) -> Result<FetchResult>;
}

/// HTTP fetcher with bounded immediate retries and no backoff.
///
/// Non-2xx responses are returned as results, not errors; classifying the
/// status code is the check engine's job. Only transport failures retry.
pub struct HttpFetcher {
    timeout: Duration,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(timeout_seconds: u64, max_retries: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
            max_retries,
        }
    }

    async fn get_once(&self, client: &Client, url: &str) -> reqwest::Result<FetchResult> {
        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(FetchResult {
            body,
            headers,
            status,
            final_url,
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(30, 2)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, verify_tls: bool) -> Result<FetchResult> {
        if !verify_tls {
            warn!("TLS certificate verification disabled for {url}");
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .redirect(Policy::limited(8))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        let attempts = self.max_retries + 1;
        let mut last_error: Option<reqwest::Error> = None;
        for attempt in 1..=attempts {
            match self.get_once(&client, url).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("request failed (attempt {attempt}/{attempts}): {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(WatchError::FetchFailed {
            attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}
