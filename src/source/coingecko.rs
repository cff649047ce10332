//! # source::coingecko
//!
//! CoinGecko `/simple/price` client.
//!
//! ## Retry policy
//! Transient failures (transport error, non-success status, HTTP 429) are
//! retried up to `max_attempts` times with exponential backoff
//! (`base_delay`, doubling, capped at `max_delay`). Undecodable bodies are
//! returned immediately. Only the final error reaches the engine.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{DataSource, FetchError, PriceQuote};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shape of one entry in the `/simple/price` response (USD only).
#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd:            Option<f64>,
    usd_market_cap: Option<f64>,
    usd_24h_vol:    Option<f64>,
    usd_24h_change: Option<f64>,
}

impl From<SimplePriceEntry> for PriceQuote {
    fn from(entry: SimplePriceEntry) -> Self {
        PriceQuote {
            price:              entry.usd,
            market_cap:         entry.usd_market_cap,
            volume_24h:         entry.usd_24h_vol,
            change_24h_percent: entry.usd_24h_change,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client:       reqwest::Client,
    base_url:     String,
    max_attempts: u32,
    base_delay:   Duration,
    max_delay:    Duration,
}

impl CoinGeckoSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url:     base_url.into().trim_end_matches('/').to_string(),
            max_attempts: 5,
            base_delay:   Duration::from_secs(2),
            max_delay:    Duration::from_secs(30),
        }
    }

    #[cfg(test)]
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// `GET /ping`. True when the API answers with its greeting.
    pub async fn ping(&self) -> Result<bool, FetchError> {
        let body = self.get_text("/ping", &[]).await?;
        Ok(body.contains("gecko_says"))
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        Ok(resp.text().await?)
    }

    async fn fetch_once(&self, instrument_ids: &[String]) -> Result<HashMap<String, PriceQuote>, FetchError> {
        let query = [
            ("ids", instrument_ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("precision", "full".to_string()),
        ];

        let body = self.get_text("/simple/price", &query).await?;
        parse_simple_price(&body)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[async_trait]
impl DataSource for CoinGeckoSource {
    async fn fetch(&self, instrument_ids: &[String]) -> Result<HashMap<String, PriceQuote>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(instrument_ids).await {
                Ok(quotes) => {
                    debug!(attempt, quotes = quotes.len(), "coingecko prices fetched");
                    return Ok(quotes);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        rate_limited = e.is_rate_limited(),
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "coingecko request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Decode a `/simple/price` body into quotes keyed by coin id.
pub fn parse_simple_price(body: &str) -> Result<HashMap<String, PriceQuote>, FetchError> {
    let raw: HashMap<String, SimplePriceEntry> =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    Ok(raw.into_iter().map(|(id, entry)| (id, entry.into())).collect())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
