//! # source — upstream price data
//!
//! The Monitor Engine only needs one capability: given the tracked ids,
//! return a quote per instrument or fail. [`DataSource`] is that seam;
//! [`CoinGeckoSource`] is the production implementation and owns its own
//! retry/backoff policy.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod coingecko;

pub use coingecko::CoinGeckoSource;

/// One instrument's entry in a fetch response. `price` is `None` when the
/// upstream omitted it; the engine treats that like a missing instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price:              Option<f64>,
    pub market_cap:         Option<f64>,
    pub volume_24h:         Option<f64>,
    pub change_24h_percent: Option<f64>,
}

impl PriceQuote {
    #[cfg(test)]
    pub fn price(price: f64) -> Self {
        Self { price: Some(price), ..Self::default() }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("invalid response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }

    /// Worth another attempt inside the source's own retry loop.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Decode(_))
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Quotes keyed by instrument id. Ids absent from the map had no data.
    async fn fetch(&self, instrument_ids: &[String]) -> Result<HashMap<String, PriceQuote>, FetchError>;
}
