//! # models::tick
//!
//! Defines [`Tick`], one immutable market-data sample for one instrument.
//!
//! A Tick is built once per fetch cycle per instrument by the Monitor
//! Engine and is never mutated afterwards; every field is read through an
//! accessor so the value handed to subscribers is exactly the value stored
//! in the history buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected at construction: a Tick always carries a positive, finite price.
#[derive(Debug, Error, PartialEq)]
#[error("invalid price {price} for {instrument_id}")]
pub struct InvalidPrice {
    pub instrument_id: String,
    pub price:         f64,
}

/// A single price snapshot for one tracked instrument (quote currency USD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    instrument_id: String,

    /// Display ticker. Currently identical to `instrument_id`.
    symbol: String,

    price: f64,

    #[serde(default)]
    market_cap: Option<f64>,

    #[serde(default)]
    volume_24h: Option<f64>,

    #[serde(default)]
    price_change_24h_percent: Option<f64>,

    /// Best-effort monotonic per instrument; upstream may deliver out of order.
    timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(
        instrument_id: impl Into<String>,
        symbol: impl Into<String>,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, InvalidPrice> {
        let instrument_id = instrument_id.into();
        if !price.is_finite() || price <= 0.0 {
            return Err(InvalidPrice { instrument_id, price });
        }

        Ok(Self {
            instrument_id,
            symbol: symbol.into(),
            price,
            market_cap: None,
            volume_24h: None,
            price_change_24h_percent: None,
            timestamp,
        })
    }

    /// Attach the optional market fields reported alongside the price.
    pub fn with_market_data(
        mut self,
        market_cap: Option<f64>,
        volume_24h: Option<f64>,
        price_change_24h_percent: Option<f64>,
    ) -> Self {
        self.market_cap = market_cap;
        self.volume_24h = volume_24h;
        self.price_change_24h_percent = price_change_24h_percent;
        self
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn market_cap(&self) -> Option<f64> {
        self.market_cap
    }

    pub fn volume_24h(&self) -> Option<f64> {
        self.volume_24h
    }

    pub fn price_change_24h_percent(&self) -> Option<f64> {
        self.price_change_24h_percent
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_and_non_finite_prices() {
        let now = Utc::now();
        assert!(Tick::new("bitcoin", "bitcoin", 0.0, now).is_err());
        assert!(Tick::new("bitcoin", "bitcoin", -3.5, now).is_err());
        assert!(Tick::new("bitcoin", "bitcoin", f64::NAN, now).is_err());
        assert!(Tick::new("bitcoin", "bitcoin", f64::INFINITY, now).is_err());
    }

    #[test]
    fn market_data_is_optional() {
        let tick = Tick::new("ethereum", "ethereum", 3120.5, Utc::now())
            .unwrap()
            .with_market_data(Some(3.7e11), None, Some(-1.25));

        assert_eq!(tick.price(), 3120.5);
        assert_eq!(tick.market_cap(), Some(3.7e11));
        assert_eq!(tick.volume_24h(), None);
        assert_eq!(tick.price_change_24h_percent(), Some(-1.25));
    }
}
