//! # models::alert
//!
//! [`Alert`]: a discrete event raised when a price move between two
//! consecutive ticks crosses the configured threshold.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of an alert.
///
/// Only `PriceIncrease` / `PriceDecrease` are produced by the threshold
/// policy; the remaining kinds are reserved for additional rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceIncrease,
    PriceDecrease,
    Volatility,
    VolumeSpike,
    MarketCapChange,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::PriceIncrease   => "price_increase",
            AlertKind::PriceDecrease   => "price_decrease",
            AlertKind::Volatility      => "volatility",
            AlertKind::VolumeSpike     => "volume_spike",
            AlertKind::MarketCapChange => "market_cap_change",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Immutable alert. `message` is derived once in [`Alert::new`] from the
/// other fields and cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    instrument_id:  String,
    symbol:         String,
    kind:           AlertKind,
    old_price:      f64,
    new_price:      f64,
    change_percent: f64,
    timestamp:      DateTime<Utc>,
    message:        String,
}

impl Alert {
    pub fn new(
        instrument_id: impl Into<String>,
        symbol: impl Into<String>,
        kind: AlertKind,
        old_price: f64,
        new_price: f64,
        change_percent: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let symbol = symbol.into();
        let message = render_message(kind, &symbol, old_price, new_price, change_percent);

        Self {
            instrument_id: instrument_id.into(),
            symbol,
            kind,
            old_price,
            new_price,
            change_percent,
            timestamp,
            message,
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn kind(&self) -> AlertKind {
        self.kind
    }

    pub fn old_price(&self) -> f64 {
        self.old_price
    }

    pub fn new_price(&self) -> f64 {
        self.new_price
    }

    pub fn change_percent(&self) -> f64 {
        self.change_percent
    }

    #[cfg(test)]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `PRICE_INCREASE for BTC: up by 2.00% ($100.00 → $102.00)`
fn render_message(
    kind: AlertKind,
    symbol: &str,
    old_price: f64,
    new_price: f64,
    change_percent: f64,
) -> String {
    let direction = match kind {
        AlertKind::PriceIncrease => "up",
        _ => "down",
    };

    format!(
        "{kind} for {}: {direction} by {:.2}% (${old_price:.2} → ${new_price:.2})",
        symbol.to_uppercase(),
        change_percent.abs(),
    )
}
