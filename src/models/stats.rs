//! # models::stats
//!
//! [`Statistics`]: per-instrument rolling indicators, recomputed wholesale
//! every cycle from the history buffer. Holds no history of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub instrument_id: String,
    pub symbol:        String,
    pub current_price: f64,

    /// Simple moving average, 20 periods. Present once history ≥ 20.
    pub sma_20: Option<f64>,

    /// Exponential moving average, span 20. Present once history ≥ 20.
    pub ema_20: Option<f64>,

    /// Rolling std-dev as % of mean price. Present once history ≥ 5.
    pub volatility_percent: Option<f64>,

    /// Reserved. No formula is defined, so this is always `None`.
    pub rsi_14: Option<f64>,

    pub timestamp: DateTime<Utc>,
}
