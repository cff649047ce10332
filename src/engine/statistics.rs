//! # engine::statistics
//!
//! **Statistics Engine** — pure computation from a history snapshot to a
//! [`Statistics`] value.
//!
//! ```text
//! ticks ──sort by timestamp──▶ prices[0..n]
//!     ├─ n ≥ 20 → sma_20  = mean(prices[n-20..n])
//!     ├─ n ≥ 20 → ema_20  = adjusted EWMA, alpha = 2 / (20 + 1)
//!     └─ n ≥  5 → volatility_percent
//!                   = std(prices[n-min(24,n)..n], ddof 1) / mean(prices) × 100
//! ```
//!
//! Only the value at the most recent point of each rolling series is kept.
//! The full buffer is rescanned every cycle; at a few hundred points this is
//! cheaper than maintaining running sums across evictions.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Statistics, Tick};

pub const MA_WINDOW: usize = 20;
pub const EMA_SPAN: usize = 20;
pub const VOLATILITY_WINDOW: usize = 24;
pub const VOLATILITY_MIN_PERIODS: usize = 5;

/// Fewer points than this and no statistics are produced at all.
pub const MIN_HISTORY: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("need at least 2 ticks, got {0}")]
    InsufficientData(usize),

    #[error("degenerate input: {0}")]
    Degenerate(&'static str),
}

/// Compute the statistics snapshot for one instrument.
///
/// `ticks` may arrive in any order; they are re-sorted by timestamp
/// (stable, so equal timestamps keep insertion order).
pub fn compute_statistics(
    instrument_id: &str,
    symbol: &str,
    ticks: &[Tick],
    now: DateTime<Utc>,
) -> Result<Statistics, StatsError> {
    if ticks.len() < MIN_HISTORY {
        return Err(StatsError::InsufficientData(ticks.len()));
    }

    let mut ordered: Vec<&Tick> = ticks.iter().collect();
    ordered.sort_by_key(|t| t.timestamp());
    let prices: Vec<f64> = ordered.iter().map(|t| t.price()).collect();

    if prices.iter().any(|p| !p.is_finite()) {
        return Err(StatsError::Degenerate("non-finite price"));
    }

    let current_price = prices[prices.len() - 1];

    let sma_20 = simple_moving_average(&prices, MA_WINDOW);
    let ema_20 = exponential_moving_average(&prices, EMA_SPAN);
    let volatility_percent = volatility_percent(&prices)?;

    for value in [sma_20, ema_20, volatility_percent].into_iter().flatten() {
        if !value.is_finite() {
            return Err(StatsError::Degenerate("non-finite result"));
        }
    }

    Ok(Statistics {
        instrument_id: instrument_id.to_string(),
        symbol: symbol.to_string(),
        current_price,
        sma_20,
        ema_20,
        volatility_percent,
        rsi_14: None,
        timestamp: now,
    })
}

/// Mean of the trailing `window` prices; `None` until `window` points exist.
pub fn simple_moving_average(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    Some(mean(&prices[prices.len() - window..]))
}

/// Adjusted exponentially weighted mean over the whole series, evaluated at
/// the last point. Gated on the same length as the SMA.
pub fn exponential_moving_average(prices: &[f64], span: usize) -> Option<f64> {
    if span == 0 || prices.len() < span {
        return None;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;

    let mut weight = 1.0;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for price in prices.iter().rev() {
        numerator += weight * price;
        denominator += weight;
        weight *= decay;
    }

    Some(numerator / denominator)
}

/// Trailing sample standard deviation as a percentage of the overall mean.
pub fn volatility_percent(prices: &[f64]) -> Result<Option<f64>, StatsError> {
    if prices.len() < VOLATILITY_MIN_PERIODS {
        return Ok(None);
    }

    let overall_mean = mean(prices);
    if overall_mean == 0.0 {
        return Err(StatsError::Degenerate("zero mean price"));
    }

    let window = VOLATILITY_WINDOW.min(prices.len());
    let std = sample_std(&prices[prices.len() - window..]);

    Ok(Some(std / overall_mean * 100.0))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// ddof = 1. Callers guarantee at least two values.
fn sample_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() as f64 - 1.0)).sqrt()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
