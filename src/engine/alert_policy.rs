//! # engine::alert_policy
//!
//! **Alert Policy** — compares the previous and the new tick of one
//! instrument and decides whether the move deserves an [`Alert`].
//!
//! * `change = (new - old) / old × 100`
//! * alert iff `|change| >= threshold` (inclusive)
//! * `change > 0` → `PriceIncrease`, otherwise `PriceDecrease`
//!
//! A threshold ≤ 0 therefore alerts on every comparison, flat moves included.

use crate::models::{Alert, AlertKind, Tick};

/// Percentage change from `old_price` to `new_price`.
#[inline]
pub fn change_percent(old_price: f64, new_price: f64) -> f64 {
    (new_price - old_price) / old_price * 100.0
}

/// Pure threshold check on two prices. Returns the kind and signed change.
pub fn classify(old_price: f64, new_price: f64, threshold_percent: f64) -> Option<(AlertKind, f64)> {
    let change = change_percent(old_price, new_price);
    if !change.is_finite() || change.abs() < threshold_percent {
        return None;
    }

    let kind = if change > 0.0 {
        AlertKind::PriceIncrease
    } else {
        AlertKind::PriceDecrease
    };
    Some((kind, change))
}

/// Evaluate a new tick against the previous one for the same instrument.
pub fn evaluate(previous: &Tick, current: &Tick, threshold_percent: f64) -> Option<Alert> {
    let (kind, change) = classify(previous.price(), current.price(), threshold_percent)?;

    Some(Alert::new(
        current.instrument_id(),
        current.symbol(),
        kind,
        previous.price(),
        current.price(),
        change,
        current.timestamp(),
    ))
}
