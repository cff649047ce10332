//! # routes
//!
//! HTTP + WebSocket surface over the Monitor Engine. `GET /` sits at the
//! root; everything else is mounted under the configured API prefix
//! (default `/api`).
//!
//! | Method    | Path                  | Description                                  |
//! |-----------|-----------------------|----------------------------------------------|
//! | GET       | `/` (unprefixed)      | Service name, version and monitor status     |
//! | GET       | `/health`             | Liveness probe                               |
//! | GET       | `/coins`              | Tracked instrument ids                       |
//! | GET       | `/prices`             | Latest tick per instrument (503 if stopped)  |
//! | GET       | `/prices/:id`         | Latest tick for one instrument               |
//! | GET       | `/stats`              | Latest statistics (503 until first compute)  |
//! | GET       | `/stats/:id`          | Statistics for one instrument                |
//! | GET       | `/history/:id`        | Buffered ticks for one instrument            |
//! | GET       | `/status`             | Engine state and subscriber count            |
//! | POST      | `/subscriptions`      | Validate an alert subscription request       |
//! | GET (WS)  | `/ws/prices`          | Live TICK / ALERT event stream               |

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::SharedState;

pub mod prices;
pub mod ws;

use prices::{
    create_subscription, get_coin_history, get_coin_price, get_coin_stats, get_prices, get_stats,
    get_status, health_check, list_coins, service_info,
};
use ws::ws_prices;

/// Build the full router: `/` plus the API nested under `api_prefix`
/// (empty means root).
pub fn api_router(state: SharedState) -> Router {
    let prefix = state.config.api_prefix.clone();

    let api = Router::new()
        .route("/health",        get(health_check))
        .route("/coins",         get(list_coins))
        .route("/prices",        get(get_prices))
        .route("/prices/:id",    get(get_coin_price))
        .route("/stats",         get(get_stats))
        .route("/stats/:id",     get(get_coin_stats))
        .route("/history/:id",   get(get_coin_history))
        .route("/status",        get(get_status))
        .route("/subscriptions", post(create_subscription))
        .route("/ws/prices",     get(ws_prices))
        .with_state(state.clone());

    let root = Router::new()
        .route("/", get(service_info))
        .with_state(state);

    if prefix.is_empty() {
        root.merge(api)
    } else {
        root.nest(&prefix, api)
    }
}

// ─── Test Support ─────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::config::AppConfig;
    use crate::engine::MonitorEngine;
    use crate::source::{DataSource, FetchError, PriceQuote};
    use crate::state::{build_state, SharedState};

    /// Returns the next price list on every fetch, repeating the last one.
    pub struct SteppedSource {
        steps: Mutex<Vec<Vec<(&'static str, f64)>>>,
    }

    impl SteppedSource {
        pub fn new(mut steps: Vec<Vec<(&'static str, f64)>>) -> Arc<Self> {
            steps.reverse();
            Arc::new(Self { steps: Mutex::new(steps) })
        }
    }

    #[async_trait]
    impl DataSource for SteppedSource {
        async fn fetch(&self, _ids: &[String]) -> Result<HashMap<String, PriceQuote>, FetchError> {
            let mut steps = self.steps.lock();
            let step = if steps.len() > 1 { steps.pop() } else { steps.last().cloned() };
            Ok(step
                .unwrap_or_default()
                .into_iter()
                .map(|(id, p)| (id.to_string(), PriceQuote::price(p)))
                .collect())
        }
    }

    /// State tracking `bitcoin` and `ethereum` behind a stepped source.
    pub fn state(steps: Vec<Vec<(&'static str, f64)>>) -> SharedState {
        let config = AppConfig::from_lookup(|key| match key {
            "CRYPTO_IDS" => Some("bitcoin,ethereum".to_string()),
            _ => None,
        })
        .unwrap();
        let engine = Arc::new(MonitorEngine::new(config.monitor.clone(), SteppedSource::new(steps)));
        build_state(engine, config)
    }
}
