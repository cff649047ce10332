//! # routes::prices
//!
//! Read-only REST handlers over the engine's query surface, plus the
//! subscription request validator.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{error::AppError, state::SharedState};

// ─── GET / ─────────────────────────────────────────────────────────────────────

pub async fn service_info(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "name":        "Pricewatch",
        "description": "Real-time cryptocurrency price monitoring",
        "version":     env!("CARGO_PKG_VERSION"),
        "api_prefix":  state.config.api_prefix,
        "status":      "online",
        "monitor":     if state.engine.is_running() { "running" } else { "stopped" },
    }))
}

// ─── GET /health ──────────────────────────────────────────────────────────────

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status":    "ok",
        "timestamp": Utc::now(),
    }))
}

// ─── GET /coins ───────────────────────────────────────────────────────────────

pub async fn list_coins(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.engine.tracked_instruments().to_vec())
}

// ─── GET /prices ──────────────────────────────────────────────────────────────

pub async fn get_prices(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    if !state.engine.is_running() {
        return Err(AppError::Unavailable(
            "Price monitor is not running. Try again later.".into(),
        ));
    }

    Ok(Json(state.engine.latest_ticks().await))
}

// ─── GET /prices/:id ──────────────────────────────────────────────────────────

pub async fn get_coin_price(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .engine
        .latest_tick(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Coin not found or not monitored: {id}")))
}

// ─── GET /stats ───────────────────────────────────────────────────────────────

pub async fn get_stats(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let stats = state.engine.latest_stats().await;
    if stats.is_empty() {
        return Err(AppError::Unavailable("Statistics are not available yet".into()));
    }

    Ok(Json(stats))
}

// ─── GET /stats/:id ───────────────────────────────────────────────────────────

pub async fn get_coin_stats(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .engine
        .stats_for(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Statistics not available for: {id}")))
}

// ─── GET /history/:id ─────────────────────────────────────────────────────────

pub async fn get_coin_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ticks = state
        .engine
        .history(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Coin not found or not monitored: {id}")))?;

    Ok(Json(json!({
        "instrument_id": id,
        "capacity":      state.engine.config().buffer_size,
        "count":         ticks.len(),
        "ticks":         ticks,
    })))
}

// ─── GET /status ──────────────────────────────────────────────────────────────

pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    let engine = &state.engine;
    let monitor = engine.config();

    Json(json!({
        "ok":                true,
        "running":           engine.is_running(),
        "subscribers":       engine.hub().subscriber_count(),
        "instruments":       engine.tracked_instruments(),
        "interval_seconds":  monitor.interval.as_secs(),
        "threshold_percent": monitor.threshold_percent,
        "buffer_size":       monitor.buffer_size,
    }))
}

// ─── POST /subscriptions ──────────────────────────────────────────────────────

/// Request to be alerted on moves of one instrument. Validated and echoed;
/// nothing is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSubscription {
    pub coin_id: String,

    #[serde(default = "default_min_change")]
    pub min_change_percent: f64,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_min_change() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

pub async fn create_subscription(
    State(state): State<SharedState>,
    Json(subscription): Json<PriceSubscription>,
) -> Result<impl IntoResponse, AppError> {
    let tracked = state
        .engine
        .tracked_instruments()
        .iter()
        .any(|id| *id == subscription.coin_id);

    if !tracked {
        return Err(AppError::BadRequest(format!(
            "{} is not in the monitoring list",
            subscription.coin_id
        )));
    }

    info!(
        coin_id            = %subscription.coin_id,
        min_change_percent = subscription.min_change_percent,
        user_id            = ?subscription.user_id,
        "subscription accepted"
    );

    Ok((StatusCode::OK, Json(subscription)))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::{api_router, test_support};

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        call(app, Method::GET, uri, None).await
    }

    #[tokio::test]
    async fn health_and_coins() {
        let app = api_router(test_support::state(vec![]));

        let (status, body) = get(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());

        let (status, body) = get(&app, "/api/coins").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["bitcoin", "ethereum"]));
    }

    #[tokio::test]
    async fn prices_unavailable_while_stopped() {
        let app = api_router(test_support::state(vec![]));

        let (status, body) = get(&app, "/api/prices").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn prices_while_running() {
        let state = test_support::state(vec![vec![("bitcoin", 64_000.0), ("ethereum", 3_000.0)]]);
        let app = api_router(state.clone());

        state.engine.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (status, body) = get(&app, "/api/prices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bitcoin"]["price"], 64_000.0);
        assert_eq!(body["ethereum"]["symbol"], "ethereum");

        let (status, body) = get(&app, "/api/prices/ethereum").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 3_000.0);

        let (status, body) = get(&app, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], true);
        assert_eq!(body["interval_seconds"], 30);

        state.engine.stop().await;
    }

    #[tokio::test]
    async fn root_describes_the_service() {
        let app = api_router(test_support::state(vec![]));

        let (status, body) = get(&app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Pricewatch");
        assert_eq!(body["status"], "online");
        assert_eq!(body["monitor"], "stopped");
        assert_eq!(body["api_prefix"], "/api");
    }

    #[tokio::test]
    async fn history_lists_buffered_ticks_oldest_first() {
        let state = test_support::state(vec![
            vec![("bitcoin", 100.0)],
            vec![("bitcoin", 101.0)],
            vec![("bitcoin", 99.5)],
        ]);
        let app = api_router(state.clone());

        for _ in 0..3 {
            state.engine.run_once().await.unwrap();
        }

        let (status, body) = get(&app, "/api/history/bitcoin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["capacity"], 100);
        let prices: Vec<f64> = body["ticks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["price"].as_f64().unwrap())
            .collect();
        assert_eq!(prices, vec![100.0, 101.0, 99.5]);

        let (status, body) = get(&app, "/api/history/ethereum").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let (status, _) = get(&app, "/api/history/dogecoin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_coin_is_404() {
        let app = api_router(test_support::state(vec![]));

        let (status, body) = get(&app, "/api/prices/dogecoin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("dogecoin"));

        let (status, _) = get(&app, "/api/stats/dogecoin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_appear_after_two_cycles() {
        let state = test_support::state(vec![
            vec![("bitcoin", 100.0)],
            vec![("bitcoin", 101.0)],
        ]);
        let app = api_router(state.clone());

        let (status, _) = get(&app, "/api/stats").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.engine.run_once().await.unwrap();
        state.engine.run_once().await.unwrap();

        let (status, body) = get(&app, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bitcoin"]["current_price"], 101.0);
        assert!(body["bitcoin"]["sma_20"].is_null());
        assert!(body.get("ethereum").is_none());

        let (status, body) = get(&app, "/api/stats/bitcoin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["instrument_id"], "bitcoin");
    }

    #[tokio::test]
    async fn subscription_is_validated_and_echoed() {
        let app = api_router(test_support::state(vec![]));

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/subscriptions",
            Some(json!({ "coin_id": "bitcoin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coin_id"], "bitcoin");
        assert_eq!(body["min_change_percent"], 1.0);
        assert_eq!(body["active"], true);
        assert!(body["user_id"].is_null());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/subscriptions",
            Some(json!({ "coin_id": "dogecoin", "min_change_percent": 5.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }
}
