//! # Pricewatch — Crypto Price Monitor
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐  GET /simple/price  ┌──────────────────────────────────┐
//!  │  CoinGecko   │ ◀────────────────── │  MonitorEngine (one task)        │
//!  └──────────────┘   every interval    │  ├─ HistoryBuffer per coin       │
//!                                       │  ├─ latest_ticks / latest_stats  │
//!                                       │  ├─ AlertPolicy                  │
//!                                       │  └─ NotificationHub ───────────┐ │
//!                                       └────────────────────────────────┘ │
//!  ┌──────────────┐  ws://host/api/ws/prices  ◀───────────────────────────┘
//!  │  Dashboard   │  GET  /api/prices · /api/stats · /api/status
//!  └──────────────┘  POST /api/subscriptions
//! ```
//!
//! ## Environment Variables
//!
//! | Variable                          | Default                    | Description                 |
//! |-----------------------------------|----------------------------|-----------------------------|
//! | `CRYPTO_IDS`                      | `bitcoin,ethereum,...`     | CoinGecko ids to track      |
//! | `MONITORING_INTERVAL_SECONDS`     | `30`                       | Seconds between cycles      |
//! | `PRICE_CHANGE_THRESHOLD_PERCENT`  | `1.0`                      | Alert threshold             |
//! | `STATISTICS_BUFFER_SIZE`          | `100`                      | Ticks kept per coin         |
//! | `SUBSCRIBER_TIMEOUT_MS`           | `2000`                     | Per-subscriber delivery cap |
//! | `COINGECKO_API_URL`               | CoinGecko v3               | Upstream base URL           |
//! | `API_PREFIX`                      | `/api`                     | Route prefix                |
//! | `BIND_ADDR`                       | `0.0.0.0:8000`             | Address Axum listens on     |
//! | `LOG_FORMAT`                      | `pretty`                   | `json` for JSON lines       |
//! | `RUST_LOG`                        | `pricewatch=debug`         | Tracing filter              |

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod engine;
mod error;
mod events;
mod models;
mod routes;
mod source;
mod state;

use config::AppConfig;
use engine::MonitorEngine;
use source::CoinGeckoSource;
use state::build_state;

// ─── Entry Point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env (optional, real env vars win) ───────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Configuration ─────────────────────────────────────────────────────
    let config = AppConfig::from_env()?;

    // ── 3. Structured logging ────────────────────────────────────────────────
    init_tracing(config.json_logs)?;

    info!(
        r#"

  ╔═══════════════════════════════════════════════╗
  ║        PRICEWATCH — Crypto Price Monitor      ║
  ║     Fetch · Statistics · Alerts · Live WS     ║
  ╚═══════════════════════════════════════════════╝"#
    );

    // ── 4. Upstream source + engine ──────────────────────────────────────────
    let client = reqwest::Client::builder()
        .user_agent(concat!("pricewatch/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let source = CoinGeckoSource::new(client, config.coingecko_url.clone());

    match source.ping().await {
        Ok(true) => info!(url = %config.coingecko_url, "coingecko reachable"),
        Ok(false) => warn!(url = %config.coingecko_url, "coingecko answered with an unexpected body"),
        Err(e) => warn!(url = %config.coingecko_url, error = %e, "coingecko ping failed, monitoring anyway"),
    }

    let engine = Arc::new(MonitorEngine::new(config.monitor.clone(), Arc::new(source)));
    engine.start().await;

    // ── 5. CORS ──────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ────────────────────────────────────────────────────────────
    let addr = config.bind_addr;
    let state = build_state(Arc::clone(&engine), config);
    let app = routes::api_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // ── 7. Serve until Ctrl-C, then stop the engine ──────────────────────────
    info!(?addr, "🚀 Pricewatch server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop().await;
    info!("👋 Pricewatch shut down");

    Ok(())
}

/// Pretty or JSON fmt layer, filtered by `RUST_LOG` on top of crate defaults.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("pricewatch=debug".parse()?)
        .add_directive("tower_http=info".parse()?);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
