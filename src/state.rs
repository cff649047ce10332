//! # state
//!
//! Shared application state handed to every Axum handler.
//!
//! The HTTP layer never writes monitor data. It reads through the
//! [`MonitorEngine`] query methods and (un)subscribes WebSocket clients on
//! the engine's hub; the engine's own task is the only writer.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::MonitorEngine;

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    /// The single engine instance for this process.
    pub engine: Arc<MonitorEngine>,

    /// Effective configuration, exposed read-only by `/status`.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(engine: Arc<MonitorEngine>, config: AppConfig) -> Self {
        Self { engine, config }
    }
}

pub type SharedState = Arc<AppState>;

/// Wrap the engine and config in an `Arc` ready for `Router::with_state`.
pub fn build_state(engine: Arc<MonitorEngine>, config: AppConfig) -> SharedState {
    Arc::new(AppState::new(engine, config))
}
