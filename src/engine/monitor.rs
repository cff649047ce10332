//! # engine::monitor
//!
//! **Monitor Engine** — the periodic fetch → process → notify loop.
//!
//! ```text
//!            start()                         stop()
//!  Stopped ───────────▶ Running ─────────────────────▶ Stopped
//!                         │
//!                         ▼  every `interval`
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ 1. source.fetch(ids)            ── Err → classify, log, goto 5│
//!   │ 2. per instrument in response   ── missing/bad price → skip   │
//!   │ 3.   prev tick? → alert policy  ── evaluate, hold result      │
//!   │ 4.   commit latest_tick + history, broadcast Alert? then Tick │
//!   │ 5. recompute stats (history ≥ 2), per-instrument errors logged│
//!   │ 6. sleep(interval)              ── raced against shutdown     │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The spawned task is the only writer of `latest_ticks`, `latest_stats`
//! and the history buffers; everything else reads through the query
//! methods. Nothing inside a cycle can end the loop, not even a panic in a
//! subscriber or in the cycle itself. Only [`MonitorEngine::stop`] does,
//! and it joins the task before returning, so no broadcast can originate
//! from this engine once it has returned.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::engine::alert_policy;
use crate::engine::history::HistoryBuffer;
use crate::engine::hub::NotificationHub;
use crate::engine::statistics::{compute_statistics, MIN_HISTORY};
use crate::events::MonitorEvent;
use crate::models::{Statistics, Tick};
use crate::source::{DataSource, FetchError, PriceQuote};

// ─── Cycle Outcome ────────────────────────────────────────────────────────────

/// Failure of a whole cycle, classified at the loop boundary.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("price fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

impl CycleError {
    /// Label used in the `kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Fetch(e) if e.is_rate_limited() => "rate_limit",
            CycleError::Fetch(_) => "fetch",
        }
    }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub updated:        usize,
    pub skipped:        usize,
    pub alerts:         usize,
    pub stats_computed: usize,
    pub stats_failed:   usize,
}

// ─── Engine State ─────────────────────────────────────────────────────────────

struct EngineState {
    latest_ticks: RwLock<HashMap<String, Tick>>,
    latest_stats: RwLock<HashMap<String, Statistics>>,
    history:      RwLock<HashMap<String, HistoryBuffer>>,
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    task:     JoinHandle<()>,
}

/// Owns every piece of monitor state. Construct once in `main`, share by `Arc`.
pub struct MonitorEngine {
    config:    Arc<MonitorConfig>,
    source:    Arc<dyn DataSource>,
    hub:       NotificationHub,
    state:     Arc<EngineState>,
    running:   Arc<AtomicBool>,
    lifecycle: Mutex<Option<RunHandle>>,
}

impl MonitorEngine {
    pub fn new(config: MonitorConfig, source: Arc<dyn DataSource>) -> Self {
        let hub = NotificationHub::new(config.delivery_timeout);

        let history = config
            .instrument_ids
            .iter()
            .map(|id| (id.clone(), HistoryBuffer::new(config.buffer_size)))
            .collect();

        Self {
            config: Arc::new(config),
            source,
            hub,
            state: Arc::new(EngineState {
                latest_ticks: RwLock::new(HashMap::new()),
                latest_stats: RwLock::new(HashMap::new()),
                history:      RwLock::new(history),
            }),
            running:   Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(None),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Stopped → Running. A second call while running only logs.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            warn!("price monitor is already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            config: Arc::clone(&self.config),
            source: Arc::clone(&self.source),
            hub:    self.hub.clone(),
            state:  Arc::clone(&self.state),
        };

        self.running.store(true, Ordering::SeqCst);
        let task = tokio::spawn(worker.run(shutdown_rx));
        *lifecycle = Some(RunHandle { shutdown, task });

        info!(
            instruments   = %self.config.instrument_ids.join(","),
            interval_s    = self.config.interval.as_secs(),
            threshold_pct = self.config.threshold_percent,
            buffer_size   = self.config.buffer_size,
            "price monitor started"
        );
    }

    /// Running → Stopped. Interrupts a pending sleep or an in-flight cycle
    /// and waits for the task to finish. A no-op when already stopped.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(handle) = lifecycle.take() else {
            return;
        };

        self.running.store(false, Ordering::SeqCst);
        // Err only if the task already exited and dropped the receiver.
        let _ = handle.shutdown.send(true);

        match handle.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!("monitor task cancelled during shutdown"),
            Err(e) => error!(error = %e, "monitor task panicked"),
        }

        info!("price monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run exactly one cycle on the caller's task, outside the periodic loop.
    #[cfg(test)]
    pub async fn run_once(&self) -> Result<CycleReport, CycleError> {
        Worker {
            config: Arc::clone(&self.config),
            source: Arc::clone(&self.source),
            hub:    self.hub.clone(),
            state:  Arc::clone(&self.state),
        }
        .cycle()
        .await
    }

    // ── Query Surface ────────────────────────────────────────────────────────

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn tracked_instruments(&self) -> &[String] {
        &self.config.instrument_ids
    }

    pub async fn latest_ticks(&self) -> HashMap<String, Tick> {
        self.state.latest_ticks.read().await.clone()
    }

    pub async fn latest_tick(&self, instrument_id: &str) -> Option<Tick> {
        self.state.latest_ticks.read().await.get(instrument_id).cloned()
    }

    pub async fn latest_stats(&self) -> HashMap<String, Statistics> {
        self.state.latest_stats.read().await.clone()
    }

    pub async fn stats_for(&self, instrument_id: &str) -> Option<Statistics> {
        self.state.latest_stats.read().await.get(instrument_id).cloned()
    }

    /// Buffered ticks for one instrument, oldest first.
    pub async fn history(&self, instrument_id: &str) -> Option<Vec<Tick>> {
        self.state
            .history
            .read()
            .await
            .get(instrument_id)
            .map(HistoryBuffer::snapshot)
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────────

/// Everything the spawned loop needs, detached from the lifecycle mutex.
struct Worker {
    config: Arc<MonitorConfig>,
    source: Arc<dyn DataSource>,
    hub:    NotificationHub,
    state:  Arc<EngineState>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                outcome = AssertUnwindSafe(self.cycle()).catch_unwind() => match outcome {
                    Ok(Ok(report)) => debug!(
                        updated      = report.updated,
                        skipped      = report.skipped,
                        alerts       = report.alerts,
                        stats        = report.stats_computed,
                        stats_failed = report.stats_failed,
                        "monitor cycle complete"
                    ),
                    Ok(Err(e)) => error!(kind = e.kind(), error = %e, "monitor cycle failed"),
                    Err(panic) => error!(
                        kind  = "panic",
                        error = panic_message(panic.as_ref()),
                        "monitor cycle panicked"
                    ),
                },
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        debug!("monitor loop exited");
    }

    /// One fetch → process → notify pass. A fetch failure still recomputes
    /// statistics over the unchanged buffers before being reported.
    async fn cycle(&self) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();

        let fetched = self.source.fetch(&self.config.instrument_ids).await;

        if let Ok(quotes) = &fetched {
            for instrument_id in &self.config.instrument_ids {
                match quotes.get(instrument_id) {
                    Some(quote) => {
                        if self.process_quote(instrument_id, quote, &mut report).await {
                            report.updated += 1;
                        } else {
                            report.skipped += 1;
                        }
                    }
                    None => {
                        warn!(instrument = %instrument_id, "no data for instrument this cycle");
                        report.skipped += 1;
                    }
                }
            }
        }

        self.recompute_statistics(&mut report).await;

        fetched?;
        Ok(report)
    }

    /// Steps 2–4 for one instrument. Returns false when the quote was unusable.
    async fn process_quote(&self, instrument_id: &str, quote: &PriceQuote, report: &mut CycleReport) -> bool {
        let Some(price) = quote.price else {
            warn!(instrument = %instrument_id, "quote has no price");
            return false;
        };

        // Display symbol is the instrument id until a ticker lookup exists.
        let tick = match Tick::new(instrument_id, instrument_id, price, Utc::now()) {
            Ok(tick) => tick.with_market_data(quote.market_cap, quote.volume_24h, quote.change_24h_percent),
            Err(e) => {
                warn!(instrument = %instrument_id, error = %e, "discarding unusable quote");
                return false;
            }
        };

        let previous = self.state.latest_ticks.read().await.get(instrument_id).cloned();
        let alert = previous
            .as_ref()
            .and_then(|prev| alert_policy::evaluate(prev, &tick, self.config.threshold_percent));

        // Commit before notifying: a cycle cut short by `stop()` never leaves an
        // alert broadcast against a tick the engine has not recorded.
        {
            let mut latest = self.state.latest_ticks.write().await;
            let mut history = self.state.history.write().await;
            latest.insert(instrument_id.to_string(), tick.clone());
            history
                .entry(instrument_id.to_string())
                .or_insert_with(|| HistoryBuffer::new(self.config.buffer_size))
                .push(tick.clone());
        }

        debug!(
            instrument     = %instrument_id,
            price          = tick.price(),
            market_cap     = ?tick.market_cap(),
            volume_24h     = ?tick.volume_24h(),
            change_24h_pct = ?tick.price_change_24h_percent(),
            "tick recorded"
        );

        if let Some(alert) = alert {
            info!(
                instrument = %instrument_id,
                symbol     = alert.symbol(),
                kind       = %alert.kind(),
                change_pct = alert.change_percent(),
                old_price  = alert.old_price(),
                new_price  = alert.new_price(),
                "{}", alert.message()
            );
            report.alerts += 1;
            self.hub.broadcast(&MonitorEvent::from(alert)).await;
        }

        self.hub.broadcast(&MonitorEvent::from(tick)).await;
        true
    }

    async fn recompute_statistics(&self, report: &mut CycleReport) {
        let snapshots: Vec<(String, Vec<Tick>)> = {
            let history = self.state.history.read().await;
            self.config
                .instrument_ids
                .iter()
                .filter_map(|id| {
                    history
                        .get(id)
                        .filter(|buf| buf.len() >= MIN_HISTORY)
                        .map(|buf| (id.clone(), buf.snapshot()))
                })
                .collect()
        };

        let now = Utc::now();
        let mut computed = Vec::with_capacity(snapshots.len());
        for (instrument_id, ticks) in snapshots {
            let symbol = ticks
                .last()
                .map(|t| t.symbol().to_string())
                .unwrap_or_else(|| instrument_id.clone());

            match compute_statistics(&instrument_id, &symbol, &ticks, now) {
                Ok(stats) => computed.push((instrument_id, stats)),
                Err(e) => {
                    report.stats_failed += 1;
                    error!(instrument = %instrument_id, error = %e, "statistics computation failed");
                }
            }
        }

        report.stats_computed = computed.len();
        if !computed.is_empty() {
            self.state.latest_stats.write().await.extend(computed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

// ─── Tests ────────────────────────────────────────────────────────────────────
