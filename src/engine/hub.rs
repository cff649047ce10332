//! # engine::hub
//!
//! **Notification Hub** — a registry of subscribers keyed by an opaque
//! [`SubscriptionId`] and a `broadcast` that delivers one [`MonitorEvent`] to
//! everyone registered when the broadcast started.
//!
//! ## Delivery discipline
//!
//! ```text
//! broadcast(event)
//!   ├─ read-lock registry, clone (id, subscriber) pairs, unlock
//!   └─ deliver to the snapshot concurrently
//!         each delivery bounded by `delivery_timeout`
//!         Err / panic / timeout → warn! + counted, never propagated
//! ```
//!
//! The lock is never held across an `.await`, so WebSocket connections can
//! (un)subscribe while a slow delivery is in flight.
//!
//! ## Latency bound
//!
//! Deliveries of one event run concurrently, so a broadcast takes at most
//! one `delivery_timeout` however many subscribers stall. The engine awaits
//! each broadcast in order (alert before tick, instrument by instrument), so
//! a stalled subscriber costs a cycle at most
//! `delivery_timeout × events in that cycle`. With the default 2 s timeout
//! and five instruments that is 10 s on a quiet cycle and 20 s when every
//! instrument alerts. Deliveries are not detached: once `broadcast` returns
//! no delivery of that event is still running, which is what lets
//! `MonitorEngine::stop` guarantee silence after it returns.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future::join_all, FutureExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::MonitorEvent;

// ─── Subscriber ───────────────────────────────────────────────────────────────

/// Anything that wants Tick / Alert events.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_event(&self, event: &MonitorEvent) -> anyhow::Result<()>;
}

/// Forwards events into a bounded mpsc queue without ever waiting on it.
///
/// A full queue means the consumer is lagging; the event is dropped for that
/// consumer and reported as a delivery failure.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<MonitorEvent>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<MonitorEvent>) -> Self {
        Self { tx }
    }

    /// Convenience: build the subscriber together with its receiving end.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn on_event(&self, event: &MonitorEvent) -> anyhow::Result<()> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_)   => anyhow::anyhow!("subscriber queue full"),
            mpsc::error::TrySendError::Closed(_) => anyhow::anyhow!("subscriber queue closed"),
        })
    }
}

// ─── Hub ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one broadcast, for logs and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed:    usize,
    pub timed_out: usize,
}

struct HubInner {
    subscribers:      RwLock<HashMap<SubscriptionId, Arc<dyn Subscriber>>>,
    next_id:          AtomicU64,
    delivery_timeout: Duration,
}

/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers:      RwLock::new(HashMap::new()),
                next_id:          AtomicU64::new(1),
                delivery_timeout,
            }),
        }
    }

    /// Register a subscriber. Registering the same `Arc` again returns the
    /// id it already has instead of adding a second entry.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let mut registry = self.inner.subscribers.write();

        if let Some((id, _)) = registry
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &subscriber))
        {
            return *id;
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        registry.insert(id, subscriber);
        debug!(%id, total = registry.len(), "subscriber registered");
        id
    }

    /// Remove a subscriber. Unknown or already-removed ids are a no-op;
    /// returns whether anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.subscribers.write().remove(&id).is_some();
        if removed {
            debug!(%id, "subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Deliver `event` to every subscriber registered at call time.
    pub async fn broadcast(&self, event: &MonitorEvent) -> DeliveryReport {
        let snapshot: Vec<(SubscriptionId, Arc<dyn Subscriber>)> = {
            let registry = self.inner.subscribers.read();
            registry.iter().map(|(id, s)| (*id, Arc::clone(s))).collect()
        };

        if snapshot.is_empty() {
            return DeliveryReport::default();
        }

        let timeout = self.inner.delivery_timeout;
        let deliveries = snapshot.into_iter().map(|(id, subscriber)| async move {
            let delivery = AssertUnwindSafe(subscriber.on_event(event)).catch_unwind();
            (id, tokio::time::timeout(timeout, delivery).await)
        });

        let mut report = DeliveryReport::default();
        for (id, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(Ok(Ok(()))) => report.delivered += 1,
                Ok(Ok(Err(e))) => {
                    report.failed += 1;
                    warn!(
                        %id,
                        event      = event.kind(),
                        instrument = event.instrument_id(),
                        error      = %e,
                        "subscriber delivery failed"
                    );
                }
                Ok(Err(_)) => {
                    report.failed += 1;
                    warn!(
                        %id,
                        event      = event.kind(),
                        instrument = event.instrument_id(),
                        "subscriber panicked during delivery"
                    );
                }
                Err(_) => {
                    report.timed_out += 1;
                    warn!(
                        %id,
                        event      = event.kind(),
                        instrument = event.instrument_id(),
                        timeout_ms = timeout.as_millis() as u64,
                        "subscriber delivery timed out"
                    );
                }
            }
        }

        report
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::models::Tick;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MonitorEvent>>,
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl Subscriber for Recorder {
        async fn on_event(&self, event: &MonitorEvent) -> anyhow::Result<()> {
            self.seen.lock().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Subscriber for Failing {
        async fn on_event(&self, _event: &MonitorEvent) -> anyhow::Result<()> {
            anyhow::bail!("socket gone")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Subscriber for Panicking {
        async fn on_event(&self, _event: &MonitorEvent) -> anyhow::Result<()> {
            panic!("subscriber bug")
        }
    }

    struct Stalled;

    #[async_trait]
    impl Subscriber for Stalled {
        async fn on_event(&self, _event: &MonitorEvent) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    /// Removes a given subscription from inside its own delivery.
    struct SelfRemoving {
        hub: NotificationHub,
        id:  Mutex<Option<SubscriptionId>>,
        hits: AtomicU64,
    }

    #[async_trait]
    impl Subscriber for SelfRemoving {
        async fn on_event(&self, _event: &MonitorEvent) -> anyhow::Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let id = *self.id.lock();
            if let Some(id) = id {
                self.hub.unsubscribe(id);
            }
            Ok(())
        }
    }

    fn event() -> MonitorEvent {
        Tick::new("bitcoin", "bitcoin", 64_000.0, Utc::now()).unwrap().into()
    }

    fn hub() -> NotificationHub {
        NotificationHub::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let hub = hub();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        hub.subscribe(a.clone());
        hub.subscribe(b.clone());

        let report = hub.broadcast(&event()).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
    }

    #[tokio::test]
    async fn duplicate_subscribe_is_deduplicated() {
        let hub = hub();
        let a = Arc::new(Recorder::default());
        let first = hub.subscribe(a.clone());
        let second = hub.subscribe(a.clone());

        assert_eq!(first, second);
        assert_eq!(hub.subscriber_count(), 1);

        hub.broadcast(&event()).await;
        assert_eq!(a.count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let hub = hub();
        let a = Arc::new(Recorder::default());
        let id = hub.subscribe(a.clone());

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));

        hub.broadcast(&event()).await;
        assert_eq!(a.count(), 0);
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_affect_others() {
        let hub = hub();
        let a = Arc::new(Recorder::default());
        hub.subscribe(Arc::new(Failing));
        hub.subscribe(a.clone());

        let report = hub.broadcast(&event()).await;

        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1, timed_out: 0 });
        assert_eq!(a.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_subscriber_is_abandoned_after_timeout() {
        let hub = hub();
        let a = Arc::new(Recorder::default());
        hub.subscribe(Arc::new(Stalled));
        hub.subscribe(a.clone());

        let report = hub.broadcast(&event()).await;

        assert_eq!(report.timed_out, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(a.count(), 1);
    }

    #[tokio::test]
    async fn panicking_subscriber_counts_as_failed() {
        let hub = hub();
        let a = Arc::new(Recorder::default());
        hub.subscribe(Arc::new(Panicking));
        hub.subscribe(a.clone());

        let report = hub.broadcast(&event()).await;
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1, timed_out: 0 });

        // The hub stays usable and the panicking subscriber stays registered.
        let report = hub.broadcast(&event()).await;
        assert_eq!(report.failed, 1);
        assert_eq!(a.count(), 2);
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_subscribers_cost_one_timeout_per_broadcast() {
        let hub = hub();
        hub.subscribe(Arc::new(Stalled));
        hub.subscribe(Arc::new(Stalled));
        hub.subscribe(Arc::new(Stalled));

        let started = tokio::time::Instant::now();
        let report = hub.broadcast(&event()).await;
        let elapsed = started.elapsed();

        assert_eq!(report.timed_out, 3);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn unsubscribe_during_broadcast_is_safe() {
        let hub = hub();
        let remover = Arc::new(SelfRemoving {
            hub:  hub.clone(),
            id:   Mutex::new(None),
            hits: AtomicU64::new(0),
        });
        let id = hub.subscribe(remover.clone());
        *remover.id.lock() = Some(id);
        let other = Arc::new(Recorder::default());
        hub.subscribe(other.clone());

        let report = hub.broadcast(&event()).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(hub.subscriber_count(), 1);

        hub.broadcast(&event()).await;
        assert_eq!(remover.hits.load(Ordering::SeqCst), 1);
        assert_eq!(other.count(), 2);
    }

    #[tokio::test]
    async fn channel_subscriber_reports_full_queue() {
        let hub = hub();
        let (sub, mut rx) = ChannelSubscriber::channel(1);
        hub.subscribe(sub);

        assert_eq!(hub.broadcast(&event()).await.delivered, 1);
        assert_eq!(hub.broadcast(&event()).await.failed, 1);

        assert!(rx.recv().await.is_some());
        assert_eq!(hub.broadcast(&event()).await.delivered, 1);
    }
}
