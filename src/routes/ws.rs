//! # routes::ws
//!
//! **Live stream** — `GET /ws/prices`.
//!
//! On connect the client gets one `SNAPSHOT` frame with the latest tick per
//! instrument, then one JSON text frame per `TICK` / `ALERT` event. Each
//! connection is a hub subscriber backed by a bounded queue, so a client
//! that stops reading only loses its own events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    engine::{ChannelSubscriber, MonitorEngine},
    state::SharedState,
};

/// Events buffered per connection before deliveries start failing.
const CLIENT_QUEUE: usize = 256;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_prices(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let hub = state.engine.hub().clone();
    let (subscriber, mut events) = ChannelSubscriber::channel(CLIENT_QUEUE);
    let id = hub.subscribe(subscriber);
    let (mut sender, mut receiver) = socket.split();

    info!(%id, "websocket client connected");

    // ── Snapshot first, so the client never starts from nothing ─────────────
    let snapshot = snapshot_frame(&state.engine).await;
    if sender.send(Message::Text(snapshot)).await.is_ok() {
        // ── Event Loop ───────────────────────────────────────────────────────
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if sender.send(Message::Text(event.to_json())).await.is_err() {
                        break;
                    }
                }

                incoming = receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sender.send(Message::Pong(data)).await;
                        }
                        Some(Ok(_)) => debug!(%id, "ignoring client frame"),
                    }
                }
            }
        }
    }

    hub.unsubscribe(id);
    info!(%id, "websocket client disconnected");
}

/// `{"event":"SNAPSHOT","running":..,"prices":{id: tick}}`
pub async fn snapshot_frame(engine: &MonitorEngine) -> String {
    json!({
        "event":   "SNAPSHOT",
        "running": engine.is_running(),
        "prices":  engine.latest_ticks().await,
    })
    .to_string()
}
