//! `GET /ws`: live activity feed for dashboards.
//!
//! Each connection gets its own broadcast receiver and sees only events
//! published while it is connected. Frames are JSON text, one
//! [`LiveEvent`](crate::services::broadcast::LiveEvent) per frame.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(live_feed))
}

async fn live_feed(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    // подписываемся до первого await, чтобы не пропустить события
    let mut events = state.broadcaster.subscribe();
    info!(
        %connection_id,
        listeners = state.broadcaster.listener_count(),
        "Live dashboard connected"
    );

    let (mut sender, mut receiver) = socket.split();
    let mut ping = interval(Duration::from_secs(
        state.config.live.ping_interval_seconds.max(1),
    ));
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // первый тик срабатывает сразу
    ping.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(%connection_id, "Could not serialize live event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!(%connection_id, "Send failed, closing live connection");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%connection_id, skipped, "Live listener lagged, events skipped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%connection_id, "WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }

    info!(%connection_id, "Live dashboard disconnected");
}
