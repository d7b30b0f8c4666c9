//! WebSocket transport: upgrades HTTP connections and bridges socket frames
//! to the gateway dispatcher. One writer task and one read loop per
//! connection; all session state lives behind the gateway, so this layer
//! only (de)serializes and reports errors.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::metrics::GatewayMetrics;
use crate::protocol::ClientEvent;
use crate::relay::Gateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Arc<GatewayMetrics>,
    pub shutdown: watch::Receiver<bool>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let conn_id = state.gateway.connect(event_tx);
    info!(conn_id = %conn_id, "websocket connected");

    // Writer task: serialize server events onto the socket. Exits when the
    // gateway drops the sender or the socket goes away.
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to serialize server event: {e}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    if let Err(e) = state.gateway.handle_connect(&conn_id).await {
        state.metrics.store_errors.inc();
        warn!(conn_id = %conn_id, "connect handling failed: {e}");
    }

    let mut shutdown = state.shutdown.clone();
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let event: ClientEvent = match serde_json::from_str(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                state.metrics.protocol_drops.inc();
                                warn!(conn_id = %conn_id, "dropping malformed event: {e}");
                                continue;
                            }
                        };
                        let started = Instant::now();
                        if let Err(e) = state.gateway.handle_event(&conn_id, event).await {
                            state.metrics.store_errors.inc();
                            warn!(conn_id = %conn_id, "event handling failed: {e}");
                        }
                        state
                            .metrics
                            .event_latency
                            .observe(started.elapsed().as_secs_f64());
                    }
                    Message::Close(_) => break,
                    // Ping/pong handled by axum; binary frames are not part
                    // of the protocol.
                    _ => {}
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!(conn_id = %conn_id, "closing socket for shutdown");
                    break;
                }
            }
        }
    }

    if let Err(e) = state.gateway.handle_disconnect(&conn_id).await {
        warn!(conn_id = %conn_id, "disconnect handling failed: {e}");
    }
    writer.abort();
    info!(conn_id = %conn_id, "websocket disconnected");
}

pub async fn get_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.export_prometheus()
}
