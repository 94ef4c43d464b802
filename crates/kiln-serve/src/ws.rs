//! Websocket push of live-reload events

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use kiln_tasks::ReloadChannel;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::ServeState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServeState>>,
) -> impl IntoResponse {
    let reload = state.reload.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, reload))
}

async fn handle_socket(socket: WebSocket, reload: ReloadChannel) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = reload.subscribe();
    debug!(clients = reload.subscribers(), "live-reload client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!(error = %e, "failed to encode reload event");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("live-reload client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("live-reload client disconnected");
}
