use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{sink::SinkExt, stream::SplitSink, stream::StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::models::{TableDelta, TableOccupancy};
use crate::services::SeatingEvent;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

/// Messages pushed to observers. A snapshot always supersedes any deltas
/// the observer may have missed.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
    Snapshot { tables: Vec<TableOccupancy> },
    TableUpdate { tables: Vec<TableDelta> },
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Subscribe before the initial snapshot so no commit falls in between.
    let mut events = state.allocator.subscribe();
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(observers = state.allocator.observer_count(), "observer connected");

    if send_snapshot(&mut sender, &state).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let sent = match event {
                    Ok(SeatingEvent::Deltas(tables)) => {
                        send_message(&mut sender, &WireMessage::TableUpdate { tables }).await
                    }
                    Ok(SeatingEvent::FullRefresh) => send_snapshot(&mut sender, &state).await,
                    // Fell behind the broadcast channel; a fresh snapshot
                    // covers everything that was dropped.
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "observer lagged, resynchronizing");
                        send_snapshot(&mut sender, &state).await
                    }
                    Err(RecvError::Closed) => break,
                };
                if sent.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) if text.as_str() == "request_update" => {
                        if send_snapshot(&mut sender, &state).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("websocket receive error: {:?}", e);
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("observer disconnected");
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
) -> Result<(), ()> {
    let tables = state.allocator.snapshot().await.map_err(|e| {
        tracing::error!("snapshot for websocket failed: {:?}", e);
    })?;
    send_message(sender, &WireMessage::Snapshot { tables }).await
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &WireMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(message).map_err(|e| {
        tracing::error!("failed to serialize websocket message: {:?}", e);
    })?;
    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}
