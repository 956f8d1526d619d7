use crate::sync::{SheetUpdate, SyncContext};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub(super) fn router() -> Router<SyncContext> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(State(ctx): State<SyncContext>, ws: WebSocketUpgrade) -> Response {
    // Subscribe before the upgrade completes so nothing sent in between is missed
    let updates = ctx.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, updates))
}

/// Forwards every sheet update to the client as a JSON text message until either side goes away.
/// Anything the client sends is ignored.
async fn handle_socket(socket: WebSocket, mut updates: broadcast::Receiver<SheetUpdate>) {
    let (mut sender, mut receiver) = socket.split();
    debug!("Websocket listener connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let update = match updates.recv().await {
                Ok(update) => update,
                Err(RecvError::Lagged(missed)) => {
                    warn!("A websocket listener fell behind and missed {missed} updates");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&update) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Unable to serialize a sheet update: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    debug!("Websocket listener disconnected");
}
