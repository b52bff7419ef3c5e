use axum::{
    extract::{Extension, Path, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::dto::draft_dto::DraftEvent;
use crate::services::draft_hub::SharedDraftHub;

/// Fans an event out to every subscriber of the lobby. Nobody listening is fine.
pub fn publish(tx: &broadcast::Sender<String>, event: &DraftEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            error!("Failed to serialize draft event: {}", e);
        }
    }
}

/* Web Socket stuff */
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(lobby_id): Path<i64>,
    Extension(hub): Extension<SharedDraftHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, lobby_id, hub))
}

async fn handle_socket(socket: WebSocket, lobby_id: i64, hub: SharedDraftHub) {
    // The snapshot covers every event committed before the subscription, so
    // the first frame and the stream never overlap.
    let (mut rx, state) = match hub.subscribe(lobby_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Failed to subscribe to lobby {}: {}", lobby_id, e);
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();

    // Task to send messages to this client
    let send_task = tokio::spawn(async move {
        match state {
            Some(state) => match serde_json::to_string(&DraftEvent::DraftState { state }) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        return;
                    }
                }
                Err(e) => error!("Failed to serialize draft state: {}", e),
            },
            None => info!("No draft configured yet for lobby {}", lobby_id),
        }

        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if sender.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The client has to resync from the snapshot endpoint.
                    warn!("Subscriber of lobby {} lagged by {} events", lobby_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Clients only listen; drain until they close.
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    // Clean up
    send_task.abort();
    let _ = send_task.await;
    hub.release_idle(lobby_id).await;
}
