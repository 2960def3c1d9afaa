// WebSocket bridge onto the notification hub. Clients connect with their user
// id and receive their personal events plus everything broadcast globally.
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Uuid,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params.user_id, app_state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, app_state: Arc<AppState>) {
    let (mut personal, mut global) = app_state.notification_hub.subscribe(user_id).await;
    let (mut sink, mut stream) = socket.split();

    tracing::info!("User {} connected to the notification stream", user_id);

    loop {
        tokio::select! {
            frame = personal.recv() => {
                if !forward(&mut sink, frame, user_id).await {
                    break;
                }
            }
            frame = global.recv() => {
                if !forward(&mut sink, frame, user_id).await {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    // Inbound traffic is ignored except for connection control.
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error for user {}: {}", user_id, e);
                        break;
                    }
                }
            }
        }
    }

    app_state.notification_hub.prune().await;
    tracing::info!("User {} disconnected from the notification stream", user_id);
}

async fn forward(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: Result<String, RecvError>,
    user_id: Uuid,
) -> bool {
    match frame {
        Ok(text) => sink.send(Message::Text(text)).await.is_ok(),
        Err(RecvError::Lagged(skipped)) => {
            // At-most-once delivery: slow consumers lose frames, connection stays.
            tracing::warn!("User {} lagged, skipped {} notifications", user_id, skipped);
            true
        }
        Err(RecvError::Closed) => false,
    }
}
