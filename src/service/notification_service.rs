// services/notification_service.rs
//
// Real-time fan-out. Delivery is at-most-once and best-effort: a failed or
// unobserved send is logged and swallowed, never surfaced to the caller of
// the primary operation.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::dtos::eventdtos::OutboundEvent;

#[async_trait::async_trait]
pub trait NotificationFanout: Send + Sync {
    /// Deliver an event to a single user's channel.
    async fn notify_user(&self, user_id: Uuid, event: OutboundEvent);

    /// Deliver an event to every connected user.
    async fn broadcast(&self, event: OutboundEvent);
}

const CHANNEL_CAPACITY: usize = 64;

/// In-process pub/sub hub backing the WebSocket endpoint. Created once at
/// service start and injected into the services; its lifecycle is independent
/// of any coordinator.
pub struct NotificationHub {
    global: broadcast::Sender<String>,
    users: RwLock<HashMap<Uuid, broadcast::Sender<String>>>,
}

impl NotificationHub {
    pub fn new() -> Arc<Self> {
        let (global, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            global,
            users: RwLock::new(HashMap::new()),
        })
    }

    /// Register a connection for `user_id`. Returns the personal receiver and
    /// a receiver on the global channel.
    pub async fn subscribe(
        &self,
        user_id: Uuid,
    ) -> (broadcast::Receiver<String>, broadcast::Receiver<String>) {
        let mut users = self.users.write().await;
        let sender = users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        (sender.subscribe(), self.global.subscribe())
    }

    /// Drop per-user channels nobody listens to anymore.
    pub async fn prune(&self) {
        let mut users = self.users.write().await;
        users.retain(|_, sender| sender.receiver_count() > 0);
    }

    fn encode(event: &OutboundEvent) -> Option<String> {
        match serde_json::to_string(event) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Failed to encode {} event: {}", event.name(), e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl NotificationFanout for NotificationHub {
    async fn notify_user(&self, user_id: Uuid, event: OutboundEvent) {
        let Some(frame) = Self::encode(&event) else {
            return;
        };
        let users = self.users.read().await;
        match users.get(&user_id) {
            Some(sender) => {
                if sender.send(frame).is_err() {
                    tracing::debug!("User {} has no open connections, dropping {}", user_id, event.name());
                }
            }
            None => {
                tracing::debug!("User {} not connected, dropping {}", user_id, event.name());
            }
        }
    }

    async fn broadcast(&self, event: OutboundEvent) {
        let Some(frame) = Self::encode(&event) else {
            return;
        };
        if self.global.send(frame).is_err() {
            tracing::debug!("No connected users, dropping broadcast {}", event.name());
        }
    }
}
