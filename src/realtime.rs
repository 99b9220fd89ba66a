use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::Notification;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    NotificationCreated(Notification),
    NotificationsRead {
        notification_ids: Vec<Uuid>,
        read_at: DateTime<Utc>,
    },
}

/// Best-effort delivery to connected clients.
#[async_trait]
pub trait PushChannel: Send + Sync + 'static {
    async fn push(&self, recipient_id: Uuid, event: RealtimeEvent) -> Result<()>;
}

type ConnectionSender = mpsc::UnboundedSender<RealtimeEvent>;

/// Registry of live WebSocket connections, keyed by user. A user may hold
/// several connections at once (tabs, devices).
#[derive(Clone, Default)]
pub struct RealtimeHub {
    connections: Arc<RwLock<HashMap<Uuid, Vec<(Uuid, ConnectionSender)>>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(senders) = connections.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != conn_id);
            if senders.is_empty() {
                connections.remove(&user_id);
            }
        }
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.connections
            .read()
            .await
            .get(&user_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl PushChannel for RealtimeHub {
    async fn push(&self, recipient_id: Uuid, event: RealtimeEvent) -> Result<()> {
        let connections = self.connections.read().await;
        let Some(senders) = connections.get(&recipient_id) else {
            debug!(%recipient_id, "recipient not connected; push skipped");
            return Ok(());
        };
        for (conn_id, sender) in senders {
            if sender.send(event.clone()).is_err() {
                debug!(%recipient_id, %conn_id, "connection closed before push");
            }
        }
        Ok(())
    }
}

/// Relays a user's events to one socket until either side goes away.
pub async fn serve_connection(socket: WebSocket, hub: RealtimeHub, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut events) = hub.register(user_id).await;
    info!(%user_id, %conn_id, "realtime connection opened");

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(error = %err, "failed to encode realtime event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(user_id, conn_id).await;
    info!(%user_id, %conn_id, "realtime connection closed");
}
