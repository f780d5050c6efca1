//! Connection Hub
//!
//! Tracks every connected client's outbound channel and its delivery-group
//! membership. Group delivery is fire-and-forget: a recipient whose channel
//! is full or closed simply misses the event.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::metrics::ServerMetrics;
use crate::ws::ServerMessage;

pub struct ConnectionHub {
    /// connection_id -> outbound channel feeding that connection's writer task
    connections: RwLock<HashMap<String, mpsc::Sender<ServerMessage>>>,
    /// group -> member connection_ids. Empty groups are removed.
    groups: RwLock<HashMap<String, HashSet<String>>>,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionHub {
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub async fn register(&self, connection_id: &str, tx: mpsc::Sender<ServerMessage>) {
        self.connections
            .write()
            .await
            .insert(connection_id.to_string(), tx);
    }

    /// Forget a connection and remove it from every group it joined.
    pub async fn unregister(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);
        self.leave_all(connection_id).await;
    }

    /// Add a connection to a group.
    pub async fn join(&self, connection_id: &str, group: &str) {
        self.groups
            .write()
            .await
            .entry(group.to_string())
            .or_default()
            .insert(connection_id.to_string());
        debug!("[HUB] {} joined group {}", connection_id, group);
    }

    /// Remove a connection from all groups. Returns the groups it left.
    pub async fn leave_all(&self, connection_id: &str) -> Vec<String> {
        let mut groups = self.groups.write().await;
        let mut left = Vec::new();
        for (group, members) in groups.iter_mut() {
            if members.remove(connection_id) {
                left.push(group.clone());
            }
        }
        groups.retain(|_, members| !members.is_empty());
        left
    }

    /// Connection ids currently in `group`, sorted.
    pub async fn members(&self, group: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .groups
            .read()
            .await
            .get(group)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Queue `msg` for every member of `group` without waiting on any of them.
    /// Returns how many recipients accepted the event.
    pub async fn deliver_to_group(&self, group: &str, msg: ServerMessage) -> usize {
        // Snapshot membership first; the two locks are never held together.
        let members = self.members(group).await;
        if members.is_empty() {
            return 0;
        }

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for connection_id in &members {
            let Some(tx) = connections.get(connection_id) else {
                continue;
            };
            match tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "[HUB] Outbound channel full for {}, dropping event for group {}",
                        connection_id, group
                    );
                    self.metrics.event_dropped();
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("[HUB] {} already closed, skipping", connection_id);
                    self.metrics.event_dropped();
                }
            }
        }
        self.metrics.events_delivered(delivered);
        delivered
    }
}
