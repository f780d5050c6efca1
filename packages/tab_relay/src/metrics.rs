//! Server metrics for observability
//!
//! Provides runtime counters for monitoring relay health and traffic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently active WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Message metrics
    /// WebSocket frames received from clients
    pub messages_received: AtomicU64,
    /// Frames that failed to decode
    pub messages_invalid: AtomicU64,
    /// Events handed to a recipient's outbound channel
    pub events_delivered: AtomicU64,
    /// Events dropped because a recipient channel was full or closed
    pub events_dropped: AtomicU64,

    // Routing metrics
    /// Inbound tab data relayed to a delivery group
    pub inbound_relayed: AtomicU64,
    /// Inbound tab data dropped because the sender had no input binding
    pub inbound_dropped: AtomicU64,
    /// Inject commands delivered
    pub injects_delivered: AtomicU64,
    /// Inject commands rejected (unauthorized, unknown tab, no live tabs)
    pub injects_rejected: AtomicU64,
    /// Expired tabs removed by inject sweeps
    pub tabs_pruned: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    // Message tracking
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_invalid(&self) {
        self.messages_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_delivered(&self, count: usize) {
        self.events_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // Routing
    pub fn inbound_relayed(&self) {
        self.inbound_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inbound_dropped(&self) {
        self.inbound_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inject_delivered(&self) {
        self.injects_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inject_rejected(&self) {
        self.injects_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tabs_pruned(&self, count: usize) {
        self.tabs_pruned.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                invalid: self.messages_invalid.load(Ordering::Relaxed),
                delivered: self.events_delivered.load(Ordering::Relaxed),
                dropped: self.events_dropped.load(Ordering::Relaxed),
            },
            routing: RoutingMetrics {
                inbound_relayed: self.inbound_relayed.load(Ordering::Relaxed),
                inbound_dropped: self.inbound_dropped.load(Ordering::Relaxed),
                injects_delivered: self.injects_delivered.load(Ordering::Relaxed),
                injects_rejected: self.injects_rejected.load(Ordering::Relaxed),
                tabs_pruned: self.tabs_pruned.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
    pub routing: RoutingMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub invalid: u64,
    pub delivered: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingMetrics {
    pub inbound_relayed: u64,
    pub inbound_dropped: u64,
    pub injects_delivered: u64,
    pub injects_rejected: u64,
    pub tabs_pruned: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub registry: RegistryHealth,
    pub uptime_secs: u64,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryHealth {
    pub accounts: u64,
    pub stored_tabs: u64,
    pub tab_ttl_secs: u64,
}
