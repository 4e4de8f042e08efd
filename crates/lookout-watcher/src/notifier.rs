use chrono::{DateTime, Utc};
use lookout_core::{EventAction, ExecutionStatus, InterceptedEventExecution};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Payload enqueued for every persisted execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionNotification {
    pub intercepted_event_id: u64,
    pub cluster_id: u64,
    pub namespace: String,
    pub action: EventAction,
    pub watcher_id: u64,
    pub watcher_name: String,
    pub trigger_id: u64,
    pub status: ExecutionStatus,
    pub intercepted_at: DateTime<Utc>,
}

impl From<&InterceptedEventExecution> for ExecutionNotification {
    fn from(row: &InterceptedEventExecution) -> Self {
        Self {
            intercepted_event_id: row.id,
            cluster_id: row.cluster_id,
            namespace: row.namespace.clone(),
            action: row.action,
            watcher_id: row.watcher_id,
            watcher_name: row.watcher_name.clone(),
            trigger_id: row.trigger_id,
            status: row.status,
            intercepted_at: row.intercepted_at,
        }
    }
}

/// Sink for execution notifications; delivery is someone else's job
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: ExecutionNotification);
}

/// Configuration for the broadcast notifier
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Capacity of the broadcast channel
    pub capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Notifier publishing on a tokio broadcast channel
///
/// Sending never blocks; slow subscribers lag and lose the oldest entries.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ExecutionNotification>,
}

impl BroadcastNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let (tx, _) = broadcast::channel(config.capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionNotification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: ExecutionNotification) {
        let id = notification.intercepted_event_id;
        // No receivers is fine
        if self.tx.send(notification).is_err() {
            debug!("No notification subscribers for execution {}", id);
        }
    }
}
