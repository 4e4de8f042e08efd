use lookout_watcher::{EventIngestor, QueryApi, WatcherService};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Watcher CRUD and agent fan-out
    pub service: Arc<WatcherService>,

    /// Agent event intake
    pub ingestor: Arc<EventIngestor>,
}

impl AppState {
    pub fn new(service: Arc<WatcherService>, ingestor: Arc<EventIngestor>) -> Self {
        Self { service, ingestor }
    }

    /// Read side shared with the watcher service
    pub fn query(&self) -> &QueryApi {
        self.service.query()
    }
}
