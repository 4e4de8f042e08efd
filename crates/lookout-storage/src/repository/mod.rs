pub mod execution;
pub mod trigger;
pub mod watcher;

pub use execution::ExecutionRepository;
pub use trigger::TriggerRepository;
pub use watcher::{WatcherFilter, WatcherRepository};
