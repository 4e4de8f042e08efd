pub mod events;
pub mod watchers;

// Re-export handler functions
pub use events::*;
pub use watchers::*;
