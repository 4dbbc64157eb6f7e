// Core infrastructure
pub mod errors;

// The fork/join coordinator
pub mod coord;

// Re-exports for convenience
pub use coord::coordinator::ForkJoinCoordinator;
pub use coord::events::EventKind;
pub use coord::types::{CallbackArgs, Completion, State};
pub use errors::{ForkJoinError, Result};
