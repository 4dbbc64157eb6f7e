pub mod coordinator;
pub mod events;
pub mod types;

pub use coordinator::ForkJoinCoordinator;
pub use events::{EventHandler, EventKind};
pub use types::{CallbackArgs, Completion, Operation, State, Task, TaskCallback};
