pub mod address;
pub mod logging;
pub mod task;

pub use address::is_valid;
pub use task::EmailTask;
pub use tracing;

/// Lifecycle signals broadcast from the shutdown coordinator to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
