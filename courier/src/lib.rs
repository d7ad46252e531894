pub mod controller;
pub mod shutdown;

pub use controller::{Courier, DispatchOutcome};
pub use shutdown::ShutdownCoordinator;
