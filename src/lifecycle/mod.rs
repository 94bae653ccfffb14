//! Process lifecycle: OS signals and task cancellation

mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal, ShutdownToken};
