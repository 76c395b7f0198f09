//! Execution layer: process handles, deferred results, and the timeout
//! watchdog

pub mod future;
pub mod process;
pub mod watchdog;

pub use future::RunFuture;
pub use process::{ExitExpectation, OutputEncoding, RunOptions, RunOutput, RunningProcess};
pub use watchdog::{Clock, SystemClock, Watchdog};
