//! Dispatch engine: passes, lanes, and the timers that pace them.

pub mod dispatch;
pub mod lane;
pub mod timer;

pub use dispatch::{DEFAULT_CONCURRENCY, DispatchConfig, Dispatcher, RunSummary, TerminalFailure};
pub use lane::LaneState;
