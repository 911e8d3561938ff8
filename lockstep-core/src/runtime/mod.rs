//! Process runtime
//!
//! Current-thread Tokio runtime wrapping the job entry point.

pub mod executor;

pub use executor::LockstepRuntime;
