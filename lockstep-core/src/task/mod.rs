//! Tasks, batches and plans
//!
//! What workers run, and the records that carry it between them.

pub mod batch;
pub mod command;
pub mod executor;
pub mod plan;

pub use batch::{BatchStore, CommandBatch};
pub use command::{Task, TaskOutcome};
pub use executor::TaskExecutor;
pub use plan::{JobPlan, Phase};
