//! Worker-side logic
//!
//! Follower state records, change notification, and the follower loop.

pub mod follower;
pub mod state;
pub mod watcher;

pub use follower::Follower;
pub use state::{StateStore, WorkerState};
pub use watcher::ChangeWatcher;
