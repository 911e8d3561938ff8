//! Leader-side coordination
//!
//! Worker registration, phase orchestration, the phase barrier, and the
//! even-split helper used to turn flat task lists into per-worker batches.

pub mod barrier;
pub mod batch_assigner;
pub mod leader;
pub mod registrar;

pub use barrier::PhaseBarrier;
pub use batch_assigner::BatchAssigner;
pub use leader::{Orchestrator, OrchestratorConfig};
pub use registrar::Registrar;
