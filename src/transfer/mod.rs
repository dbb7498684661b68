//! Batch transfer of shared files -- the save, poll, resolve, delete workflow.
//!
//! Split into focused submodules:
//! - [`context`] - Collaborators and settings shared by a batch's workers
//! - [`task`] - Per-file state machine with guaranteed cleanup
//! - [`orchestrator`] - Worker pool, atomic claim cursor, batch report
//! - [`progress`] - Aggregate progress, log lines, active downloads

mod context;
mod orchestrator;
mod progress;
mod task;


pub use orchestrator::BatchOrchestrator;
pub use progress::ProgressHub;
