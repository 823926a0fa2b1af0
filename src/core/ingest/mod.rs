//! Run orchestration and reporting

pub mod coordinator;
pub mod summary;

pub use coordinator::Orchestrator;
pub use summary::{RunSummary, SourceResult};
