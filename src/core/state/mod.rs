// Checkpoint state for resumable ingestion

pub mod checkpoint;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointSummary};
pub use store::{CheckpointStore, FileCheckpointStore};
