//! Ragscope Store
//!
//! Storage boundary for evaluation runs. Persistence itself belongs to the
//! embedding application; this crate defines the lookup the analysis modules
//! need and ships two read-only implementations:
//! - [`MemoryStore`] for tests and embedding
//! - [`JsonFileStore`] for the command line front end

mod json;
mod memory;
mod types;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use types::{EvaluationRun, MetricScore, TestCaseResult};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// Reading the backing file failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The backing data is not valid run JSON.
  #[error("invalid run data: {0}")]
  Parse(#[from] serde_json::Error),

  /// Two runs share an id.
  #[error("duplicate run id: {0}")]
  DuplicateRun(String),
}

/// Lookup of evaluation runs by id.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Get a run, `None` when no run has that id.
  async fn get_run(&self, run_id: &str) -> Result<Option<EvaluationRun>, StoreError>;

  /// Ids of all stored runs, sorted.
  async fn list_run_ids(&self) -> Result<Vec<String>, StoreError>;
}
