use std::path::Path;

use async_trait::async_trait;

use crate::memory::MemoryStore;
use crate::types::EvaluationRun;
use crate::{RunStore, StoreError};

/// Read-only store backed by a JSON file holding an array of runs.
///
/// The file is read once when the store is opened.
#[derive(Debug)]
pub struct JsonFileStore {
  inner: MemoryStore,
}

impl JsonFileStore {
  /// Open and parse `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    Self::from_json(&content)
  }

  /// Parse runs from a JSON string.
  pub fn from_json(content: &str) -> Result<Self, StoreError> {
    let runs: Vec<EvaluationRun> = serde_json::from_str(content)?;
    Ok(Self {
      inner: MemoryStore::from_runs(runs)?,
    })
  }
}

#[async_trait]
impl RunStore for JsonFileStore {
  async fn get_run(&self, run_id: &str) -> Result<Option<EvaluationRun>, StoreError> {
    self.inner.get_run(run_id).await
  }

  async fn list_run_ids(&self) -> Result<Vec<String>, StoreError> {
    self.inner.list_run_ids().await
  }
}
