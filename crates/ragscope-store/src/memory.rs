use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::types::EvaluationRun;
use crate::{RunStore, StoreError};

/// In-memory run store.
#[derive(Debug, Default)]
pub struct MemoryStore {
  runs: RwLock<HashMap<String, EvaluationRun>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a store from runs, rejecting duplicate ids.
  pub fn from_runs(runs: impl IntoIterator<Item = EvaluationRun>) -> Result<Self, StoreError> {
    let mut map = HashMap::new();
    for run in runs {
      if map.contains_key(&run.run_id) {
        return Err(StoreError::DuplicateRun(run.run_id));
      }
      map.insert(run.run_id.clone(), run);
    }
    Ok(Self {
      runs: RwLock::new(map),
    })
  }

  /// Insert or replace a run.
  pub fn insert(&self, run: EvaluationRun) {
    let mut runs = self.runs.write().unwrap_or_else(|e| e.into_inner());
    runs.insert(run.run_id.clone(), run);
  }
}

#[async_trait]
impl RunStore for MemoryStore {
  async fn get_run(&self, run_id: &str) -> Result<Option<EvaluationRun>, StoreError> {
    let runs = self.runs.read().unwrap_or_else(|e| e.into_inner());
    Ok(runs.get(run_id).cloned())
  }

  async fn list_run_ids(&self) -> Result<Vec<String>, StoreError> {
    let runs = self.runs.read().unwrap_or_else(|e| e.into_inner());
    let mut ids: Vec<String> = runs.keys().cloned().collect();
    ids.sort();
    Ok(ids)
  }
}
