//! Modules that pull evaluation runs from the injected store.

use std::sync::Arc;

use async_trait::async_trait;
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params, param_str,
};
use ragscope_store::{EvaluationRun, RunStore};
use serde_json::json;
use tracing::debug;

use crate::util::object;

/// Output shape shared by both loaders.
pub(crate) fn run_output(run: &EvaluationRun) -> ModuleOutput {
  object(json!({
    "run_id": run.run_id,
    "dataset_name": run.dataset_name,
    "model_name": run.model_name,
    "case_count": run.results.len(),
    "cases": run.results,
    "metrics": run.scores_by_metric(),
    "thresholds": run.thresholds(),
  }))
}

async fn load(store: &dyn RunStore, run_id: &str) -> Result<EvaluationRun, ModuleError> {
  store
    .get_run(run_id)
    .await
    .map_err(|e| ModuleError::Store(e.to_string()))?
    .ok_or_else(|| ModuleError::Store(format!("run not found: {}", run_id)))
}

/// Loads the run named by the `run_id` parameter.
///
/// Emits `run_id`, `dataset_name`, `model_name`, `case_count`, `cases`
/// (serialized test cases), `metrics` (metric → scores in case order) and
/// `thresholds` (metric → threshold).
pub struct DataLoader {
  metadata: ModuleMetadata,
  store: Arc<dyn RunStore>,
}

impl DataLoader {
  pub fn new(store: Arc<dyn RunStore>) -> Self {
    Self {
      metadata: ModuleMetadata::new("data_loader", "Data loader")
        .description("Loads an evaluation run from storage")
        .inputs(&["run_id"])
        .outputs(&["cases", "metrics", "thresholds"]),
      store,
    }
  }
}

#[async_trait]
impl AnalysisModule for DataLoader {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    _inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let run_id = param_str(params, "run_id")?.ok_or_else(|| ModuleError::MissingParam("run_id".to_string()))?;
    let run = load(self.store.as_ref(), run_id).await?;
    debug!(run_id = %run_id, cases = run.results.len(), "run loaded");
    Ok(run_output(&run))
  }
}

/// Loads two or more runs for comparison.
///
/// Reads `run_ids` (array of ids, first is the baseline) or, failing that,
/// `run_id` plus `compare_run_id`. Emits `runs`: one [`DataLoader`]-shaped
/// object per run, without the `cases` field.
pub struct RunLoader {
  metadata: ModuleMetadata,
  store: Arc<dyn RunStore>,
}

impl RunLoader {
  pub fn new(store: Arc<dyn RunStore>) -> Self {
    Self {
      metadata: ModuleMetadata::new("run_loader", "Run loader")
        .description("Loads several evaluation runs for comparison")
        .inputs(&["run_ids"])
        .outputs(&["runs"]),
      store,
    }
  }

  fn run_ids(params: &Params) -> Result<Vec<String>, ModuleError> {
    if let Some(value) = params.get("run_ids") {
      let ids: Vec<String> = serde_json::from_value(value.clone())
        .map_err(|e| ModuleError::invalid("run_ids", e.to_string()))?;
      return Ok(ids);
    }

    match (param_str(params, "run_id")?, param_str(params, "compare_run_id")?) {
      (Some(a), Some(b)) => Ok(vec![a.to_string(), b.to_string()]),
      _ => Err(ModuleError::MissingParam("run_ids".to_string())),
    }
  }
}

#[async_trait]
impl AnalysisModule for RunLoader {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    _inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let ids = Self::run_ids(params)?;
    if ids.len() < 2 {
      return Err(ModuleError::invalid(
        "run_ids",
        format!("at least two runs are required, got {}", ids.len()),
      ));
    }

    let mut runs = Vec::with_capacity(ids.len());
    for id in &ids {
      let run = load(self.store.as_ref(), id).await?;
      let mut summary = run_output(&run);
      summary.remove("cases");
      runs.push(serde_json::Value::Object(summary));
    }

    Ok(object(json!({ "runs": runs })))
  }
}
