use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduling limits for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
  /// Upper bound on nodes executing at once. `1` runs nodes one at a time in
  /// declaration order; `0` is treated as `1`.
  pub max_concurrency: usize,
  /// Per-node deadline around `execute`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub node_timeout_ms: Option<u64>,
  /// Deadline for the whole run, measured from the start of the call.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub run_timeout_ms: Option<u64>,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 4,
      node_timeout_ms: None,
      run_timeout_ms: None,
    }
  }
}

impl OrchestratorConfig {
  pub fn sequential() -> Self {
    Self {
      max_concurrency: 1,
      ..Self::default()
    }
  }

  pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
    self.max_concurrency = max_concurrency;
    self
  }

  pub fn with_node_timeout_ms(mut self, ms: u64) -> Self {
    self.node_timeout_ms = Some(ms);
    self
  }

  pub fn with_run_timeout_ms(mut self, ms: u64) -> Self {
    self.run_timeout_ms = Some(ms);
    self
  }

  pub(crate) fn permits(&self) -> usize {
    self.max_concurrency.max(1)
  }

  pub(crate) fn node_timeout(&self) -> Option<Duration> {
    self.node_timeout_ms.map(Duration::from_millis)
  }

  pub(crate) fn run_timeout(&self) -> Option<Duration> {
    self.run_timeout_ms.map(Duration::from_millis)
  }
}
