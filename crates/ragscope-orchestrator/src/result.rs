//! Run result types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ragscope_config::Intent;
use ragscope_module::ModuleOutput;
use serde::{Serialize, Serializer};

/// Lifecycle state of a node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Skipped,
}

impl NodeStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeStatus::Pending => "pending",
      NodeStatus::Running => "running",
      NodeStatus::Completed => "completed",
      NodeStatus::Failed => "failed",
      NodeStatus::Skipped => "skipped",
    }
  }

  /// `true` once the node can no longer change state.
  pub fn is_settled(&self) -> bool {
    matches!(
      self,
      NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
    )
  }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Outcome of a single node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
  pub node_id: String,
  pub module_id: String,
  pub status: NodeStatus,
  /// Module output; empty unless `status` is `Completed`.
  pub output: ModuleOutput,
  /// Present only for `Failed` and `Skipped`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Wall-clock time spent in `execute`; zero for skipped nodes.
  #[serde(rename = "duration_ms", serialize_with = "as_millis")]
  pub duration: Duration,
}

impl NodeResult {
  pub(crate) fn completed(
    node_id: impl Into<String>,
    module_id: impl Into<String>,
    output: ModuleOutput,
    duration: Duration,
  ) -> Self {
    Self {
      node_id: node_id.into(),
      module_id: module_id.into(),
      status: NodeStatus::Completed,
      output,
      error: None,
      duration,
    }
  }

  pub(crate) fn failed(
    node_id: impl Into<String>,
    module_id: impl Into<String>,
    error: impl Into<String>,
    duration: Duration,
  ) -> Self {
    Self {
      node_id: node_id.into(),
      module_id: module_id.into(),
      status: NodeStatus::Failed,
      output: ModuleOutput::new(),
      error: Some(error.into()),
      duration,
    }
  }

  pub(crate) fn skipped(
    node_id: impl Into<String>,
    module_id: impl Into<String>,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      node_id: node_id.into(),
      module_id: module_id.into(),
      status: NodeStatus::Skipped,
      output: ModuleOutput::new(),
      error: Some(reason.into()),
      duration: Duration::ZERO,
    }
  }
}

/// Aggregated result of one `analyze` call.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
  /// Unique id of this run (uuid v4).
  pub run_id: String,
  pub intent: Intent,
  pub query: String,
  pub started_at: DateTime<Utc>,
  /// One entry per template node, in template declaration order.
  pub node_results: Vec<NodeResult>,
  /// `true` iff every node completed.
  pub is_complete: bool,
  #[serde(rename = "total_duration_ms", serialize_with = "as_millis")]
  pub total_duration: Duration,
  /// Output of the terminal node, or terminal outputs keyed by node id when
  /// the template has several terminals.
  pub final_output: ModuleOutput,
}

impl PipelineRun {
  /// Result of `node_id`.
  pub fn node(&self, node_id: &str) -> Option<&NodeResult> {
    self.node_results.iter().find(|r| r.node_id == node_id)
  }

  /// Status of `node_id`.
  pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
    self.node(node_id).map(|r| r.status)
  }

  /// Ids of nodes that ended in `status`, in declaration order.
  pub fn nodes_with_status(&self, status: NodeStatus) -> Vec<&str> {
    self
      .node_results
      .iter()
      .filter(|r| r.status == status)
      .map(|r| r.node_id.as_str())
      .collect()
  }
}
