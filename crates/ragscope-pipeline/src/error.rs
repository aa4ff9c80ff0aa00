use thiserror::Error;

/// Structural problems in a pipeline template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
  #[error("template has no nodes")]
  Empty,

  #[error("duplicate node id: {0}")]
  DuplicateNodeId(String),

  #[error("node '{node_id}' depends on unknown node '{dependency}'")]
  UnknownDependency { node_id: String, dependency: String },

  #[error("cycle detected between nodes: {}", nodes.join(", "))]
  CycleDetected { nodes: Vec<String> },

  #[error("invalid template definition: {0}")]
  InvalidDefinition(String),
}
