use serde::{Deserialize, Serialize};

/// One step of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  /// Unique within the template.
  pub node_id: String,
  /// Human readable label.
  pub name: String,
  /// Identifier of the module this node invokes.
  pub module: String,
  /// Node ids that must settle before this node may start.
  #[serde(default)]
  pub depends_on: Vec<String>,
  /// Static parameters for this node. Per-call parameters take precedence.
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub params: serde_json::Map<String, serde_json::Value>,
}

impl NodeDef {
  /// Node without static params.
  pub fn new(
    node_id: impl Into<String>,
    name: impl Into<String>,
    module: impl Into<String>,
    depends_on: &[&str],
  ) -> Self {
    Self {
      node_id: node_id.into(),
      name: name.into(),
      module: module.into(),
      depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
      params: serde_json::Map::new(),
    }
  }

  /// Attach a static parameter.
  pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.params.insert(key.into(), value);
    self
  }
}
