use std::collections::{BTreeSet, HashSet};

use ragscope_config::{Intent, NodeDef, TemplateDef};
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::graph::Graph;

/// A node of an executable template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub id: String,
  pub name: String,
  pub module: String,
  pub depends_on: Vec<String>,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub params: serde_json::Map<String, serde_json::Value>,
}

impl From<NodeDef> for Node {
  fn from(def: NodeDef) -> Self {
    Self {
      id: def.node_id,
      name: def.name,
      module: def.module,
      depends_on: def.depends_on,
      params: def.params,
    }
  }
}

/// An immutable pipeline bound to one intent.
///
/// Construction does not validate; call [`PipelineTemplate::validate`] (the
/// orchestrator does so before every run).
#[derive(Debug, Clone)]
pub struct PipelineTemplate {
  intent: Intent,
  name: String,
  description: String,
  nodes: Vec<Node>,
  graph: Graph,
}

impl PipelineTemplate {
  pub fn new(
    intent: Intent,
    name: impl Into<String>,
    description: impl Into<String>,
    nodes: Vec<Node>,
  ) -> Self {
    let graph = Graph::new(&nodes);
    Self {
      intent,
      name: name.into(),
      description: description.into(),
      nodes,
      graph,
    }
  }

  pub fn from_def(def: TemplateDef) -> Self {
    Self::new(
      def.intent,
      def.name,
      def.description,
      def.nodes.into_iter().map(Node::from).collect(),
    )
  }

  pub fn intent(&self) -> Intent {
    self.intent
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  /// Nodes in declaration order.
  pub fn nodes(&self) -> &[Node] {
    &self.nodes
  }

  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.iter().find(|n| n.id == node_id)
  }

  /// Every module id named by this template, sorted.
  pub fn module_ids(&self) -> BTreeSet<String> {
    self.nodes.iter().map(|n| n.module.clone()).collect()
  }

  /// Check structure: at least one node, unique ids, known dependencies and
  /// no cycles.
  pub fn validate(&self) -> Result<(), TemplateError> {
    if self.nodes.is_empty() {
      return Err(TemplateError::Empty);
    }

    let mut ids: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
    for node in &self.nodes {
      if !ids.insert(node.id.as_str()) {
        return Err(TemplateError::DuplicateNodeId(node.id.clone()));
      }
    }

    for node in &self.nodes {
      if let Some(dependency) = node.depends_on.iter().find(|d| !ids.contains(d.as_str())) {
        return Err(TemplateError::UnknownDependency {
          node_id: node.id.clone(),
          dependency: dependency.clone(),
        });
      }
    }

    self.graph.topological_order().map(|_| ())
  }

  /// Serializable definition of this template.
  pub fn to_def(&self) -> TemplateDef {
    TemplateDef {
      intent: self.intent,
      name: self.name.clone(),
      description: self.description.clone(),
      nodes: self
        .nodes
        .iter()
        .map(|n| NodeDef {
          node_id: n.id.clone(),
          name: n.name.clone(),
          module: n.module.clone(),
          depends_on: n.depends_on.clone(),
          params: n.params.clone(),
        })
        .collect(),
    }
  }
}
