use std::collections::{HashMap, VecDeque};

use crate::error::TemplateError;
use crate::template::Node;

/// Dependency graph over a template's nodes.
///
/// Every list is kept in template declaration order so traversals are
/// reproducible.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Node ids in declaration order.
  order: Vec<String>,
  /// Reverse adjacency: node_id -> dependents (downstream node ids).
  dependents: HashMap<String, Vec<String>>,
  /// Adjacency: node_id -> upstream node ids that exist in the template.
  upstream: HashMap<String, Vec<String>>,
  /// Nodes with no dependencies.
  entry_points: Vec<String>,
  /// Nodes nothing depends on.
  terminals: Vec<String>,
}

impl Graph {
  /// Build a graph from nodes. Dependencies on unknown nodes are left out;
  /// [`Graph::check`] reports them.
  pub fn new(nodes: &[Node]) -> Self {
    let order: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();

    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut upstream: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all nodes
    for node_id in &order {
      dependents.entry(node_id.clone()).or_default();
      upstream.entry(node_id.clone()).or_default();
    }

    // Build adjacency lists
    for node in nodes {
      for dep in &node.depends_on {
        if !dependents.contains_key(dep) {
          continue;
        }
        let ups = upstream.entry(node.id.clone()).or_default();
        if ups.contains(dep) {
          continue;
        }
        ups.push(dep.clone());
        dependents
          .entry(dep.clone())
          .or_default()
          .push(node.id.clone());
      }
    }

    let entry_points = order
      .iter()
      .filter(|id| upstream.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let terminals = order
      .iter()
      .filter(|id| dependents.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    Self {
      order,
      dependents,
      upstream,
      entry_points,
      terminals,
    }
  }

  /// Node ids in declaration order.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  /// Get entry points (nodes with no dependencies).
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Get terminal nodes (nodes with no dependents).
  pub fn terminals(&self) -> &[String] {
    &self.terminals
  }

  /// Get the nodes that depend on `node_id`.
  pub fn dependents(&self, node_id: &str) -> &[String] {
    self
      .dependents
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get the nodes `node_id` depends on.
  pub fn upstream(&self, node_id: &str) -> &[String] {
    self
      .upstream
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every node reachable downstream of `node_id`, breadth-first, excluding
  /// `node_id` itself.
  pub fn descendants(&self, node_id: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut queue: VecDeque<&str> = self.dependents(node_id).iter().map(|s| s.as_str()).collect();

    while let Some(next) = queue.pop_front() {
      if next == node_id || seen.iter().any(|s| s == next) {
        continue;
      }
      seen.push(next.to_string());
      queue.extend(self.dependents(next).iter().map(|s| s.as_str()));
    }

    seen
  }

  /// Kahn's algorithm. Ties are broken by declaration order.
  pub fn topological_order(&self) -> Result<Vec<String>, TemplateError> {
    let mut in_degree: HashMap<&str, usize> = self
      .order
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();

    let mut ready: VecDeque<&str> = self.entry_points.iter().map(|s| s.as_str()).collect();
    let mut sorted = Vec::with_capacity(self.order.len());

    while let Some(node_id) = ready.pop_front() {
      sorted.push(node_id.to_string());
      for dependent in self.dependents(node_id) {
        if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            ready.push_back(dependent.as_str());
          }
        }
      }
    }

    if sorted.len() != self.order.len() {
      let nodes = self
        .order
        .iter()
        .filter(|id| !sorted.contains(id))
        .cloned()
        .collect();
      return Err(TemplateError::CycleDetected { nodes });
    }

    Ok(sorted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node(id: &str, deps: &[&str]) -> Node {
    Node {
      id: id.to_string(),
      name: id.to_string(),
      module: id.to_string(),
      depends_on: deps.iter().map(|d| d.to_string()).collect(),
      params: serde_json::Map::new(),
    }
  }

  #[test]
  fn test_entry_points_and_terminals() {
    let nodes = vec![
      node("load", &[]),
      node("a", &["load"]),
      node("b", &["load"]),
      node("report", &["a"]),
    ];
    let graph = Graph::new(&nodes);

    assert_eq!(graph.entry_points(), &["load".to_string()]);
    assert_eq!(graph.terminals(), &["b".to_string(), "report".to_string()]);
    assert_eq!(graph.dependents("load"), &["a".to_string(), "b".to_string()]);
    assert_eq!(graph.upstream("report"), &["a".to_string()]);
  }

  #[test]
  fn test_descendants_are_transitive() {
    let nodes = vec![
      node("load", &[]),
      node("a", &["load"]),
      node("b", &["a"]),
      node("c", &["a", "b"]),
      node("side", &["load"]),
    ];
    let graph = Graph::new(&nodes);

    assert_eq!(graph.descendants("a"), vec!["b", "c"]);
    assert!(graph.descendants("side").is_empty());
  }

  #[test]
  fn test_topological_order_uses_declaration_tie_break() {
    let nodes = vec![
      node("z", &[]),
      node("a", &[]),
      node("join", &["a", "z"]),
    ];
    let graph = Graph::new(&nodes);
    assert_eq!(graph.topological_order().unwrap(), vec!["z", "a", "join"]);
  }

  #[test]
  fn test_cycle_is_reported() {
    let nodes = vec![node("root", &[]), node("a", &["b"]), node("b", &["a"])];
    let graph = Graph::new(&nodes);

    assert_eq!(
      graph.topological_order(),
      Err(TemplateError::CycleDetected {
        nodes: vec!["a".to_string(), "b".to_string()]
      })
    );
  }

  #[test]
  fn test_duplicate_dependency_counts_once() {
    let nodes = vec![node("load", &[]), node("a", &["load", "load"])];
    let graph = Graph::new(&nodes);
    assert_eq!(graph.upstream("a").len(), 1);
    assert_eq!(graph.topological_order().unwrap(), vec!["load", "a"]);
  }
}
