//! Upstream outputs handed to a module.

use crate::module::ModuleOutput;

/// Output of one settled upstream node.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamOutput {
  pub node_id: String,
  pub module_id: String,
  pub output: ModuleOutput,
}

/// Outputs of a node's dependencies, in `depends_on` order.
///
/// Lookup is by node id. A module id works as an alias only while exactly one
/// upstream node runs that module; otherwise the alias resolves to nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleInputs {
  entries: Vec<UpstreamOutput>,
}

impl ModuleInputs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add an upstream output. A repeated node id replaces the earlier entry.
  pub fn insert(
    &mut self,
    node_id: impl Into<String>,
    module_id: impl Into<String>,
    output: ModuleOutput,
  ) {
    let node_id = node_id.into();
    let module_id = module_id.into();
    self.entries.retain(|e| e.node_id != node_id);
    self.entries.push(UpstreamOutput {
      node_id,
      module_id,
      output,
    });
  }

  /// Builder form of [`ModuleInputs::insert`].
  pub fn with(
    mut self,
    node_id: impl Into<String>,
    module_id: impl Into<String>,
    output: ModuleOutput,
  ) -> Self {
    self.insert(node_id, module_id, output);
    self
  }

  /// Output of the upstream node `node_id`.
  pub fn get(&self, node_id: &str) -> Option<&ModuleOutput> {
    self
      .entries
      .iter()
      .find(|e| e.node_id == node_id)
      .map(|e| &e.output)
  }

  /// Output of the single upstream node running `module_id`.
  pub fn by_module(&self, module_id: &str) -> Option<&ModuleOutput> {
    let mut matches = self.entries.iter().filter(|e| e.module_id == module_id);
    match (matches.next(), matches.next()) {
      (Some(only), None) => Some(&only.output),
      _ => None,
    }
  }

  /// Node id lookup first, then the module id alias.
  pub fn find(&self, key: &str) -> Option<&ModuleOutput> {
    self.get(key).or_else(|| self.by_module(key))
  }

  /// First upstream output (in `depends_on` order) containing `field`.
  pub fn first_with(&self, field: &str) -> Option<&ModuleOutput> {
    self
      .entries
      .iter()
      .map(|e| &e.output)
      .find(|o| o.contains_key(field))
  }

  pub fn iter(&self) -> impl Iterator<Item = &UpstreamOutput> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
