use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::metadata::ModuleMetadata;
use crate::module::AnalysisModule;

/// Runtime table of modules keyed by module id.
///
/// Populated by the embedding application before any pipeline runs.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
  modules: HashMap<String, Arc<dyn AnalysisModule>>,
}

impl ModuleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a module under its id. Re-registering an id replaces the
  /// previous module, which is returned.
  pub fn register(&mut self, module: Arc<dyn AnalysisModule>) -> Option<Arc<dyn AnalysisModule>> {
    self.modules.insert(module.module_id().to_string(), module)
  }

  /// Look up a module. Absence is not an error: templates may name modules
  /// that a deployment does not provide.
  pub fn get(&self, module_id: &str) -> Option<Arc<dyn AnalysisModule>> {
    self.modules.get(module_id).cloned()
  }

  pub fn contains(&self, module_id: &str) -> bool {
    self.modules.contains_key(module_id)
  }

  pub fn metadata(&self, module_id: &str) -> Option<&ModuleMetadata> {
    self.modules.get(module_id).map(|m| m.metadata())
  }

  /// Registered module ids, sorted.
  pub fn list_registered_ids(&self) -> BTreeSet<String> {
    self.modules.keys().cloned().collect()
  }

  /// Metadata of every registered module, sorted by id.
  pub fn list_metadata(&self) -> Vec<ModuleMetadata> {
    let mut all: Vec<ModuleMetadata> = self.modules.values().map(|m| m.metadata().clone()).collect();
    all.sort_by(|a, b| a.module_id.cmp(&b.module_id));
    all
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }
}

impl std::fmt::Debug for ModuleRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModuleRegistry")
      .field("modules", &self.list_registered_ids())
      .finish()
  }
}
