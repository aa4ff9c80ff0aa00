use serde::{Deserialize, Serialize};

/// Static capability description of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
  /// Registry key.
  pub module_id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Semantic tags of the data the module expects.
  #[serde(default)]
  pub input_types: Vec<String>,
  /// Semantic tags of the data the module produces.
  #[serde(default)]
  pub output_types: Vec<String>,
  /// Module ids whose output this module reads. Documentation only; node
  /// dependencies come from the template.
  #[serde(default)]
  pub requires: Vec<String>,
}

impl ModuleMetadata {
  pub fn new(module_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      module_id: module_id.into(),
      name: name.into(),
      description: String::new(),
      input_types: Vec::new(),
      output_types: Vec::new(),
      requires: Vec::new(),
    }
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn inputs(mut self, tags: &[&str]) -> Self {
    self.input_types = tags.iter().map(|t| t.to_string()).collect();
    self
  }

  pub fn outputs(mut self, tags: &[&str]) -> Self {
    self.output_types = tags.iter().map(|t| t.to_string()).collect();
    self
  }

  pub fn requires(mut self, module_ids: &[&str]) -> Self {
    self.requires = module_ids.iter().map(|m| m.to_string()).collect();
    self
  }
}
