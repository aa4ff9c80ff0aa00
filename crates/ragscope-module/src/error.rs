use thiserror::Error;

/// Errors a module returns from `execute`.
///
/// The orchestrator records the rendered message verbatim on the failed node.
#[derive(Debug, Error)]
pub enum ModuleError {
  /// A required upstream output is absent.
  #[error("missing required input: {0}")]
  MissingInput(String),

  /// An upstream output or parameter has the wrong shape.
  #[error("invalid input '{field}': {message}")]
  InvalidInput { field: String, message: String },

  /// A required parameter was not supplied.
  #[error("missing required parameter: {0}")]
  MissingParam(String),

  /// The injected run store failed.
  #[error("store error: {0}")]
  Store(String),

  /// Any other failure inside the module.
  #[error("{0}")]
  Execution(String),
}

impl ModuleError {
  pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidInput {
      field: field.into(),
      message: message.into(),
    }
  }
}
