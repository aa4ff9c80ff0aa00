//! Orchestrator error types.

use ragscope_config::Intent;
use ragscope_pipeline::TemplateError;

/// Errors that abort a call before any node runs.
///
/// Node-level problems (missing module, module error, timeout, cancellation)
/// never surface here; they are recorded on the node's result.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  /// The template for `intent` failed structural validation.
  #[error("malformed template for {intent}: {source}")]
  MalformedTemplate {
    intent: Intent,
    #[source]
    source: TemplateError,
  },

  /// The query or string could not be resolved to a supported intent.
  #[error("unknown intent: {value}")]
  UnknownIntent { value: String },

  /// The catalog has no template for `intent`.
  #[error("no pipeline template for {intent}")]
  TemplateNotFound { intent: Intent },
}
