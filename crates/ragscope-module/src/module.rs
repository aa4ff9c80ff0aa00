use async_trait::async_trait;

use crate::error::ModuleError;
use crate::inputs::ModuleInputs;
use crate::metadata::ModuleMetadata;

/// Output of one module execution. Keys are sorted, so serialization is
/// byte-stable.
pub type ModuleOutput = serde_json::Map<String, serde_json::Value>;

/// Parameters passed to `execute`: the node's static params overlaid with the
/// per-call params (`query`, `run_id`, ...).
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A unit of analysis.
///
/// Implementations must be referentially transparent in `(inputs, params)`,
/// apart from collaborators injected at construction. `execute` may await
/// I/O; the orchestrator never holds a lock across the call.
#[async_trait]
pub trait AnalysisModule: Send + Sync {
  /// Static capability metadata.
  fn metadata(&self) -> &ModuleMetadata;

  /// Registry key, taken from the metadata.
  fn module_id(&self) -> &str {
    &self.metadata().module_id
  }

  /// Transform upstream outputs into this module's output.
  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError>;
}
