use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::node::NodeDef;

/// Serializable definition of the pipeline that serves one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
  pub intent: Intent,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Declaration order is the scheduling tie-break order.
  pub nodes: Vec<NodeDef>,
}
