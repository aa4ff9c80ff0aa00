//! Ragscope Config
//!
//! This crate contains the serializable definition types for ragscope. These
//! types describe analysis pipelines before they are validated and turned into
//! executable templates by `ragscope-pipeline`.
//!
//! Definitions can be loaded from:
//! - the built-in catalog compiled into `ragscope-pipeline`
//! - JSON files (via CLI with `--templates=templates.json`)

mod intent;
mod node;
mod template;

pub use intent::{Intent, ParseIntentError};
pub use node::NodeDef;
pub use template::TemplateDef;
