//! Ragscope Pipeline
//!
//! This crate provides the executable form of an analysis pipeline.
//!
//! Key differences from `ragscope-config`:
//! - Dependencies are indexed both ways (upstream and dependents)
//! - Entry points and terminal nodes are identified
//! - Structure can be validated (unique ids, known dependencies, no cycles)
//! - Templates are grouped by intent in a [`TemplateCatalog`]

mod catalog;
mod error;
mod graph;
mod template;

pub use catalog::TemplateCatalog;
pub use error::TemplateError;
pub use graph::Graph;
pub use template::{Node, PipelineTemplate};
