//! Ragscope Module
//!
//! The contract every analysis step implements, and the registry the
//! orchestrator resolves modules from.
//!
//! A module is a pure function of `(inputs, params)`: it reads the outputs of
//! its upstream nodes through [`ModuleInputs`], never the orchestrator or other
//! modules. Collaborators a module needs (a run store, an embedder) are handed
//! to it at construction time.

mod error;
mod inputs;
mod metadata;
mod module;
mod params;
mod registry;

pub use error::ModuleError;
pub use inputs::{ModuleInputs, UpstreamOutput};
pub use metadata::ModuleMetadata;
pub use module::{AnalysisModule, ModuleOutput, Params};
pub use params::{param_f64, param_str, param_u64};
pub use registry::ModuleRegistry;
