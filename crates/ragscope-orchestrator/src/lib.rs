//! Ragscope Orchestrator
//!
//! Resolves an analysis request to a pipeline template and executes it:
//!
//! ```text
//! query ──► IntentClassifier ──► Intent ──► TemplateCatalog ──► PipelineTemplate
//!                                                                    │
//!                       ModuleRegistry ◄── Scheduler (ready queue)        
//!                                                                    │
//!                                                              PipelineRun
//! ```
//!
//! Nodes run in dependency order, at most `max_concurrency` at a time. A node
//! whose module is missing is skipped; a module error fails only that node.
//! Either way every descendant is skipped and independent branches keep
//! running. Node-level problems are recorded on the [`PipelineRun`], never
//! returned as errors.

mod classifier;
mod config;
mod error;
mod events;
mod orchestrator;
mod result;
mod task;

pub use classifier::{IntentClassifier, KeywordIntentClassifier};
pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use events::{ChannelNotifier, NoopNotifier, RunEvent, RunNotifier};
pub use orchestrator::{IntentAvailability, Orchestrator};
pub use result::{NodeResult, NodeStatus, PipelineRun};
