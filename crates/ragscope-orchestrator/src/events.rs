//! Run events and notifiers for observability.
//!
//! Events are emitted while a pipeline runs so a presentation layer can stream
//! progress, persist it, or ignore it.

use ragscope_config::Intent;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::result::NodeStatus;

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunEvent {
  /// The template validated and scheduling is about to start.
  PipelineStarted { run_id: String, intent: Intent },

  /// A node has been handed to the runtime.
  NodeStarted {
    run_id: String,
    node_id: String,
    module_id: String,
  },

  /// A node reached `completed`, `failed` or `skipped`.
  NodeSettled {
    run_id: String,
    node_id: String,
    status: NodeStatus,
    error: Option<String>,
  },

  /// Every node has settled.
  PipelineCompleted { run_id: String, is_complete: bool },
}

/// Receives run events.
///
/// The orchestrator calls `notify` for each event; implementations decide what
/// to do with them.
pub trait RunNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls scheduling; volume is a handful
  // of events per node.
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }

  /// A notifier plus the receiving half of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
