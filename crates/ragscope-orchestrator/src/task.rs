//! Execution of a single node.

use std::sync::Arc;
use std::time::Duration;

use ragscope_module::{AnalysisModule, ModuleInputs, ModuleOutput, Params};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// How a started node ended.
#[derive(Debug)]
pub(crate) enum NodeOutcome {
  Completed(ModuleOutput),
  Failed(String),
}

/// Everything a spawned node needs; assembled before spawn from settled
/// upstream outputs.
pub(crate) struct NodeTask {
  pub run_id: String,
  pub node_id: String,
  pub module: Arc<dyn AnalysisModule>,
  pub inputs: ModuleInputs,
  pub params: Params,
  pub node_timeout: Option<Duration>,
  pub deadline: Option<Instant>,
  pub cancel: CancellationToken,
  pub permit: OwnedSemaphorePermit,
}

impl NodeTask {
  /// Run the module, racing it against the node timeout, the run deadline and
  /// cancellation. Returns the outcome and the wall-clock time of `execute`.
  #[instrument(
    name = "node_execute",
    skip(self),
    fields(
      run_id = %self.run_id,
      node_id = %self.node_id,
      module_id = %self.module.module_id(),
    )
  )]
  pub(crate) async fn run(self) -> (NodeOutcome, Duration) {
    let NodeTask {
      module,
      inputs,
      params,
      node_timeout,
      deadline,
      cancel,
      permit,
      ..
    } = self;

    let started = Instant::now();

    let node_timer = async {
      match node_timeout {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
      }
    };
    let run_timer = async {
      match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
      }
    };

    let outcome = tokio::select! {
      biased;
      result = module.execute(&inputs, &params) => match result {
        Ok(output) => NodeOutcome::Completed(output),
        Err(e) => NodeOutcome::Failed(e.to_string()),
      },
      _ = cancel.cancelled() => NodeOutcome::Failed("run cancelled".to_string()),
      _ = run_timer => NodeOutcome::Failed("run deadline exceeded".to_string()),
      _ = node_timer => NodeOutcome::Failed(format!(
        "node timed out after {}ms",
        node_timeout.map_or(0, |d| d.as_millis())
      )),
    };
    let elapsed = started.elapsed();
    drop(permit);

    match &outcome {
      NodeOutcome::Completed(_) => {
        info!(duration_ms = elapsed.as_millis() as u64, "node execute finished");
      }
      NodeOutcome::Failed(error) => {
        warn!(error = %error, duration_ms = elapsed.as_millis() as u64, "node execute failed");
      }
    }

    (outcome, elapsed)
  }
}
