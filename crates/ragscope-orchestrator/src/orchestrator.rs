//! Pipeline orchestrator.
//!
//! The [`Orchestrator`] owns the module registry, template catalog, intent
//! classifier, scheduling config and run notifier. Each `analyze*` call
//! validates the intent's template, dispatches each node once its dependencies
//! have settled and aggregates a fresh [`PipelineRun`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use ragscope_config::Intent;
use ragscope_module::{AnalysisModule, ModuleInputs, ModuleOutput, ModuleRegistry, Params};
use ragscope_pipeline::{Node, PipelineTemplate, TemplateCatalog};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::classifier::{IntentClassifier, KeywordIntentClassifier};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::{NoopNotifier, RunEvent, RunNotifier};
use crate::result::{NodeResult, NodeStatus, PipelineRun};
use crate::task::{NodeOutcome, NodeTask};

/// Handle for a spawned node task.
type NodeHandle = tokio::task::JoinHandle<(NodeOutcome, Duration)>;

/// Whether an intent can run with the current registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntentAvailability {
  pub available: bool,
  /// Module ids the template names that are not registered, sorted.
  pub missing_modules: Vec<String>,
}

/// Entry point for pipeline execution.
pub struct Orchestrator {
  registry: ModuleRegistry,
  catalog: TemplateCatalog,
  classifier: Option<Box<dyn IntentClassifier>>,
  config: OrchestratorConfig,
  notifier: Arc<dyn RunNotifier>,
}

impl Orchestrator {
  /// An orchestrator over `catalog` with an empty registry, the keyword
  /// classifier and default config.
  pub fn new(catalog: TemplateCatalog) -> Self {
    Self {
      registry: ModuleRegistry::new(),
      catalog,
      classifier: Some(Box::new(KeywordIntentClassifier::default())),
      config: OrchestratorConfig::default(),
      notifier: Arc::new(NoopNotifier),
    }
  }

  /// [`Orchestrator::new`] over [`TemplateCatalog::builtin`].
  pub fn with_builtin_templates() -> Self {
    Self::new(TemplateCatalog::builtin())
  }

  pub fn with_registry(mut self, registry: ModuleRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_classifier(mut self, classifier: impl IntentClassifier + 'static) -> Self {
    self.classifier = Some(Box::new(classifier));
    self
  }

  /// Drop the classifier; `analyze` then always fails with `UnknownIntent`.
  pub fn without_classifier(mut self) -> Self {
    self.classifier = None;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn RunNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Register `module` under its id, replacing any module with the same id.
  pub fn register_module(&mut self, module: Arc<dyn AnalysisModule>) {
    let module_id = module.module_id().to_string();
    if self.registry.register(module).is_some() {
      info!(module_id = %module_id, "module replaced");
    }
  }

  pub fn registry(&self) -> &ModuleRegistry {
    &self.registry
  }

  pub fn catalog(&self) -> &TemplateCatalog {
    &self.catalog
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  /// Parse an intent's wire name.
  pub fn parse_intent(value: &str) -> Result<Intent, OrchestratorError> {
    value
      .parse()
      .map_err(|_| OrchestratorError::UnknownIntent {
        value: value.to_string(),
      })
  }

  /// Map a free-text query to an intent with the configured classifier.
  pub fn classify(&self, query: &str) -> Result<Intent, OrchestratorError> {
    let intent = self
      .classifier
      .as_ref()
      .and_then(|c| c.classify(query))
      .ok_or_else(|| OrchestratorError::UnknownIntent {
        value: query.to_string(),
      })?;
    info!(intent = %intent, "query classified");
    Ok(intent)
  }

  /// Classify `query` and run the matching pipeline, against `run_id` when
  /// given.
  pub async fn analyze(
    &self,
    query: &str,
    run_id: Option<&str>,
  ) -> Result<PipelineRun, OrchestratorError> {
    let intent = self.classify(query)?;
    self.analyze_intent(intent, query, run_id).await
  }

  /// Run the pipeline for `intent`. Without a `run_id` no `run_id` param is
  /// passed, so store-backed nodes fail and their descendants are skipped.
  #[instrument(
    name = "analyze_intent",
    skip_all,
    fields(intent = %intent, evaluation_run = run_id.unwrap_or_default())
  )]
  pub async fn analyze_intent(
    &self,
    intent: Intent,
    query: &str,
    run_id: Option<&str>,
  ) -> Result<PipelineRun, OrchestratorError> {
    let mut params = Params::new();
    if let Some(run_id) = run_id {
      params.insert("run_id".to_string(), Value::String(run_id.to_string()));
    }
    self
      .analyze_with_cancel(intent, query, params, CancellationToken::new())
      .await
  }

  /// Run the pipeline for `intent`.
  ///
  /// `params` are merged over every node's template params (call params win).
  /// Cancelling `cancel` fails in-flight nodes with `run cancelled` and skips
  /// the rest; the call still returns a [`PipelineRun`].
  pub async fn analyze_with_cancel(
    &self,
    intent: Intent,
    query: &str,
    params: Params,
    cancel: CancellationToken,
  ) -> Result<PipelineRun, OrchestratorError> {
    let started = Instant::now();
    let started_at = Utc::now();

    let template = self
      .catalog
      .get(intent)
      .ok_or(OrchestratorError::TemplateNotFound { intent })?;
    template.validate().map_err(|source| {
      error!(intent = %intent, error = %source, "pipeline_rejected");
      OrchestratorError::MalformedTemplate { intent, source }
    })?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let deadline = self.config.run_timeout().map(|limit| started + limit);

    info!(
      run_id = %run_id,
      intent = %intent,
      nodes = template.nodes().len(),
      max_concurrency = self.config.permits(),
      "pipeline_started"
    );
    self.notifier.notify(RunEvent::PipelineStarted {
      run_id: run_id.clone(),
      intent,
    });

    let mut scheduler = Scheduler {
      orchestrator: self,
      template,
      run_id: &run_id,
      params: &params,
      cancel: &cancel,
      deadline,
      settled: HashMap::new(),
    };
    scheduler.run().await;
    let mut settled = scheduler.settled;

    let node_results: Vec<NodeResult> = template
      .nodes()
      .iter()
      .map(|node| {
        settled.remove(&node.id).unwrap_or_else(|| {
          NodeResult::skipped(&node.id, &node.module, "node was never scheduled")
        })
      })
      .collect();

    let is_complete = node_results
      .iter()
      .all(|r| r.status == NodeStatus::Completed);
    let final_output = final_output(template, &node_results);
    let total_duration = started.elapsed();

    info!(
      run_id = %run_id,
      intent = %intent,
      is_complete = is_complete,
      duration_ms = total_duration.as_millis() as u64,
      "pipeline_completed"
    );
    self.notifier.notify(RunEvent::PipelineCompleted {
      run_id: run_id.clone(),
      is_complete,
    });

    Ok(PipelineRun {
      run_id,
      intent,
      query: query.to_string(),
      started_at,
      node_results,
      is_complete,
      total_duration,
      final_output,
    })
  }

  /// Intents whose templates only name registered modules, in catalog order.
  pub fn get_available_intents(&self) -> Vec<Intent> {
    self
      .catalog
      .templates()
      .filter(|t| self.missing_modules(t).is_empty())
      .map(|t| t.intent())
      .collect()
  }

  /// Availability and missing modules for every catalogued intent.
  pub fn intent_availability(&self) -> BTreeMap<Intent, IntentAvailability> {
    self
      .catalog
      .templates()
      .map(|t| {
        let missing_modules = self.missing_modules(t);
        (
          t.intent(),
          IntentAvailability {
            available: missing_modules.is_empty(),
            missing_modules,
          },
        )
      })
      .collect()
  }

  pub fn get_pipeline_template(&self, intent: Intent) -> Option<&PipelineTemplate> {
    self.catalog.get(intent)
  }

  pub fn get_registered_modules(&self) -> BTreeSet<String> {
    self.registry.list_registered_ids()
  }

  fn missing_modules(&self, template: &PipelineTemplate) -> Vec<String> {
    template
      .module_ids()
      .into_iter()
      .filter(|id| !self.registry.contains(id))
      .collect()
  }
}

/// Terminal outputs: the single terminal's output, or a map keyed by terminal
/// node id. Only completed terminals contribute.
fn final_output(template: &PipelineTemplate, results: &[NodeResult]) -> ModuleOutput {
  let completed: Vec<&NodeResult> = template
    .graph()
    .terminals()
    .iter()
    .filter_map(|id| results.iter().find(|r| &r.node_id == id))
    .filter(|r| r.status == NodeStatus::Completed)
    .collect();

  if template.graph().terminals().len() == 1 {
    return completed
      .first()
      .map(|r| r.output.clone())
      .unwrap_or_default();
  }

  let mut merged = ModuleOutput::new();
  for result in completed {
    merged.insert(result.node_id.clone(), Value::Object(result.output.clone()));
  }
  merged
}

/// Result of a spawned node; a task that panicked or was aborted fails.
fn node_result(node: &Node, result: Result<(NodeOutcome, Duration), JoinError>) -> NodeResult {
  match result {
    Ok((NodeOutcome::Completed(output), duration)) => {
      NodeResult::completed(&node.id, &node.module, output, duration)
    }
    Ok((NodeOutcome::Failed(message), duration)) => {
      NodeResult::failed(&node.id, &node.module, message, duration)
    }
    Err(e) => NodeResult::failed(
      &node.id,
      &node.module,
      format!("node task aborted: {}", e),
      Duration::ZERO,
    ),
  }
}

/// State of one run's scheduling loop.
struct Scheduler<'a> {
  orchestrator: &'a Orchestrator,
  template: &'a PipelineTemplate,
  run_id: &'a str,
  params: &'a Params,
  cancel: &'a CancellationToken,
  deadline: Option<Instant>,
  settled: HashMap<String, NodeResult>,
}

impl<'a> Scheduler<'a> {
  /// Dispatch nodes as soon as their dependencies have settled, until every
  /// node has settled. A slow node only holds back its own descendants.
  async fn run(&mut self) {
    let semaphore = Arc::new(Semaphore::new(self.orchestrator.config.permits()));
    let mut in_flight = FuturesUnordered::new();
    let mut started: HashSet<&'a str> = HashSet::new();

    loop {
      for node in self.find_ready_nodes() {
        if !started.insert(node.id.as_str()) {
          continue;
        }
        if let Some(handle) = self.start_node(node, &semaphore).await {
          in_flight.push(handle.map(move |result| (node, result)));
        }
      }

      let Some((node, result)) = in_flight.next().await else {
        break;
      };
      self.settle(node_result(node, result));
    }
  }

  /// Unsettled nodes whose dependencies have all settled, in declaration
  /// order.
  fn find_ready_nodes(&self) -> Vec<&'a Node> {
    let template = self.template;
    let graph = template.graph();
    template
      .nodes()
      .iter()
      .filter(|n| !self.settled.contains_key(&n.id))
      .filter(|n| graph.upstream(&n.id).iter().all(|up| self.settled.contains_key(up)))
      .collect()
  }

  /// Settle `node` without running it, or spawn it. Returns the handle of a
  /// spawned node.
  async fn start_node(&mut self, node: &Node, semaphore: &Arc<Semaphore>) -> Option<NodeHandle> {
    if let Some(reason) = self.blocked_by_upstream(node) {
      self.settle(NodeResult::skipped(&node.id, &node.module, reason));
      return None;
    }

    let Some(module) = self.orchestrator.registry.get(&node.module) else {
      self.settle(NodeResult::skipped(
        &node.id,
        &node.module,
        format!("module not registered: {}", node.module),
      ));
      return None;
    };

    if let Some(reason) = self.stop_reason() {
      self.settle(NodeResult::skipped(&node.id, &node.module, reason));
      return None;
    }

    // Waiting here keeps dispatch in declaration order.
    let permit = match semaphore.clone().acquire_owned().await {
      Ok(permit) => permit,
      Err(e) => {
        self.settle(NodeResult::skipped(&node.id, &node.module, e.to_string()));
        return None;
      }
    };
    if let Some(reason) = self.stop_reason() {
      self.settle(NodeResult::skipped(&node.id, &node.module, reason));
      return None;
    }

    let task = NodeTask {
      run_id: self.run_id.to_string(),
      node_id: node.id.clone(),
      module,
      inputs: self.inputs_for(node),
      params: self.params_for(node),
      node_timeout: self.orchestrator.config.node_timeout(),
      deadline: self.deadline,
      cancel: self.cancel.clone(),
      permit,
    };

    info!(
      run_id = %self.run_id,
      node_id = %node.id,
      module_id = %node.module,
      "node_started"
    );
    self.orchestrator.notifier.notify(RunEvent::NodeStarted {
      run_id: self.run_id.to_string(),
      node_id: node.id.clone(),
      module_id: node.module.clone(),
    });

    Some(tokio::spawn(task.run()))
  }

  /// First dependency that did not complete, as a skip reason.
  fn blocked_by_upstream(&self, node: &Node) -> Option<String> {
    node
      .depends_on
      .iter()
      .find(|dep| {
        self
          .settled
          .get(*dep)
          .is_none_or(|r| r.status != NodeStatus::Completed)
      })
      .map(|dep| format!("upstream node '{}' did not complete", dep))
  }

  fn stop_reason(&self) -> Option<String> {
    if self.cancel.is_cancelled() {
      return Some("run cancelled".to_string());
    }
    if let Some(deadline) = self.deadline
      && Instant::now() >= deadline
    {
      return Some("run deadline exceeded".to_string());
    }
    None
  }

  /// Outputs of `node`'s dependencies, in `depends_on` order.
  fn inputs_for(&self, node: &Node) -> ModuleInputs {
    let mut inputs = ModuleInputs::new();
    for dep in &node.depends_on {
      if let Some(result) = self.settled.get(dep) {
        inputs.insert(dep.clone(), result.module_id.clone(), result.output.clone());
      }
    }
    inputs
  }

  /// Template params with call params layered on top.
  fn params_for(&self, node: &Node) -> Params {
    let mut params = node.params.clone();
    for (key, value) in self.params {
      params.insert(key.clone(), value.clone());
    }
    params
  }

  /// Record `result` and skip every unsettled descendant of a node that did
  /// not complete.
  fn settle(&mut self, result: NodeResult) {
    self.log_settled(&result);

    if result.status != NodeStatus::Completed {
      for descendant in self.template.graph().descendants(&result.node_id) {
        if self.settled.contains_key(&descendant) {
          continue;
        }
        let module_id = self
          .template
          .get_node(&descendant)
          .map(|n| n.module.clone())
          .unwrap_or_default();
        let skipped = NodeResult::skipped(
          descendant.clone(),
          module_id,
          format!("upstream node '{}' did not complete", result.node_id),
        );
        self.log_settled(&skipped);
        self.settled.insert(descendant, skipped);
      }
    }

    self.settled.insert(result.node_id.clone(), result);
  }

  fn log_settled(&self, result: &NodeResult) {
    let error = result.error.as_deref().unwrap_or_default();
    match result.status {
      NodeStatus::Completed => info!(
        run_id = %self.run_id,
        node_id = %result.node_id,
        duration_ms = result.duration.as_millis() as u64,
        "node_completed"
      ),
      NodeStatus::Failed => warn!(
        run_id = %self.run_id,
        node_id = %result.node_id,
        error = %error,
        "node_failed"
      ),
      _ => info!(
        run_id = %self.run_id,
        node_id = %result.node_id,
        reason = %error,
        "node_skipped"
      ),
    }

    self.orchestrator.notifier.notify(RunEvent::NodeSettled {
      run_id: self.run_id.to_string(),
      node_id: result.node_id.clone(),
      status: result.status,
      error: result.error.clone(),
    });
  }
}
