#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragscope_config::{Intent, NodeDef};
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params,
};
use ragscope_orchestrator::Orchestrator;
use ragscope_pipeline::{Node, PipelineTemplate, TemplateCatalog};
use serde_json::{Value, json};

/// Shared log of module ids in the order `execute` was entered.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
  Arc::new(Mutex::new(Vec::new()))
}

/// What a [`TestModule`] does when executed.
#[derive(Clone)]
pub enum Behavior {
  /// Return the output. `"upstream"` lists the node ids it received.
  Succeed(ModuleOutput),
  Fail(String),
  Sleep(Duration),
  /// Panic inside `execute`.
  Panic(String),
}

pub struct TestModule {
  metadata: ModuleMetadata,
  behavior: Behavior,
  log: CallLog,
}

impl TestModule {
  pub fn new(id: &str, behavior: Behavior, log: &CallLog) -> Arc<dyn AnalysisModule> {
    Arc::new(Self {
      metadata: ModuleMetadata::new(id, id),
      behavior,
      log: log.clone(),
    })
  }

  pub fn ok(id: &str, log: &CallLog) -> Arc<dyn AnalysisModule> {
    Self::new(id, Behavior::Succeed(output(json!({ "node": id }))), log)
  }

  pub fn failing(id: &str, message: &str, log: &CallLog) -> Arc<dyn AnalysisModule> {
    Self::new(id, Behavior::Fail(message.to_string()), log)
  }

  pub fn panicking(id: &str, message: &str, log: &CallLog) -> Arc<dyn AnalysisModule> {
    Self::new(id, Behavior::Panic(message.to_string()), log)
  }

  pub fn sleeping(id: &str, ms: u64, log: &CallLog) -> Arc<dyn AnalysisModule> {
    Self::new(id, Behavior::Sleep(Duration::from_millis(ms)), log)
  }
}

#[async_trait]
impl AnalysisModule for TestModule {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    self.log.lock().unwrap().push(self.metadata.module_id.clone());

    let upstream: Vec<Value> = inputs.iter().map(|u| json!(u.node_id)).collect();
    match &self.behavior {
      Behavior::Succeed(out) => {
        let mut out = out.clone();
        out.insert("upstream".to_string(), Value::Array(upstream));
        out.insert("params".to_string(), Value::Object(params.clone()));
        Ok(out)
      }
      Behavior::Fail(message) => Err(ModuleError::Execution(message.clone())),
      Behavior::Sleep(delay) => {
        tokio::time::sleep(*delay).await;
        Ok(output(json!({ "slept_ms": delay.as_millis() as u64 })))
      }
      Behavior::Panic(message) => panic!("{}", message),
    }
  }
}

/// Tracks how many instances run at once.
pub struct ConcurrencyProbe {
  metadata: ModuleMetadata,
  current: Arc<AtomicUsize>,
  peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
  pub fn new(id: &str, current: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Arc<dyn AnalysisModule> {
    Arc::new(Self {
      metadata: ModuleMetadata::new(id, id),
      current: current.clone(),
      peak: peak.clone(),
    })
  }
}

#[async_trait]
impl AnalysisModule for ConcurrencyProbe {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    _inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(10)).await;
    self.current.fetch_sub(1, Ordering::SeqCst);
    Ok(ModuleOutput::new())
  }
}

pub fn output(value: Value) -> ModuleOutput {
  match value {
    Value::Object(map) => map,
    _ => ModuleOutput::new(),
  }
}

/// Template whose nodes run a module named after the node.
pub fn template(intent: Intent, nodes: &[(&str, &[&str])]) -> PipelineTemplate {
  PipelineTemplate::new(
    intent,
    "test",
    "",
    nodes
      .iter()
      .map(|(id, deps)| Node::from(NodeDef::new(*id, *id, *id, deps)))
      .collect(),
  )
}

pub fn orchestrator(template: PipelineTemplate) -> Orchestrator {
  let mut catalog = TemplateCatalog::new();
  catalog.insert(template);
  Orchestrator::new(catalog)
}
