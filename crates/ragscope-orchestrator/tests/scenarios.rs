//! End-to-end runs of the built-in templates over the built-in modules.

mod common;

use std::sync::Arc;

use common::{Behavior, TestModule, call_log, output};
use ragscope_config::Intent;
use ragscope_module::{ModuleRegistry, Params};
use ragscope_modules::{DataLoader, register_builtin};
use ragscope_orchestrator::{NodeStatus, Orchestrator, OrchestratorConfig};
use ragscope_store::{EvaluationRun, MemoryStore, MetricScore, RunStore, TestCaseResult};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn case(id: &str, question: &str, contexts: &[&str], scores: &[(&str, f64)]) -> TestCaseResult {
  TestCaseResult {
    test_case_id: id.to_string(),
    question: question.to_string(),
    answer: format!("The answer to: {}", question),
    contexts: contexts.iter().map(|c| c.to_string()).collect(),
    ground_truth: Some(format!("ground truth for {}", id)),
    metrics: scores
      .iter()
      .map(|(name, score)| MetricScore::new(*name, *score, 0.7))
      .collect(),
  }
}

fn evaluation_run(run_id: &str, shift: f64) -> EvaluationRun {
  EvaluationRun {
    run_id: run_id.to_string(),
    dataset_name: "insurance-qa".to_string(),
    model_name: "model-a".to_string(),
    created_at: None,
    results: vec![
      case(
        "tc-1",
        "What is the premium payment period?",
        &["The premium payment period is 20 years."],
        &[("faithfulness", 0.9), ("answer_relevancy", 0.85 + shift)],
      ),
      case(
        "tc-2",
        "Why was the claim denied?",
        &["Claims are denied when documents are missing."],
        &[("faithfulness", 0.4 + shift), ("answer_relevancy", 0.5)],
      ),
      case(
        "tc-3",
        "보험료는 언제 납부하나요?",
        &["보험료는 매월 25일에 납부합니다."],
        &[("faithfulness", 0.75), ("answer_relevancy", 0.8)],
      ),
      case(
        "tc-4",
        "How do I cancel the policy?",
        &[],
        &[("faithfulness", 0.3), ("answer_relevancy", 0.6)],
      ),
    ],
  }
}

fn store() -> Arc<dyn RunStore> {
  Arc::new(
    MemoryStore::from_runs(vec![evaluation_run("run-1", 0.0), evaluation_run("run-2", 0.1)])
      .unwrap(),
  )
}

fn full_orchestrator() -> Orchestrator {
  let mut registry = ModuleRegistry::new();
  register_builtin(&mut registry, store());
  Orchestrator::with_builtin_templates().with_registry(registry)
}

#[tokio::test]
async fn test_every_builtin_intent_completes() {
  let orch = full_orchestrator();
  assert_eq!(orch.get_available_intents().len(), Intent::ALL.len());

  for intent in Intent::ALL {
    let mut params = Params::new();
    params.insert("run_id".to_string(), json!("run-1"));
    params.insert("compare_run_id".to_string(), json!("run-2"));

    let run = orch
      .analyze_with_cancel(intent, "q", params, CancellationToken::new())
      .await
      .unwrap();

    let failures: Vec<_> = run
      .node_results
      .iter()
      .filter(|r| r.status != NodeStatus::Completed)
      .map(|r| (r.node_id.clone(), r.error.clone()))
      .collect();
    assert!(run.is_complete, "{}: {:?}", intent, failures);
    assert!(run.final_output["report"].is_string(), "{}", intent);
  }
}

#[tokio::test]
async fn test_only_data_loader_registered() {
  let mut orch = Orchestrator::with_builtin_templates();
  orch.register_module(Arc::new(DataLoader::new(store())));

  let run = orch
    .analyze_intent(Intent::VerifyMorpheme, "verify morphemes", Some("run-1"))
    .await
    .unwrap();

  assert!(!run.is_complete);
  assert_eq!(run.status("load_data"), Some(NodeStatus::Completed));
  let analyzer = run.node("morpheme_analyzer").unwrap();
  assert_eq!(analyzer.status, NodeStatus::Skipped);
  assert!(analyzer.error.as_deref().unwrap().contains("module not registered"));
  assert_eq!(run.status("morpheme_quality_check"), Some(NodeStatus::Skipped));
  assert_eq!(run.status("verification_report"), Some(NodeStatus::Skipped));
  assert!(run.final_output.is_empty());
}

#[tokio::test]
async fn test_missing_run_fails_loader_and_skips_rest() {
  let orch = full_orchestrator();
  let run = orch
    .analyze_intent(Intent::GenerateSummary, "summary", Some("no-such-run"))
    .await
    .unwrap();

  let loader = run.node("load_data").unwrap();
  assert_eq!(loader.status, NodeStatus::Failed);
  assert_eq!(loader.error.as_deref(), Some("store error: run not found: no-such-run"));
  assert_eq!(
    run.nodes_with_status(NodeStatus::Skipped),
    vec!["statistics", "summary_report"]
  );
}

#[tokio::test]
async fn test_run_without_run_id_fails_loader() {
  let orch = full_orchestrator();

  for run in [
    orch.analyze_intent(Intent::GenerateSummary, "summary", None).await.unwrap(),
    orch.analyze("give me a summary", None).await.unwrap(),
  ] {
    assert!(!run.is_complete);
    let loader = run.node("load_data").unwrap();
    assert_eq!(loader.status, NodeStatus::Failed);
    assert_eq!(loader.error.as_deref(), Some("missing required parameter: run_id"));
    assert_eq!(
      run.nodes_with_status(NodeStatus::Skipped),
      vec!["statistics", "summary_report"]
    );
  }
}

async fn compare_search_methods(bm25: f64, embedding: f64) -> ragscope_orchestrator::PipelineRun {
  let log = call_log();
  let mut orch = full_orchestrator();
  orch.register_module(TestModule::new(
    "bm25_searcher",
    Behavior::Succeed(output(json!({ "score": bm25, "method": "bm25" }))),
    &log,
  ));
  orch.register_module(TestModule::new(
    "embedding_searcher",
    Behavior::Succeed(output(json!({ "score": embedding, "method": "embedding" }))),
    &log,
  ));

  orch
    .analyze_intent(Intent::CompareSearchMethods, "compare bm25 and hybrid", Some("run-1"))
    .await
    .unwrap()
}

#[tokio::test]
async fn test_search_comparison_picks_weighted_hybrid() {
  let run = compare_search_methods(0.6, 0.8).await;

  assert!(run.is_complete);
  assert_eq!(run.node("rrf_hybrid").unwrap().output["score"], 0.7);
  assert_eq!(run.node("weighted_hybrid").unwrap().output["score"], 0.72);
  assert_eq!(run.node("search_comparator").unwrap().output["winner"], "weighted_hybrid");
  assert_eq!(run.final_output["summary"]["winner"], "weighted_hybrid");
}

#[tokio::test]
async fn test_search_comparison_tie_goes_to_rrf() {
  let run = compare_search_methods(0.5, 0.5).await;
  assert_eq!(run.node("search_comparator").unwrap().output["winner"], "rrf_hybrid");
}

#[tokio::test]
async fn test_final_output_is_byte_identical_across_runs() {
  let sequential = full_orchestrator().with_config(OrchestratorConfig::sequential());
  let parallel = full_orchestrator().with_config(OrchestratorConfig::default().with_max_concurrency(8));

  for intent in [Intent::GenerateDetailed, Intent::CompareSearchMethods, Intent::AnalyzePatterns] {
    let a = sequential.analyze_intent(intent, "q", Some("run-1")).await.unwrap();
    let b = parallel.analyze_intent(intent, "q", Some("run-1")).await.unwrap();
    let c = parallel.analyze_intent(intent, "q", Some("run-1")).await.unwrap();

    let a = serde_json::to_string(&a.final_output).unwrap();
    assert_eq!(a, serde_json::to_string(&b.final_output).unwrap());
    assert_eq!(a, serde_json::to_string(&c.final_output).unwrap());
  }
}

#[tokio::test]
async fn test_compare_runs_reports_improvement() {
  let orch = full_orchestrator();
  let mut params = Params::new();
  params.insert("run_ids".to_string(), json!(["run-1", "run-2"]));

  let run = orch
    .analyze_with_cancel(Intent::CompareRuns, "compare runs", params, CancellationToken::new())
    .await
    .unwrap();

  assert!(run.is_complete);
  let deltas = &run.node("run_comparator").unwrap().output["metric_deltas"];
  assert_eq!(deltas["faithfulness"]["delta"], 0.025);
  assert_eq!(run.final_output["summary"]["kind"], "runs");
  assert_eq!(run.final_output["summary"]["improved_count"], 2);
}

#[tokio::test]
async fn test_pipeline_run_serializes() {
  let orch = full_orchestrator();
  let run = orch.analyze("summarize run-1", Some("run-1")).await.unwrap();
  let value = serde_json::to_value(&run).unwrap();

  assert_eq!(value["intent"], "GENERATE_SUMMARY");
  assert_eq!(value["is_complete"], true);
  assert_eq!(value["node_results"][0]["node_id"], "load_data");
  assert_eq!(value["node_results"][0]["status"], "completed");
  assert!(value["total_duration_ms"].is_number());
}
