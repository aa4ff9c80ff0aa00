//! Failure diagnostics: low performers, root causes and run-to-run deltas.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params, param_f64,
  param_u64,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::statistics::MetricStatistics;
use crate::util::{mean, object, optional_upstream_field, ratio, round4, upstream_cases, upstream_field};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FailedMetric {
  name: String,
  score: f64,
  threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LowPerformer {
  test_case_id: String,
  question: String,
  context_count: usize,
  failed_metrics: Vec<FailedMetric>,
  worst_score: f64,
}

/// Cases with at least one metric below its threshold.
///
/// Reads `cases`. Metrics without a threshold use `default_threshold` (0.7).
/// Emits `low_performers` (worst first, at most `max_cases`, default 20),
/// `count` (before truncation), `total_cases`, `failure_rate` and
/// `metric_failure_counts`.
pub struct LowPerformerExtractor {
  metadata: ModuleMetadata,
}

impl LowPerformerExtractor {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("low_performer_extractor", "Low performer extractor")
        .description("Collects test cases that fall below metric thresholds")
        .inputs(&["cases"])
        .outputs(&["low_performers", "metric_failure_counts"])
        .requires(&["data_loader"]),
    }
  }
}

impl Default for LowPerformerExtractor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for LowPerformerExtractor {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let cases = upstream_cases(inputs)?;
    let default_threshold = param_f64(params, "default_threshold", 0.7)?;
    let max_cases = param_u64(params, "max_cases", 20)? as usize;

    let mut failure_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut low = Vec::new();

    for case in &cases {
      let failed: Vec<FailedMetric> = case
        .metrics
        .iter()
        .filter_map(|m| {
          let threshold = m.threshold.unwrap_or(default_threshold);
          (m.score < threshold).then(|| FailedMetric {
            name: m.name.clone(),
            score: m.score,
            threshold,
          })
        })
        .collect();

      if failed.is_empty() {
        continue;
      }
      for metric in &failed {
        *failure_counts.entry(metric.name.clone()).or_default() += 1;
      }

      let worst_score = failed.iter().map(|m| m.score).fold(f64::INFINITY, f64::min);
      low.push(LowPerformer {
        test_case_id: case.test_case_id.clone(),
        question: case.question.clone(),
        context_count: case.contexts.len(),
        failed_metrics: failed,
        worst_score,
      });
    }

    low.sort_by(|a, b| {
      a.worst_score
        .total_cmp(&b.worst_score)
        .then_with(|| a.test_case_id.cmp(&b.test_case_id))
    });
    let count = low.len();
    low.truncate(max_cases);

    Ok(object(json!({
      "low_performers": low,
      "count": count,
      "total_cases": cases.len(),
      "failure_rate": round4(ratio(count, cases.len())),
      "metric_failure_counts": failure_counts,
    })))
  }
}

/// Known failure explanation for a metric: `(cause, recommendation)`.
fn playbook(metric: &str) -> (&'static str, &'static str) {
  match metric {
    "faithfulness" => (
      "answers contain claims not supported by the retrieved contexts",
      "tighten grounding instructions and require answers to cite contexts",
    ),
    "answer_relevancy" => (
      "answers drift away from what the question asks",
      "restate the question in the prompt and penalize off-topic content",
    ),
    "context_precision" => (
      "retrieval returns contexts unrelated to the question",
      "add a reranking step or reduce the number of retrieved contexts",
    ),
    "context_recall" => (
      "retrieval misses information needed for the answer",
      "revisit chunking and consider hybrid search",
    ),
    "answer_correctness" => (
      "answers disagree with the ground truth",
      "inspect failing cases against their ground truth",
    ),
    _ => (
      "metric falls below its threshold",
      "inspect the failing cases for this metric",
    ),
  }
}

fn severity(failure_rate: f64) -> &'static str {
  if failure_rate >= 0.5 {
    "high"
  } else if failure_rate >= 0.2 {
    "medium"
  } else {
    "low"
  }
}

/// Maps failing metrics to likely causes.
///
/// Reads `metric_failure_counts` and `total_cases` from the low performer
/// extractor and, when present, `statistics` for per-metric means. Emits
/// `root_causes` (most failures first, then metric name) and `primary_cause`.
pub struct RootCauseAnalyzer {
  metadata: ModuleMetadata,
}

impl RootCauseAnalyzer {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("root_cause_analyzer", "Root cause analyzer")
        .description("Explains metric failures with known causes")
        .inputs(&["metric_failure_counts", "statistics"])
        .outputs(&["root_causes", "primary_cause"])
        .requires(&["low_performer_extractor", "statistical_analyzer"]),
    }
  }
}

impl Default for RootCauseAnalyzer {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for RootCauseAnalyzer {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let failures: BTreeMap<String, usize> = upstream_field(inputs, "metric_failure_counts")?;
    let total_cases: usize = upstream_field(inputs, "total_cases")?;
    let statistics: BTreeMap<String, MetricStatistics> =
      optional_upstream_field(inputs, "statistics")?.unwrap_or_default();

    let mut ranked: Vec<(&String, &usize)> = failures.iter().filter(|(_, n)| **n > 0).collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let root_causes: Vec<Value> = ranked
      .into_iter()
      .map(|(metric, count)| {
        let (cause, recommendation) = playbook(metric);
        let failure_rate = round4(ratio(*count, total_cases));
        json!({
          "metric": metric,
          "failure_count": count,
          "failure_rate": failure_rate,
          "mean_score": statistics.get(metric).map(|s| s.mean),
          "severity": severity(failure_rate),
          "cause": cause,
          "recommendation": recommendation,
        })
      })
      .collect();

    let primary_cause = root_causes.first().cloned().unwrap_or(Value::Null);

    Ok(object(json!({
      "root_causes": root_causes,
      "primary_cause": primary_cause,
      "total_cases": total_cases,
    })))
  }
}

#[derive(Debug, Clone, Deserialize)]
struct RunSummary {
  run_id: String,
  #[serde(default)]
  metrics: BTreeMap<String, Vec<f64>>,
}

impl RunSummary {
  fn means(&self) -> BTreeMap<&str, f64> {
    self
      .metrics
      .iter()
      .filter(|(_, scores)| !scores.is_empty())
      .map(|(name, scores)| (name.as_str(), mean(scores)))
      .collect()
  }
}

fn compare(baseline: &RunSummary, candidate: &RunSummary) -> Value {
  let base = baseline.means();
  let cand = candidate.means();

  let mut deltas = serde_json::Map::new();
  let mut improved = Vec::new();
  let mut regressed = Vec::new();
  let mut missing = Vec::new();

  for name in base.keys().chain(cand.keys()).collect::<std::collections::BTreeSet<_>>() {
    let (Some(b), Some(c)) = (base.get(name), cand.get(name)) else {
      missing.push(name.to_string());
      continue;
    };
    let delta = round4(c - b);
    let change = if delta > 0.0 {
      improved.push(name.to_string());
      "improved"
    } else if delta < 0.0 {
      regressed.push(name.to_string());
      "regressed"
    } else {
      "unchanged"
    };
    deltas.insert(
      name.to_string(),
      json!({
        "baseline_mean": round4(*b),
        "candidate_mean": round4(*c),
        "delta": delta,
        "change": change,
      }),
    );
  }

  json!({
    "baseline": baseline.run_id,
    "candidate": candidate.run_id,
    "metric_deltas": deltas,
    "improved": improved,
    "regressed": regressed,
    "missing_metrics": missing,
  })
}

/// Per-metric mean deltas between a baseline run and later runs.
///
/// Reads `runs` (first entry is the baseline). Emits `baseline`, one entry in
/// `comparisons` per later run, and the first comparison's `candidate`,
/// `metric_deltas`, `improved` and `regressed` at the top level.
pub struct RunComparator {
  metadata: ModuleMetadata,
}

impl RunComparator {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("run_comparator", "Run comparator")
        .description("Compares metric means across evaluation runs")
        .inputs(&["runs"])
        .outputs(&["metric_deltas", "improved", "regressed"])
        .requires(&["run_loader"]),
    }
  }
}

impl Default for RunComparator {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for RunComparator {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let runs: Vec<RunSummary> = upstream_field(inputs, "runs")?;
    let Some((baseline, candidates)) = runs.split_first() else {
      return Err(ModuleError::invalid("runs", "no runs to compare"));
    };
    if candidates.is_empty() {
      return Err(ModuleError::invalid("runs", "at least two runs are required"));
    }

    let comparisons: Vec<Value> = candidates.iter().map(|c| compare(baseline, c)).collect();

    let mut out = object(comparisons[0].clone());
    out.insert("comparisons".to_string(), Value::Array(comparisons));
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::fixtures::{loaded, sample_run, single};

  async fn extract(params: Params) -> ModuleOutput {
    LowPerformerExtractor::new()
      .execute(&loaded(&sample_run()), &params)
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_low_performers_sorted_worst_first() {
    let out = extract(Params::new()).await;

    // tc-2 fails both metrics, tc-3 fails faithfulness only.
    assert_eq!(out["count"], 2);
    assert_eq!(out["total_cases"], 3);
    assert_eq!(out["failure_rate"], 0.6667);
    assert_eq!(out["low_performers"][0]["test_case_id"], "tc-2");
    assert_eq!(out["low_performers"][0]["worst_score"], 0.4);
    assert_eq!(out["low_performers"][1]["test_case_id"], "tc-3");
    assert_eq!(
      out["metric_failure_counts"],
      json!({ "answer_relevancy": 1, "faithfulness": 2 })
    );
  }

  #[tokio::test]
  async fn test_low_performers_truncated() {
    let out = extract(object(json!({ "max_cases": 1 }))).await;
    assert_eq!(out["count"], 2);
    assert_eq!(out["low_performers"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_root_causes_ranked_by_failures() {
    let low = extract(Params::new()).await;
    let stats = object(json!({
      "statistics": { "faithfulness": {
        "count": 3, "mean": 0.6333, "median": 0.6, "std": 0.2055, "min": 0.4, "max": 0.9
      }}
    }));
    let inputs = ModuleInputs::new()
      .with("statistics", "statistical_analyzer", stats)
      .with("low_performers", "low_performer_extractor", low);

    let out = RootCauseAnalyzer::new()
      .execute(&inputs, &Params::new())
      .await
      .unwrap();

    let causes = out["root_causes"].as_array().unwrap();
    assert_eq!(causes.len(), 2);
    assert_eq!(causes[0]["metric"], "faithfulness");
    assert_eq!(causes[0]["severity"], "high");
    assert_eq!(causes[0]["mean_score"], 0.6333);
    assert_eq!(causes[1]["metric"], "answer_relevancy");
    assert!(causes[1]["mean_score"].is_null());
    assert_eq!(out["primary_cause"]["metric"], "faithfulness");
  }

  #[tokio::test]
  async fn test_root_cause_without_failures() {
    let upstream = object(json!({ "metric_failure_counts": {}, "total_cases": 4 }));
    let out = RootCauseAnalyzer::new()
      .execute(&single("low_performers", "low_performer_extractor", upstream), &Params::new())
      .await
      .unwrap();
    assert_eq!(out["root_causes"], json!([]));
    assert!(out["primary_cause"].is_null());
  }

  #[tokio::test]
  async fn test_run_comparator_deltas() {
    let runs = object(json!({
      "runs": [
        { "run_id": "base", "metrics": { "faithfulness": [0.6, 0.8], "recall": [0.5] } },
        { "run_id": "next", "metrics": { "faithfulness": [0.9, 0.9], "recall": [0.4], "extra": [1.0] } },
      ]
    }));
    let out = RunComparator::new()
      .execute(&single("load_runs", "run_loader", runs), &Params::new())
      .await
      .unwrap();

    assert_eq!(out["baseline"], "base");
    assert_eq!(out["candidate"], "next");
    assert_eq!(out["metric_deltas"]["faithfulness"]["delta"], 0.2);
    assert_eq!(out["metric_deltas"]["recall"]["change"], "regressed");
    assert_eq!(out["improved"], json!(["faithfulness"]));
    assert_eq!(out["regressed"], json!(["recall"]));
    assert_eq!(out["missing_metrics"], json!(["extra"]));
    assert_eq!(out["comparisons"].as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_run_comparator_needs_two_runs() {
    let runs = object(json!({ "runs": [{ "run_id": "only", "metrics": {} }] }));
    let err = RunComparator::new()
      .execute(&single("load_runs", "run_loader", runs), &Params::new())
      .await
      .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidInput { .. }));
  }
}
