//! Pass/fail gates over upstream analysis output.
//!
//! Every gate emits `gate`, `checks` (`name`, `passed`, `value`, `threshold`,
//! `comparison`), `check_count`, `failed_checks` and `passed`, the AND of all
//! checks. Without upstream data a gate reports one failing `data_presence`
//! check instead of erroring.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params, param_f64,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::statistics::MetricStatistics;
use crate::util::{object, optional_upstream_field, ratio, round4};

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Check {
  name: String,
  passed: bool,
  value: f64,
  threshold: f64,
  comparison: &'static str,
}

impl Check {
  fn at_least(name: impl Into<String>, value: f64, threshold: f64) -> Self {
    Self {
      name: name.into(),
      passed: value >= threshold,
      value: round4(value),
      threshold,
      comparison: ">=",
    }
  }

  fn at_most(name: impl Into<String>, value: f64, threshold: f64) -> Self {
    Self {
      name: name.into(),
      passed: value <= threshold,
      value: round4(value),
      threshold,
      comparison: "<=",
    }
  }

  fn data_presence() -> Self {
    Self {
      name: "data_presence".to_string(),
      passed: false,
      value: 0.0,
      threshold: 1.0,
      comparison: ">=",
    }
  }
}

fn gate_output(gate: &str, mut checks: Vec<Check>) -> ModuleOutput {
  if checks.is_empty() {
    checks.push(Check::data_presence());
  }
  let passed = checks.iter().all(|c| c.passed);
  let failed: Vec<&str> = checks
    .iter()
    .filter(|c| !c.passed)
    .map(|c| c.name.as_str())
    .collect();

  object(json!({
    "gate": gate,
    "passed": passed,
    "check_count": checks.len(),
    "failed_checks": failed,
    "checks": checks,
  }))
}

/// Per-metric mean against the metric's threshold, or `threshold` (0.7) when
/// the metric has none.
pub struct QualityGate {
  metadata: ModuleMetadata,
}

impl QualityGate {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("quality_gate", "Quality gate")
        .description("Checks each metric mean against its threshold")
        .inputs(&["statistics"])
        .outputs(&["checks", "passed"])
        .requires(&["statistical_analyzer"]),
    }
  }
}

impl Default for QualityGate {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for QualityGate {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let default_threshold = param_f64(params, "threshold", 0.7)?;
    let statistics: BTreeMap<String, MetricStatistics> =
      optional_upstream_field(inputs, "statistics")?.unwrap_or_default();

    let checks = statistics
      .iter()
      .map(|(metric, stats)| {
        Check::at_least(
          metric.clone(),
          stats.mean,
          stats.threshold.unwrap_or(default_threshold),
        )
      })
      .collect();

    Ok(gate_output("metrics", checks))
  }
}

#[derive(Debug, Deserialize)]
struct TokenStats {
  case_count: usize,
  vocabulary_ratio: f64,
  avg_tokens_per_question: f64,
  empty_question_ratio: f64,
}

/// Gate over `token_stats`.
///
/// Params: `max_empty_question_ratio` (0.05), `min_vocabulary_ratio` (0.1),
/// `min_avg_tokens` (2.0).
pub struct MorphemeQualityChecker {
  metadata: ModuleMetadata,
}

impl MorphemeQualityChecker {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("morpheme_quality_checker", "Morpheme quality checker")
        .description("Checks tokenization health")
        .inputs(&["token_stats"])
        .outputs(&["checks", "passed"])
        .requires(&["morpheme_analyzer"]),
    }
  }
}

impl Default for MorphemeQualityChecker {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for MorphemeQualityChecker {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let stats: Option<TokenStats> = optional_upstream_field(inputs, "token_stats")?;
    let checks = match stats {
      Some(stats) if stats.case_count > 0 => vec![
        Check::at_most(
          "empty_question_ratio",
          stats.empty_question_ratio,
          param_f64(params, "max_empty_question_ratio", 0.05)?,
        ),
        Check::at_least(
          "vocabulary_ratio",
          stats.vocabulary_ratio,
          param_f64(params, "min_vocabulary_ratio", 0.1)?,
        ),
        Check::at_least(
          "avg_tokens_per_question",
          stats.avg_tokens_per_question,
          param_f64(params, "min_avg_tokens", 2.0)?,
        ),
      ],
      _ => Vec::new(),
    };

    Ok(gate_output("morpheme", checks))
  }
}

#[derive(Debug, Deserialize)]
struct RetrievalStats {
  empty_context_ratio: f64,
  avg_keyword_overlap: f64,
  avg_ground_truth_coverage: Option<f64>,
}

/// Gate over `retrieval_stats`.
///
/// Params: `max_empty_context_ratio` (0.1), `min_keyword_overlap` (0.3),
/// `min_ground_truth_coverage` (0.5, only checked when ground truths exist).
pub struct RetrievalQualityChecker {
  metadata: ModuleMetadata,
}

impl RetrievalQualityChecker {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("retrieval_quality_checker", "Retrieval quality checker")
        .description("Checks context coverage")
        .inputs(&["retrieval_stats"])
        .outputs(&["checks", "passed"])
        .requires(&["retrieval_analyzer"]),
    }
  }
}

impl Default for RetrievalQualityChecker {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for RetrievalQualityChecker {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let case_count: usize = optional_upstream_field(inputs, "case_count")?.unwrap_or(0);
    let stats: Option<RetrievalStats> = optional_upstream_field(inputs, "retrieval_stats")?;

    let mut checks = Vec::new();
    if let Some(stats) = stats
      && case_count > 0
    {
      checks.push(Check::at_most(
        "empty_context_ratio",
        stats.empty_context_ratio,
        param_f64(params, "max_empty_context_ratio", 0.1)?,
      ));
      checks.push(Check::at_least(
        "keyword_overlap",
        stats.avg_keyword_overlap,
        param_f64(params, "min_keyword_overlap", 0.3)?,
      ));
      if let Some(coverage) = stats.avg_ground_truth_coverage {
        checks.push(Check::at_least(
          "ground_truth_coverage",
          coverage,
          param_f64(params, "min_ground_truth_coverage", 0.5)?,
        ));
      }
    }

    Ok(gate_output("retrieval", checks))
  }
}

/// Gate over dense search scores.
///
/// Params: `min_similarity` (0.5), `max_zero_similarity_ratio` (0.2).
pub struct EmbeddingQualityChecker {
  metadata: ModuleMetadata,
}

impl EmbeddingQualityChecker {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("embedding_quality_checker", "Embedding quality checker")
        .description("Checks dense similarity between questions and contexts")
        .inputs(&["score", "case_scores"])
        .outputs(&["checks", "passed"])
        .requires(&["embedding_searcher"]),
    }
  }
}

impl Default for EmbeddingQualityChecker {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for EmbeddingQualityChecker {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let score: Option<f64> = optional_upstream_field(inputs, "score")?;
    let case_scores: Vec<Value> = optional_upstream_field(inputs, "case_scores")?.unwrap_or_default();

    let mut checks = Vec::new();
    if let Some(score) = score
      && !case_scores.is_empty()
    {
      let zero = case_scores
        .iter()
        .filter(|c| c["score"].as_f64().unwrap_or(0.0) <= 0.0)
        .count();
      checks.push(Check::at_least(
        "mean_similarity",
        score,
        param_f64(params, "min_similarity", 0.5)?,
      ));
      checks.push(Check::at_most(
        "zero_similarity_ratio",
        ratio(zero, case_scores.len()),
        param_f64(params, "max_zero_similarity_ratio", 0.2)?,
      ));
    }

    Ok(gate_output("embedding", checks))
  }
}
