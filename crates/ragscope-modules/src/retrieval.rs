use std::collections::BTreeSet;

use async_trait::async_trait;
use ragscope_module::{AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params};
use serde_json::json;
use tracing::debug;

use crate::morpheme::tokenize;
use crate::util::{mean, object, ratio, round4, upstream_cases};

/// Share of `needle` tokens that occur in `haystack`. `None` without needles.
fn coverage(needle: &BTreeSet<String>, haystack: &BTreeSet<String>) -> Option<f64> {
  if needle.is_empty() {
    return None;
  }
  let hits = needle.iter().filter(|t| haystack.contains(*t)).count();
  Some(ratio(hits, needle.len()))
}

/// Context coverage of questions and ground truths.
///
/// Reads `cases`. Emits `retrieval_stats` (`avg_contexts`,
/// `empty_context_ratio`, `avg_keyword_overlap`, `avg_ground_truth_coverage`),
/// per-case `case_retrieval` and `case_count`. Ground-truth coverage is null
/// when no case carries a ground truth.
pub struct RetrievalAnalyzer {
  metadata: ModuleMetadata,
}

impl RetrievalAnalyzer {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("retrieval_analyzer", "Retrieval analyzer")
        .description("Measures how well retrieved contexts cover each question")
        .inputs(&["cases"])
        .outputs(&["retrieval_stats", "case_retrieval"])
        .requires(&["data_loader"]),
    }
  }
}

impl Default for RetrievalAnalyzer {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for RetrievalAnalyzer {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let cases = upstream_cases(inputs)?;

    let mut context_counts = Vec::with_capacity(cases.len());
    let mut overlaps = Vec::with_capacity(cases.len());
    let mut gt_coverages = Vec::new();
    let mut per_case = Vec::with_capacity(cases.len());
    let mut empty = 0usize;

    for case in &cases {
      if case.contexts.is_empty() {
        empty += 1;
      }
      context_counts.push(case.contexts.len() as f64);

      let context_tokens: BTreeSet<String> =
        case.contexts.iter().flat_map(|c| tokenize(c)).collect();
      let question_tokens: BTreeSet<String> = tokenize(&case.question).into_iter().collect();

      let overlap = coverage(&question_tokens, &context_tokens).unwrap_or(0.0);
      overlaps.push(overlap);

      let gt_coverage = case.ground_truth.as_deref().and_then(|gt| {
        let gt_tokens: BTreeSet<String> = tokenize(gt).into_iter().collect();
        coverage(&gt_tokens, &context_tokens)
      });
      if let Some(value) = gt_coverage {
        gt_coverages.push(value);
      }

      per_case.push(json!({
        "test_case_id": case.test_case_id,
        "context_count": case.contexts.len(),
        "keyword_overlap": round4(overlap),
        "ground_truth_coverage": gt_coverage.map(round4),
      }));
    }

    let avg_gt = if gt_coverages.is_empty() {
      None
    } else {
      Some(round4(mean(&gt_coverages)))
    };

    debug!(cases = cases.len(), empty_contexts = empty, "retrieval analyzed");

    Ok(object(json!({
      "case_count": cases.len(),
      "retrieval_stats": {
        "avg_contexts": round4(mean(&context_counts)),
        "empty_context_ratio": round4(ratio(empty, cases.len())),
        "avg_keyword_overlap": round4(mean(&overlaps)),
        "avg_ground_truth_coverage": avg_gt,
      },
      "case_retrieval": per_case,
    })))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::fixtures::{case, loaded, run, sample_run};

  #[tokio::test]
  async fn test_sample_run_retrieval_stats() {
    let out = RetrievalAnalyzer::new()
      .execute(&loaded(&sample_run()), &Params::new())
      .await
      .unwrap();

    let stats = &out["retrieval_stats"];
    assert_eq!(out["case_count"], 3);
    assert_eq!(stats["avg_contexts"], 0.6667);
    assert_eq!(stats["empty_context_ratio"], 0.3333);
    assert!(stats["avg_ground_truth_coverage"].is_null());
    assert_eq!(out["case_retrieval"][2]["keyword_overlap"], 0.0);
  }

  #[tokio::test]
  async fn test_ground_truth_coverage() {
    let mut covered = case("a", "premium", &["premium is paid monthly"], &[]);
    covered.ground_truth = Some("paid monthly".to_string());
    let mut half = case("b", "premium", &["paid yearly"], &[]);
    half.ground_truth = Some("paid monthly".to_string());

    let out = RetrievalAnalyzer::new()
      .execute(&loaded(&run("r", vec![covered, half])), &Params::new())
      .await
      .unwrap();

    assert_eq!(out["retrieval_stats"]["avg_ground_truth_coverage"], 0.75);
    assert_eq!(out["case_retrieval"][0]["keyword_overlap"], 1.0);
    assert_eq!(out["case_retrieval"][1]["keyword_overlap"], 0.0);
  }

  #[tokio::test]
  async fn test_requires_cases() {
    let err = RetrievalAnalyzer::new()
      .execute(&ModuleInputs::new(), &Params::new())
      .await
      .unwrap_err();
    assert!(matches!(err, ModuleError::MissingInput(field) if field == "cases"));
  }
}
