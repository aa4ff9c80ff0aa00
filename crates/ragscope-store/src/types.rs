use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metric score of a test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
  pub name: String,
  pub score: f64,
  /// Pass threshold; `None` when the metric has no fixed threshold.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub threshold: Option<f64>,
}

impl MetricScore {
  pub fn new(name: impl Into<String>, score: f64, threshold: f64) -> Self {
    Self {
      name: name.into(),
      score,
      threshold: Some(threshold),
    }
  }

  /// `true` when the score reaches the threshold, `None` without a threshold.
  pub fn passed(&self) -> Option<bool> {
    self.threshold.map(|t| self.score >= t)
  }
}

/// A single evaluated question/answer/contexts triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
  pub test_case_id: String,
  pub question: String,
  pub answer: String,
  #[serde(default)]
  pub contexts: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ground_truth: Option<String>,
  #[serde(default)]
  pub metrics: Vec<MetricScore>,
}

/// An evaluation run as handed over by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
  pub run_id: String,
  #[serde(default)]
  pub dataset_name: String,
  #[serde(default)]
  pub model_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  pub results: Vec<TestCaseResult>,
}

impl EvaluationRun {
  /// Scores grouped by metric name, in case order.
  pub fn scores_by_metric(&self) -> BTreeMap<String, Vec<f64>> {
    let mut scores: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for case in &self.results {
      for metric in &case.metrics {
        scores
          .entry(metric.name.clone())
          .or_default()
          .push(metric.score);
      }
    }
    scores
  }

  /// Threshold per metric; the first case that declares one wins.
  pub fn thresholds(&self) -> BTreeMap<String, f64> {
    let mut thresholds = BTreeMap::new();
    for metric in self.results.iter().flat_map(|c| c.metrics.iter()) {
      if let Some(t) = metric.threshold {
        thresholds.entry(metric.name.clone()).or_insert(t);
      }
    }
    thresholds
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn case(id: &str, metrics: Vec<MetricScore>) -> TestCaseResult {
    TestCaseResult {
      test_case_id: id.to_string(),
      question: "q".to_string(),
      answer: "a".to_string(),
      contexts: vec![],
      ground_truth: None,
      metrics,
    }
  }

  #[test]
  fn test_scores_and_thresholds_by_metric() {
    let run = EvaluationRun {
      run_id: "r1".to_string(),
      dataset_name: String::new(),
      model_name: String::new(),
      created_at: None,
      results: vec![
        case(
          "1",
          vec![
            MetricScore::new("faithfulness", 0.9, 0.7),
            MetricScore::new("answer_relevancy", 0.4, 0.6),
          ],
        ),
        case("2", vec![MetricScore::new("faithfulness", 0.5, 0.8)]),
      ],
    };

    let scores = run.scores_by_metric();
    assert_eq!(scores["faithfulness"], vec![0.9, 0.5]);
    assert_eq!(scores["answer_relevancy"], vec![0.4]);

    let thresholds = run.thresholds();
    assert_eq!(thresholds["faithfulness"], 0.7);
    assert_eq!(thresholds["answer_relevancy"], 0.6);
  }

  #[test]
  fn test_passed_without_threshold() {
    let metric = MetricScore {
      name: "m".to_string(),
      score: 0.3,
      threshold: None,
    };
    assert_eq!(metric.passed(), None);
    assert_eq!(MetricScore::new("m", 0.7, 0.7).passed(), Some(true));
  }
}
