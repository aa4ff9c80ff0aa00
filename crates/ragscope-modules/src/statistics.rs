//! Descriptive statistics over metric scores.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ragscope_module::{AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::util::{object, optional_upstream_field, round4, upstream_field};

/// Summary of one metric's scores. Every float is rounded to 4 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
  pub count: usize,
  pub mean: f64,
  pub median: f64,
  /// Population standard deviation.
  pub std: f64,
  pub min: f64,
  pub max: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub threshold: Option<f64>,
  /// Share of scores at or above `threshold`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pass_rate: Option<f64>,
}

/// Statistics for `scores`, `None` when empty.
///
/// Scores are sorted before any arithmetic, so the result does not depend on
/// input order.
pub fn summarize(scores: &[f64], threshold: Option<f64>) -> Option<MetricStatistics> {
  if scores.is_empty() {
    return None;
  }

  let mut sorted = scores.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));

  let n = sorted.len();
  let mean = sorted.iter().sum::<f64>() / n as f64;
  let median = if n % 2 == 1 {
    sorted[n / 2]
  } else {
    (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
  };
  let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
  let pass_rate =
    threshold.map(|t| round4(sorted.iter().filter(|s| **s >= t).count() as f64 / n as f64));

  Some(MetricStatistics {
    count: n,
    mean: round4(mean),
    median: round4(median),
    std: round4(variance.sqrt()),
    min: round4(sorted[0]),
    max: round4(sorted[n - 1]),
    threshold,
    pass_rate,
  })
}

/// Per-metric descriptive statistics.
///
/// Reads `metrics` (metric → scores) and optionally `thresholds`. Emits
/// `statistics` (metric → [`MetricStatistics`]) and `summary` with
/// `metric_count` and `average_score` (mean of the per-metric means). Metrics
/// without scores are left out.
pub struct StatisticalAnalyzer {
  metadata: ModuleMetadata,
}

impl StatisticalAnalyzer {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("statistical_analyzer", "Statistical analyzer")
        .description("Count, mean, median, std, min and max per metric")
        .inputs(&["metrics"])
        .outputs(&["statistics", "summary"])
        .requires(&["data_loader"]),
    }
  }
}

impl Default for StatisticalAnalyzer {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for StatisticalAnalyzer {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let metrics: BTreeMap<String, Vec<f64>> = upstream_field(inputs, "metrics")?;
    let thresholds: BTreeMap<String, f64> =
      optional_upstream_field(inputs, "thresholds")?.unwrap_or_default();

    let statistics: BTreeMap<String, MetricStatistics> = metrics
      .iter()
      .filter_map(|(name, scores)| {
        summarize(scores, thresholds.get(name).copied()).map(|s| (name.clone(), s))
      })
      .collect();

    let raw_means: Vec<f64> = metrics
      .values()
      .filter(|scores| !scores.is_empty())
      .map(|scores| scores.iter().sum::<f64>() / scores.len() as f64)
      .collect();
    let average_score = if raw_means.is_empty() {
      0.0
    } else {
      round4(raw_means.iter().sum::<f64>() / raw_means.len() as f64)
    };

    Ok(object(json!({
      "statistics": statistics,
      "summary": {
        "metric_count": statistics.len(),
        "average_score": average_score,
      },
    })))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::fixtures::single;
  use proptest::prelude::*;

  #[test]
  fn test_summarize_odd_count() {
    let stats = summarize(&[0.9, 0.1, 0.5], None).unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.mean, 0.5);
    assert_eq!(stats.median, 0.5);
    assert_eq!(stats.std, 0.3266);
    assert_eq!(stats.min, 0.1);
    assert_eq!(stats.max, 0.9);
    assert_eq!(stats.pass_rate, None);
  }

  #[test]
  fn test_summarize_even_count_averages_middle_pair() {
    let stats = summarize(&[4.0, 1.0, 3.0, 2.0], Some(2.5)).unwrap();
    assert_eq!(stats.median, 2.5);
    assert_eq!(stats.mean, 2.5);
    assert_eq!(stats.std, 1.118);
    assert_eq!(stats.pass_rate, Some(0.5));
  }

  #[test]
  fn test_summarize_empty() {
    assert!(summarize(&[], None).is_none());
  }

  #[tokio::test]
  async fn test_analyzer_output() {
    let upstream = object(json!({
      "metrics": {
        "faithfulness": [1.0, 2.0, 3.0, 4.0],
        "answer_relevancy": [0.5],
        "unused": []
      },
      "thresholds": { "faithfulness": 2.0 }
    }));
    let inputs = single("load_data", "data_loader", upstream);

    let out = StatisticalAnalyzer::new()
      .execute(&inputs, &Params::new())
      .await
      .unwrap();

    assert_eq!(out["summary"]["metric_count"], 2);
    assert_eq!(out["summary"]["average_score"], 1.5);
    assert_eq!(out["statistics"]["faithfulness"]["median"], 2.5);
    assert_eq!(out["statistics"]["faithfulness"]["pass_rate"], 0.75);
    assert!(out["statistics"]["answer_relevancy"].get("pass_rate").is_none());
    assert!(out["statistics"].get("unused").is_none());
  }

  #[tokio::test]
  async fn test_analyzer_without_metrics_fails() {
    let err = StatisticalAnalyzer::new()
      .execute(&ModuleInputs::new(), &Params::new())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "missing required input: metrics");
  }

  proptest! {
    #[test]
    fn prop_summary_is_order_independent(
      scores in prop::collection::vec(0.0f64..1.0, 1..40),
      seed in any::<u64>(),
    ) {
      let mut shuffled = scores.clone();
      // Deterministic permutation driven by the seed.
      let len = shuffled.len();
      for i in (1..len).rev() {
        let j = (seed.wrapping_mul(i as u64 + 7) % (i as u64 + 1)) as usize;
        shuffled.swap(i, j);
      }

      prop_assert_eq!(summarize(&scores, Some(0.5)), summarize(&shuffled, Some(0.5)));
      prop_assert_eq!(summarize(&scores, None), summarize(&scores, None));
    }
  }
}
