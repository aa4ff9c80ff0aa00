use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported analysis goal.
///
/// The set is closed: every intent has exactly one pipeline template in the
/// built-in catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
  VerifyMorpheme,
  VerifyEmbedding,
  VerifyRetrieval,
  CompareSearchMethods,
  CompareRuns,
  AnalyzeLowMetrics,
  AnalyzePatterns,
  GenerateSummary,
  GenerateDetailed,
}

impl Intent {
  /// Every intent, in catalog order.
  pub const ALL: [Intent; 9] = [
    Intent::VerifyMorpheme,
    Intent::VerifyEmbedding,
    Intent::VerifyRetrieval,
    Intent::CompareSearchMethods,
    Intent::CompareRuns,
    Intent::AnalyzeLowMetrics,
    Intent::AnalyzePatterns,
    Intent::GenerateSummary,
    Intent::GenerateDetailed,
  ];

  /// Wire name, e.g. `COMPARE_SEARCH_METHODS`.
  pub fn as_str(&self) -> &'static str {
    match self {
      Intent::VerifyMorpheme => "VERIFY_MORPHEME",
      Intent::VerifyEmbedding => "VERIFY_EMBEDDING",
      Intent::VerifyRetrieval => "VERIFY_RETRIEVAL",
      Intent::CompareSearchMethods => "COMPARE_SEARCH_METHODS",
      Intent::CompareRuns => "COMPARE_RUNS",
      Intent::AnalyzeLowMetrics => "ANALYZE_LOW_METRICS",
      Intent::AnalyzePatterns => "ANALYZE_PATTERNS",
      Intent::GenerateSummary => "GENERATE_SUMMARY",
      Intent::GenerateDetailed => "GENERATE_DETAILED",
    }
  }
}

impl fmt::Display for Intent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Returned when a string does not name a known intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown intent: {0}")]
pub struct ParseIntentError(pub String);

impl FromStr for Intent {
  type Err = ParseIntentError;

  /// Parse the wire name, ignoring case and surrounding whitespace.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim();
    Intent::ALL
      .into_iter()
      .find(|intent| intent.as_str().eq_ignore_ascii_case(wanted))
      .ok_or_else(|| ParseIntentError(s.to_string()))
  }
}
