//! Query to intent classification.

use ragscope_config::Intent;

/// Maps a free-form query to an intent. `None` when nothing matches.
pub trait IntentClassifier: Send + Sync {
  fn classify(&self, query: &str) -> Option<Intent>;
}

/// Ordered keyword rules; the first rule with a keyword contained in the
/// lowercased query wins.
#[derive(Debug, Clone)]
pub struct KeywordIntentClassifier {
  rules: Vec<(Intent, Vec<String>)>,
}

impl KeywordIntentClassifier {
  pub fn new(rules: Vec<(Intent, Vec<String>)>) -> Self {
    let rules = rules
      .into_iter()
      .map(|(intent, keywords)| {
        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        (intent, keywords)
      })
      .collect();
    Self { rules }
  }

  pub fn rules(&self) -> &[(Intent, Vec<String>)] {
    &self.rules
  }
}

impl Default for KeywordIntentClassifier {
  /// English and Korean keywords for every built-in intent. More specific
  /// intents come first so that e.g. "compare runs" is not read as a summary.
  fn default() -> Self {
    let rule = |intent: Intent, keywords: &[&str]| {
      (intent, keywords.iter().map(|k| k.to_string()).collect())
    };
    Self::new(vec![
      rule(
        Intent::CompareRuns,
        &["compare runs", "run comparison", "previous run", "between runs", "실행 비교", "이전 실행", "런 비교"],
      ),
      rule(
        Intent::CompareSearchMethods,
        &["bm25", "hybrid", "search method", "검색 방법", "하이브리드", "검색 비교"],
      ),
      rule(Intent::VerifyMorpheme, &["morpheme", "tokeniz", "형태소", "토큰"]),
      rule(Intent::VerifyEmbedding, &["embedding", "임베딩"]),
      rule(Intent::VerifyRetrieval, &["retriev", "context", "컨텍스트", "검색 품질"]),
      rule(
        Intent::AnalyzeLowMetrics,
        &["low score", "low metric", "low-scoring", "failing", "root cause", "낮은", "원인", "실패"],
      ),
      rule(Intent::AnalyzePatterns, &["pattern", "trend", "패턴", "경향"]),
      rule(Intent::GenerateDetailed, &["detailed", "full report", "상세"]),
      rule(
        Intent::GenerateSummary,
        &["summary", "summarize", "overview", "report", "요약", "보고서"],
      ),
    ])
  }
}

impl IntentClassifier for KeywordIntentClassifier {
  fn classify(&self, query: &str) -> Option<Intent> {
    let query = query.to_lowercase();
    self
      .rules
      .iter()
      .find(|(_, keywords)| keywords.iter().any(|k| query.contains(k.as_str())))
      .map(|(intent, _)| *intent)
  }
}
