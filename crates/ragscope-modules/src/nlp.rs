//! Question-level NLP heuristics and metric pattern detection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params, param_f64,
  param_u64,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::morpheme::tokenize;
use crate::util::{mean, object, ratio, round4, upstream_cases, upstream_field};

const ENGLISH_WH: &[(&str, &str)] = &[
  ("why", "why"),
  ("how", "how"),
  ("who", "who"),
  ("whom", "who"),
  ("whose", "who"),
  ("when", "when"),
  ("where", "where"),
  ("what", "what"),
  ("which", "what"),
];

const ENGLISH_AUXILIARIES: &[&str] = &[
  "is", "are", "was", "were", "do", "does", "did", "can", "could", "will", "would", "should",
  "has", "have", "had", "may", "must",
];

const KOREAN_WH: &[(&str, &str)] = &[
  ("왜", "why"),
  ("어떻게", "how"),
  ("방법", "how"),
  ("누가", "who"),
  ("누구", "who"),
  ("언제", "when"),
  ("어디", "where"),
  ("무엇", "what"),
  ("무슨", "what"),
  ("어떤", "what"),
  ("뭐", "what"),
];

const KOREAN_YES_NO_ENDINGS: &[&str] = &["나요", "니까", "인가요", "있어요", "되나요", "가요"];

/// Coarse question type: `what`, `who`, `when`, `where`, `why`, `how`,
/// `yes_no` or `other`.
///
/// English interrogatives are matched by word, the earliest one winning; Korean
/// ones by substring in a fixed order. Yes/no questions open with an English
/// auxiliary or end in a Korean interrogative ending.
pub fn classify_question(question: &str) -> &'static str {
  let words = tokenize(question);

  for word in &words {
    if let Some((_, kind)) = ENGLISH_WH.iter().find(|(w, _)| w == word) {
      return *kind;
    }
  }

  for (keyword, kind) in KOREAN_WH {
    if question.contains(*keyword) {
      return *kind;
    }
  }

  if let Some(first) = words.first()
    && ENGLISH_AUXILIARIES.contains(&first.as_str())
  {
    return "yes_no";
  }

  let trimmed = question.trim_end_matches(|c: char| c == '?' || c.is_whitespace());
  if KOREAN_YES_NO_ENDINGS.iter().any(|e| trimmed.ends_with(e)) {
    return "yes_no";
  }

  "other"
}

fn is_hangul(c: char) -> bool {
  ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Per-case features used by [`PatternDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CaseProfile {
  pub test_case_id: String,
  pub question_type: String,
  pub question_tokens: usize,
  pub answer_tokens: usize,
  pub context_count: usize,
  pub metrics: BTreeMap<String, f64>,
}

/// Question type distribution and length statistics.
///
/// Reads `cases`. Emits `question_stats`, `question_types` (type → count) and
/// `case_profiles`.
pub struct NlpAnalyzer {
  metadata: ModuleMetadata,
}

impl NlpAnalyzer {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("nlp_analyzer", "NLP analyzer")
        .description("Question typing and length statistics")
        .inputs(&["cases"])
        .outputs(&["question_stats", "question_types", "case_profiles"])
        .requires(&["data_loader"]),
    }
  }
}

impl Default for NlpAnalyzer {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for NlpAnalyzer {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let cases = upstream_cases(inputs)?;

    let mut question_types: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut question_chars = Vec::with_capacity(cases.len());
    let mut korean = 0usize;
    let mut profiles = Vec::with_capacity(cases.len());

    for case in &cases {
      let kind = classify_question(&case.question);
      *question_types.entry(kind).or_default() += 1;
      question_chars.push(case.question.chars().count() as f64);
      if case.question.chars().any(is_hangul) {
        korean += 1;
      }

      profiles.push(CaseProfile {
        test_case_id: case.test_case_id.clone(),
        question_type: kind.to_string(),
        question_tokens: tokenize(&case.question).len(),
        answer_tokens: tokenize(&case.answer).len(),
        context_count: case.contexts.len(),
        metrics: case
          .metrics
          .iter()
          .map(|m| (m.name.clone(), m.score))
          .collect(),
      });
    }

    let question_tokens: Vec<f64> = profiles.iter().map(|p| p.question_tokens as f64).collect();
    let answer_tokens: Vec<f64> = profiles.iter().map(|p| p.answer_tokens as f64).collect();

    Ok(object(json!({
      "question_stats": {
        "case_count": cases.len(),
        "avg_question_chars": round4(mean(&question_chars)),
        "avg_question_tokens": round4(mean(&question_tokens)),
        "avg_answer_tokens": round4(mean(&answer_tokens)),
        "korean_ratio": round4(ratio(korean, cases.len())),
      },
      "question_types": question_types,
      "case_profiles": profiles,
    })))
  }
}

fn length_bucket(tokens: usize) -> &'static str {
  match tokens {
    0..=5 => "short",
    6..=12 => "medium",
    _ => "long",
  }
}

fn metric_means<'a>(profiles: impl Iterator<Item = &'a CaseProfile>) -> BTreeMap<String, f64> {
  let mut scores: BTreeMap<String, Vec<f64>> = BTreeMap::new();
  for profile in profiles {
    for (metric, score) in &profile.metrics {
      scores.entry(metric.clone()).or_default().push(*score);
    }
  }
  scores
    .into_iter()
    .map(|(metric, values)| (metric, round4(mean(&values))))
    .collect()
}

/// Groups where a metric deviates from its overall mean.
///
/// Reads `case_profiles`. Groups cases by question type and by question length
/// (`short` up to 5 tokens, `medium` up to 12, `long` beyond). A group/metric
/// pair is a pattern when its mean differs from the overall mean by at least
/// `min_gap` (0.1) and the group has at least `min_cases` (1) cases. Patterns
/// are ordered by absolute gap, largest first.
pub struct PatternDetector {
  metadata: ModuleMetadata,
}

impl PatternDetector {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("pattern_detector", "Pattern detector")
        .description("Finds question groups with unusual metric behaviour")
        .inputs(&["case_profiles"])
        .outputs(&["patterns", "type_metric_means", "length_metric_means"])
        .requires(&["nlp_analyzer"]),
    }
  }
}

impl Default for PatternDetector {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for PatternDetector {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let profiles: Vec<CaseProfile> = upstream_field(inputs, "case_profiles")?;
    let min_gap = param_f64(params, "min_gap", 0.1)?;
    let min_cases = param_u64(params, "min_cases", 1)? as usize;

    let overall = metric_means(profiles.iter());

    let mut by_type: BTreeMap<String, Vec<&CaseProfile>> = BTreeMap::new();
    let mut by_length: BTreeMap<String, Vec<&CaseProfile>> = BTreeMap::new();
    for profile in &profiles {
      by_type
        .entry(profile.question_type.clone())
        .or_default()
        .push(profile);
      by_length
        .entry(length_bucket(profile.question_tokens).to_string())
        .or_default()
        .push(profile);
    }

    let group_means = |groups: &BTreeMap<String, Vec<&CaseProfile>>| {
      groups
        .iter()
        .map(|(group, members)| {
          let means = metric_means(members.iter().copied());
          (group.clone(), (members.len(), means))
        })
        .collect::<BTreeMap<_, _>>()
    };
    let type_means = group_means(&by_type);
    let length_means = group_means(&by_length);

    let mut patterns = Vec::new();
    for (dimension, groups) in [("question_type", &type_means), ("length", &length_means)] {
      for (group, (count, means)) in groups {
        if *count < min_cases {
          continue;
        }
        for (metric, group_mean) in means {
          let Some(overall_mean) = overall.get(metric) else {
            continue;
          };
          let gap = round4(group_mean - overall_mean);
          if gap.abs() >= min_gap {
            patterns.push(json!({
              "dimension": dimension,
              "group": group,
              "metric": metric,
              "case_count": count,
              "mean": group_mean,
              "overall_mean": overall_mean,
              "gap": gap,
              "direction": if gap < 0.0 { "below" } else { "above" },
            }));
          }
        }
      }
    }
    patterns.sort_by(|a, b| {
      let gap = |v: &serde_json::Value| v["gap"].as_f64().unwrap_or(0.0).abs();
      gap(b).total_cmp(&gap(a))
    });

    let to_json = |groups: BTreeMap<String, (usize, BTreeMap<String, f64>)>| {
      groups
        .into_iter()
        .map(|(group, (count, means))| (group, json!({ "case_count": count, "metric_means": means })))
        .collect::<serde_json::Map<_, _>>()
    };

    Ok(object(json!({
      "overall_metric_means": overall,
      "type_metric_means": to_json(type_means),
      "length_metric_means": to_json(length_means),
      "pattern_count": patterns.len(),
      "patterns": patterns,
    })))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::fixtures::{loaded, sample_run, single};

  #[test]
  fn test_classify_english() {
    assert_eq!(classify_question("What is the premium?"), "what");
    assert_eq!(classify_question("Why was the claim denied?"), "why");
    assert_eq!(classify_question("How do I cancel the policy?"), "how");
    assert_eq!(classify_question("Is dental care covered?"), "yes_no");
    assert_eq!(classify_question("Tell me about riders"), "other");
    // Earliest interrogative wins.
    assert_eq!(classify_question("When and why did it lapse?"), "when");
  }

  #[test]
  fn test_classify_korean() {
    assert_eq!(classify_question("보험료는 왜 올랐나요?"), "why");
    assert_eq!(classify_question("해지는 어떻게 하나요?"), "how");
    assert_eq!(classify_question("납입 기간은 언제까지인가요?"), "when");
    assert_eq!(classify_question("치과 치료도 보장되나요?"), "yes_no");
    assert_eq!(classify_question("보험금 청구 서류"), "other");
  }

  #[tokio::test]
  async fn test_nlp_analyzer_profiles() {
    let out = NlpAnalyzer::new()
      .execute(&loaded(&sample_run()), &Params::new())
      .await
      .unwrap();

    assert_eq!(out["question_types"], json!({ "how": 1, "what": 1, "why": 1 }));
    assert_eq!(out["question_stats"]["korean_ratio"], 0.0);
    let profiles = out["case_profiles"].as_array().unwrap();
    assert_eq!(profiles.len(), 3);
    assert_eq!(profiles[1]["question_type"], "why");
    assert_eq!(profiles[1]["metrics"]["faithfulness"], 0.4);
  }

  #[tokio::test]
  async fn test_pattern_detector_finds_gap() {
    let nlp = NlpAnalyzer::new()
      .execute(&loaded(&sample_run()), &Params::new())
      .await
      .unwrap();
    let inputs = single("nlp_analysis", "nlp_analyzer", nlp);

    let out = PatternDetector::new()
      .execute(&inputs, &Params::new())
      .await
      .unwrap();

    // faithfulness overall mean is 0.6333; the "why" case sits at 0.4.
    let patterns = out["patterns"].as_array().unwrap();
    assert!(patterns.iter().any(|p| {
      p["dimension"] == "question_type"
        && p["group"] == "why"
        && p["metric"] == "faithfulness"
        && p["direction"] == "below"
    }));
    let gaps: Vec<f64> = patterns
      .iter()
      .map(|p| p["gap"].as_f64().unwrap().abs())
      .collect();
    assert!(gaps.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(out["pattern_count"], patterns.len());
  }

  #[tokio::test]
  async fn test_pattern_detector_respects_min_cases() {
    let nlp = NlpAnalyzer::new()
      .execute(&loaded(&sample_run()), &Params::new())
      .await
      .unwrap();
    let inputs = single("nlp_analysis", "nlp_analyzer", nlp);
    let params = object(json!({ "min_cases": 4 }));

    let out = PatternDetector::new().execute(&inputs, &params).await.unwrap();
    assert_eq!(out["pattern_count"], 0);
  }
}
