//! Lightweight morpheme analysis.
//!
//! Tokens are maximal runs of alphanumeric characters, lowercased. Korean
//! postpositional particles are stripped from the end of a token, longest
//! particle first; single-syllable particles are only stripped when at least
//! two syllables remain.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params, param_u64,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::util::{object, ratio, round4, upstream_cases};

const PARTICLES: &[&str] = &[
  "에서부터", "으로부터", "에게서", "까지는", "에서는", "으로는", "이라는", "에서", "으로", "에게",
  "한테", "께서", "까지", "부터", "처럼", "보다", "이나", "라는", "은", "는", "이", "가", "을",
  "를", "의", "에", "로", "와", "과", "도", "만",
];

/// Token with its particle stripped, plus whether stripping happened.
fn strip_particle(token: &str) -> (String, bool) {
  let char_count = token.chars().count();
  let mut candidates: Vec<&str> = PARTICLES.to_vec();
  candidates.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));

  for particle in candidates {
    let particle_len = particle.chars().count();
    let min_stem = if particle_len == 1 { 2 } else { 1 };
    if token.ends_with(particle) && char_count >= particle_len + min_stem {
      let stem = &token[..token.len() - particle.len()];
      return (stem.to_string(), true);
    }
  }

  (token.to_string(), false)
}

/// Split text into normalized tokens.
pub fn tokenize(text: &str) -> Vec<String> {
  tokenize_counting(text).0
}

/// Tokens plus the number of stripped particles.
fn tokenize_counting(text: &str) -> (Vec<String>, usize) {
  let mut stripped = 0;
  let tokens = text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .map(|t| {
      let (token, did_strip) = strip_particle(&t.to_lowercase());
      if did_strip {
        stripped += 1;
      }
      token
    })
    .collect();
  (tokens, stripped)
}

/// Per-case tokens handed to sparse search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TokenizedCase {
  pub test_case_id: String,
  pub question_tokens: Vec<String>,
  pub context_tokens: Vec<Vec<String>>,
}

/// Token statistics over questions and answers.
///
/// Reads `cases`. Emits `token_stats` (`total_tokens`, `unique_tokens`,
/// `vocabulary_ratio`, `avg_tokens_per_question`, `empty_question_ratio`,
/// `stripped_particles`), `top_tokens` (`[token, count]` pairs, most frequent
/// first, `top_k` param, default 10) and `tokenized_cases`.
pub struct MorphemeAnalyzer {
  metadata: ModuleMetadata,
}

impl MorphemeAnalyzer {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("morpheme_analyzer", "Morpheme analyzer")
        .description("Tokenizes questions, answers and contexts")
        .inputs(&["cases"])
        .outputs(&["token_stats", "top_tokens", "tokenized_cases"])
        .requires(&["data_loader"]),
    }
  }
}

impl Default for MorphemeAnalyzer {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for MorphemeAnalyzer {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let cases = upstream_cases(inputs)?;
    let top_k = param_u64(params, "top_k", 10)? as usize;

    let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_tokens = 0;
    let mut stripped_particles = 0;
    let mut question_token_total = 0;
    let mut empty_questions = 0;
    let mut tokenized = Vec::with_capacity(cases.len());

    for case in &cases {
      let (question_tokens, q_stripped) = tokenize_counting(&case.question);
      let (answer_tokens, a_stripped) = tokenize_counting(&case.answer);
      stripped_particles += q_stripped + a_stripped;

      if question_tokens.is_empty() {
        empty_questions += 1;
      }
      question_token_total += question_tokens.len();

      for token in question_tokens.iter().chain(answer_tokens.iter()) {
        total_tokens += 1;
        *frequencies.entry(token.clone()).or_default() += 1;
      }

      tokenized.push(TokenizedCase {
        test_case_id: case.test_case_id.clone(),
        question_tokens,
        context_tokens: case.contexts.iter().map(|c| tokenize(c)).collect(),
      });
    }

    let unique_tokens = frequencies.len();
    let mut top: Vec<(&String, &usize)> = frequencies.iter().collect();
    top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let top_tokens: Vec<serde_json::Value> = top
      .into_iter()
      .take(top_k)
      .map(|(token, count)| json!([token, count]))
      .collect();

    Ok(object(json!({
      "token_stats": {
        "case_count": cases.len(),
        "total_tokens": total_tokens,
        "unique_tokens": unique_tokens,
        "vocabulary_ratio": round4(ratio(unique_tokens, total_tokens)),
        "avg_tokens_per_question": round4(ratio(question_token_total, cases.len())),
        "empty_question_ratio": round4(ratio(empty_questions, cases.len())),
        "stripped_particles": stripped_particles,
      },
      "top_tokens": top_tokens,
      "tokenized_cases": tokenized,
    })))
  }
}
