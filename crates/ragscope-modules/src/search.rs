//! Search-quality scorers: sparse (BM25), dense (embedding) and hybrids.
//!
//! Every scorer emits `method` and a `score` in `[0, 1]`. Hybrids locate their
//! components by `method` tag first and fall back to the module id alias, so
//! they keep working when templates rename nodes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragscope_module::{
  AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params, param_f64,
};
use serde_json::{Value, json};
use xxhash_rust::xxh64::xxh64;

use crate::morpheme::{TokenizedCase, tokenize};
use crate::util::{mean, number, object, round4, upstream_cases, upstream_field};

fn scored_output(method: &str, case_scores: Vec<(String, f64)>) -> ModuleOutput {
  let scores: Vec<f64> = case_scores.iter().map(|(_, s)| *s).collect();
  let per_case: Vec<Value> = case_scores
    .into_iter()
    .map(|(id, score)| json!({ "test_case_id": id, "score": round4(score) }))
    .collect();

  object(json!({
    "method": method,
    "score": round4(mean(&scores).clamp(0.0, 1.0)),
    "case_count": per_case.len(),
    "case_scores": per_case,
  }))
}

/// Score of the upstream output tagged `method`, or of the node/module named
/// `alias`.
fn component_score(inputs: &ModuleInputs, method: &str, alias: &str) -> Result<f64, ModuleError> {
  let output = inputs
    .iter()
    .map(|u| &u.output)
    .find(|o| o.get("method").and_then(Value::as_str) == Some(method))
    .or_else(|| inputs.find(alias))
    .ok_or_else(|| ModuleError::MissingInput(format!("{} score", method)))?;
  number(output, "score")
}

/// Okapi BM25 between each question and its own contexts.
///
/// Reads `tokenized_cases`. Document statistics come from every context of the
/// run. A case scores `s / (s + 1)` for its best context `s`, 0 without
/// contexts or question tokens. Params: `k1` (1.2), `b` (0.75).
pub struct Bm25Searcher {
  metadata: ModuleMetadata,
}

impl Bm25Searcher {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("bm25_searcher", "BM25 searcher")
        .description("Sparse lexical retrieval quality")
        .inputs(&["tokenized_cases"])
        .outputs(&["score", "method"])
        .requires(&["morpheme_analyzer"]),
    }
  }
}

impl Default for Bm25Searcher {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for Bm25Searcher {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let cases: Vec<TokenizedCase> = upstream_field(inputs, "tokenized_cases")?;
    let k1 = param_f64(params, "k1", 1.2)?;
    let b = param_f64(params, "b", 0.75)?;

    let documents: Vec<&Vec<String>> = cases.iter().flat_map(|c| c.context_tokens.iter()).collect();
    let doc_count = documents.len() as f64;
    let avg_len = if documents.is_empty() {
      0.0
    } else {
      documents.iter().map(|d| d.len()).sum::<usize>() as f64 / doc_count
    };

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for doc in &documents {
      let mut seen: Vec<&str> = doc.iter().map(|t| t.as_str()).collect();
      seen.sort_unstable();
      seen.dedup();
      for term in seen {
        *doc_freq.entry(term).or_default() += 1;
      }
    }

    let bm25 = |query: &[String], doc: &[String]| -> f64 {
      if doc.is_empty() || avg_len == 0.0 {
        return 0.0;
      }
      let mut terms: Vec<&str> = query.iter().map(|t| t.as_str()).collect();
      terms.sort_unstable();
      terms.dedup();

      terms
        .into_iter()
        .map(|term| {
          let tf = doc.iter().filter(|t| t.as_str() == term).count() as f64;
          if tf == 0.0 {
            return 0.0;
          }
          let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
          let idf = ((doc_count - df + 0.5) / (df + 0.5) + 1.0).ln();
          let norm = k1 * (1.0 - b + b * doc.len() as f64 / avg_len);
          idf * tf * (k1 + 1.0) / (tf + norm)
        })
        .sum()
    };

    let case_scores = cases
      .iter()
      .map(|case| {
        let best = case
          .context_tokens
          .iter()
          .map(|doc| bm25(&case.question_tokens, doc))
          .fold(0.0_f64, f64::max);
        (case.test_case_id.clone(), best / (best + 1.0))
      })
      .collect();

    Ok(scored_output("bm25", case_scores))
  }
}

/// Turns texts into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Identifier reported in module output.
  fn name(&self) -> &str;

  /// One vector per text, in order.
  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModuleError>;
}

/// Feature-hashing embedder over [`tokenize`] tokens.
///
/// Deterministic and offline; stands in when no model-backed embedder is
/// injected.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
  dimensions: usize,
}

impl HashingEmbedder {
  pub fn new(dimensions: usize) -> Self {
    Self {
      dimensions: dimensions.max(1),
    }
  }

  fn embed_one(&self, text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; self.dimensions];
    for token in tokenize(text) {
      let slot = (xxh64(token.as_bytes(), 0) % self.dimensions as u64) as usize;
      vector[slot] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
      vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
  }
}

impl Default for HashingEmbedder {
  fn default() -> Self {
    Self::new(256)
  }
}

#[async_trait]
impl Embedder for HashingEmbedder {
  fn name(&self) -> &str {
    "hashing"
  }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModuleError> {
    Ok(texts.iter().map(|t| self.embed_one(t)).collect())
  }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  (dot / (norm_a * norm_b)) as f64
}

/// Dense similarity between each question and its best context.
///
/// Reads `cases`. Emits the [`Bm25Searcher`] shape plus `embedder`.
pub struct EmbeddingSearcher {
  metadata: ModuleMetadata,
  embedder: Arc<dyn Embedder>,
}

impl EmbeddingSearcher {
  pub fn new(embedder: Arc<dyn Embedder>) -> Self {
    Self {
      metadata: ModuleMetadata::new("embedding_searcher", "Embedding searcher")
        .description("Dense retrieval quality via cosine similarity")
        .inputs(&["cases"])
        .outputs(&["score", "method"])
        .requires(&["data_loader"]),
      embedder,
    }
  }
}

#[async_trait]
impl AnalysisModule for EmbeddingSearcher {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let cases = upstream_cases(inputs)?;

    let mut case_scores = Vec::with_capacity(cases.len());
    for case in &cases {
      if case.contexts.is_empty() {
        case_scores.push((case.test_case_id.clone(), 0.0));
        continue;
      }

      let mut texts = Vec::with_capacity(case.contexts.len() + 1);
      texts.push(case.question.clone());
      texts.extend(case.contexts.iter().cloned());

      let vectors = self.embedder.embed(&texts).await?;
      let Some((question, contexts)) = vectors.split_first() else {
        return Err(ModuleError::Execution(format!(
          "embedder '{}' returned no vectors",
          self.embedder.name()
        )));
      };
      let best = contexts
        .iter()
        .map(|c| cosine(question, c).clamp(0.0, 1.0))
        .fold(0.0_f64, f64::max);
      case_scores.push((case.test_case_id.clone(), best));
    }

    let mut out = scored_output("embedding", case_scores);
    out.insert("embedder".to_string(), json!(self.embedder.name()));
    Ok(out)
  }
}

/// Simple average of the sparse and dense scores, clamped to `[0, 1]`.
pub struct RrfHybrid {
  metadata: ModuleMetadata,
}

impl RrfHybrid {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("rrf_hybrid", "RRF hybrid")
        .description("Equal-weight fusion of sparse and dense scores")
        .inputs(&["score"])
        .outputs(&["score", "method"])
        .requires(&["bm25_searcher", "embedding_searcher"]),
    }
  }
}

impl Default for RrfHybrid {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for RrfHybrid {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let bm25 = component_score(inputs, "bm25", "bm25_searcher")?;
    let embedding = component_score(inputs, "embedding", "embedding_searcher")?;
    let score = ((bm25 + embedding) / 2.0).clamp(0.0, 1.0);

    Ok(object(json!({
      "method": "rrf_hybrid",
      "score": round4(score),
      "components": { "bm25": bm25, "embedding": embedding },
    })))
  }
}

/// Weighted average of the sparse and dense scores, clamped to `[0, 1]`.
///
/// Params: `bm25_weight` (0.4), `embedding_weight` (0.6).
pub struct WeightedHybrid {
  metadata: ModuleMetadata,
}

impl WeightedHybrid {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("weighted_hybrid", "Weighted hybrid")
        .description("Weighted fusion of sparse and dense scores")
        .inputs(&["score"])
        .outputs(&["score", "method"])
        .requires(&["bm25_searcher", "embedding_searcher"]),
    }
  }
}

impl Default for WeightedHybrid {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for WeightedHybrid {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let bm25 = component_score(inputs, "bm25", "bm25_searcher")?;
    let embedding = component_score(inputs, "embedding", "embedding_searcher")?;
    let bm25_weight = param_f64(params, "bm25_weight", 0.4)?;
    let embedding_weight = param_f64(params, "embedding_weight", 0.6)?;

    let score = (bm25_weight * bm25 + embedding_weight * embedding).clamp(0.0, 1.0);

    Ok(object(json!({
      "method": "weighted_hybrid",
      "score": round4(score),
      "components": { "bm25": bm25, "embedding": embedding },
      "weights": { "bm25": bm25_weight, "embedding": embedding_weight },
    })))
  }
}

/// Picks the better hybrid. Ties go to `rrf_hybrid`.
pub struct SearchComparator {
  metadata: ModuleMetadata,
}

impl SearchComparator {
  pub fn new() -> Self {
    Self {
      metadata: ModuleMetadata::new("search_comparator", "Search comparator")
        .description("Ranks hybrid retrieval strategies")
        .inputs(&["score"])
        .outputs(&["winner", "scores", "ranking"])
        .requires(&["rrf_hybrid", "weighted_hybrid"]),
    }
  }
}

impl Default for SearchComparator {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for SearchComparator {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let rrf = component_score(inputs, "rrf_hybrid", "rrf_hybrid")?;
    let weighted = component_score(inputs, "weighted_hybrid", "weighted_hybrid")?;

    let (winner, runner_up) = if weighted > rrf {
      ("weighted_hybrid", "rrf_hybrid")
    } else {
      ("rrf_hybrid", "weighted_hybrid")
    };

    Ok(object(json!({
      "winner": winner,
      "ranking": [winner, runner_up],
      "scores": { "rrf_hybrid": rrf, "weighted_hybrid": weighted },
      "margin": round4((weighted - rrf).abs()),
    })))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::fixtures::{case, loaded, run};

  fn scorer(node: &str, module: &str, method: &str, score: f64) -> (String, String, ModuleOutput) {
    (
      node.to_string(),
      module.to_string(),
      object(json!({ "method": method, "score": score })),
    )
  }

  fn inputs(entries: Vec<(String, String, ModuleOutput)>) -> ModuleInputs {
    let mut inputs = ModuleInputs::new();
    for (node, module, output) in entries {
      inputs.insert(node, module, output);
    }
    inputs
  }

  fn components(bm25: f64, embedding: f64) -> ModuleInputs {
    inputs(vec![
      scorer("bm25_search", "bm25_searcher", "bm25", bm25),
      scorer("embedding_search", "embedding_searcher", "embedding", embedding),
    ])
  }

  #[tokio::test]
  async fn test_weighted_hybrid_is_convex_combination() {
    let out = WeightedHybrid::new()
      .execute(&components(0.5, 0.5), &Params::new())
      .await
      .unwrap();
    assert_eq!(out["score"], 0.5);
    assert_eq!(out["method"], "weighted_hybrid");
    assert_eq!(out["weights"]["bm25"], 0.4);
  }

  #[tokio::test]
  async fn test_weighted_hybrid_clamps_to_one() {
    let params = object(json!({ "bm25_weight": 1.0, "embedding_weight": 1.0 }));
    let out = WeightedHybrid::new()
      .execute(&components(0.9, 0.9), &params)
      .await
      .unwrap();
    assert_eq!(out["score"], 1.0);
  }

  #[tokio::test]
  async fn test_rrf_hybrid_averages() {
    let out = RrfHybrid::new()
      .execute(&components(0.6, 0.8), &Params::new())
      .await
      .unwrap();
    assert_eq!(out["score"], 0.7);
  }

  #[tokio::test]
  async fn test_hybrid_falls_back_to_alias() {
    let aliased = inputs(vec![
      (
        "sparse".to_string(),
        "bm25_searcher".to_string(),
        object(json!({ "score": 0.2 })),
      ),
      (
        "dense".to_string(),
        "embedding_searcher".to_string(),
        object(json!({ "score": 0.4 })),
      ),
    ]);
    let out = RrfHybrid::new().execute(&aliased, &Params::new()).await.unwrap();
    assert_eq!(out["score"], 0.3);
  }

  #[tokio::test]
  async fn test_hybrid_without_components_fails() {
    let err = RrfHybrid::new()
      .execute(&ModuleInputs::new(), &Params::new())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "missing required input: bm25 score");
  }

  #[tokio::test]
  async fn test_comparator_picks_higher_and_breaks_ties_to_rrf() {
    let comparator = SearchComparator::new();

    let higher_weighted = inputs(vec![
      scorer("rrf_hybrid", "rrf_hybrid", "rrf_hybrid", 0.7),
      scorer("weighted_hybrid", "weighted_hybrid", "weighted_hybrid", 0.72),
    ]);
    let out = comparator.execute(&higher_weighted, &Params::new()).await.unwrap();
    assert_eq!(out["winner"], "weighted_hybrid");
    assert_eq!(out["margin"], 0.02);

    let tie = inputs(vec![
      scorer("rrf_hybrid", "rrf_hybrid", "rrf_hybrid", 0.5),
      scorer("weighted_hybrid", "weighted_hybrid", "weighted_hybrid", 0.5),
    ]);
    let out = comparator.execute(&tie, &Params::new()).await.unwrap();
    assert_eq!(out["winner"], "rrf_hybrid");
    assert_eq!(out["ranking"], json!(["rrf_hybrid", "weighted_hybrid"]));
  }

  #[tokio::test]
  async fn test_bm25_prefers_matching_context() {
    let cases = vec![
      TokenizedCase {
        test_case_id: "hit".to_string(),
        question_tokens: vec!["premium".to_string(), "period".to_string()],
        context_tokens: vec![vec!["premium".to_string(), "period".to_string(), "years".to_string()]],
      },
      TokenizedCase {
        test_case_id: "miss".to_string(),
        question_tokens: vec!["claim".to_string()],
        context_tokens: vec![vec!["unrelated".to_string(), "text".to_string()]],
      },
      TokenizedCase {
        test_case_id: "empty".to_string(),
        question_tokens: vec!["claim".to_string()],
        context_tokens: vec![],
      },
    ];
    let upstream = object(json!({ "tokenized_cases": cases }));
    let inputs = ModuleInputs::new().with("morpheme_analyzer", "morpheme_analyzer", upstream);

    let out = Bm25Searcher::new().execute(&inputs, &Params::new()).await.unwrap();
    let per_case = out["case_scores"].as_array().unwrap();

    assert!(per_case[0]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(per_case[1]["score"], 0.0);
    assert_eq!(per_case[2]["score"], 0.0);
    let score = out["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
    assert_eq!(out["method"], "bm25");
  }

  #[tokio::test]
  async fn test_embedding_searcher_with_hashing_embedder() {
    let run = run(
      "r",
      vec![
        case("same", "premium payment period", &["premium payment period"], &[]),
        case("none", "premium", &[], &[]),
      ],
    );
    let searcher = EmbeddingSearcher::new(Arc::new(HashingEmbedder::default()));
    let out = searcher.execute(&loaded(&run), &Params::new()).await.unwrap();

    assert_eq!(out["case_scores"][0]["score"], 1.0);
    assert_eq!(out["case_scores"][1]["score"], 0.0);
    assert_eq!(out["score"], 0.5);
    assert_eq!(out["embedder"], "hashing");
  }

  #[test]
  fn test_hashing_embedder_is_normalized() {
    let v = HashingEmbedder::new(16).embed_one("a b c d e");
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
    assert!(HashingEmbedder::new(16).embed_one("").iter().all(|x| *x == 0.0));
  }
}
