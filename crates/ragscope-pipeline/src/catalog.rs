//! Intent → template catalog.
//!
//! The catalog is populated once at startup and read-only afterwards. It is
//! plain data, so tests build their own catalogs instead of mutating a shared
//! one.

use std::collections::BTreeMap;

use ragscope_config::{Intent, NodeDef, TemplateDef};
use serde_json::json;

use crate::error::TemplateError;
use crate::template::PipelineTemplate;

/// Static mapping from intent to pipeline template.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
  templates: BTreeMap<Intent, PipelineTemplate>,
}

impl TemplateCatalog {
  /// An empty catalog.
  pub fn new() -> Self {
    Self::default()
  }

  /// The catalog with one template for every [`Intent`].
  pub fn builtin() -> Self {
    let mut catalog = Self::new();
    for def in builtin_defs() {
      catalog.insert(PipelineTemplate::from_def(def));
    }
    catalog
  }

  /// Parse a JSON array of template definitions and validate each one.
  pub fn from_json(json: &str) -> Result<Self, TemplateError> {
    let defs: Vec<TemplateDef> =
      serde_json::from_str(json).map_err(|e| TemplateError::InvalidDefinition(e.to_string()))?;

    let mut catalog = Self::new();
    for def in defs {
      let template = PipelineTemplate::from_def(def);
      template.validate()?;
      catalog.insert(template);
    }
    Ok(catalog)
  }

  /// Add or replace the template for its intent.
  pub fn insert(&mut self, template: PipelineTemplate) {
    self.templates.insert(template.intent(), template);
  }

  /// Replace templates with those of `other` where both define an intent.
  pub fn extend(&mut self, other: TemplateCatalog) {
    self.templates.extend(other.templates);
  }

  /// Template for `intent`, or `None` when the catalog has none.
  pub fn get(&self, intent: Intent) -> Option<&PipelineTemplate> {
    self.templates.get(&intent)
  }

  /// Intents with a template, in [`Intent::ALL`] order.
  pub fn intents(&self) -> impl Iterator<Item = Intent> + '_ {
    self.templates.keys().copied()
  }

  pub fn templates(&self) -> impl Iterator<Item = &PipelineTemplate> {
    self.templates.values()
  }

  pub fn len(&self) -> usize {
    self.templates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.templates.is_empty()
  }
}

fn builtin_defs() -> Vec<TemplateDef> {
  vec![
    TemplateDef {
      intent: Intent::VerifyMorpheme,
      name: "Morpheme verification".to_string(),
      description: "Checks tokenization quality of questions and answers".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "morpheme_analyzer",
          "Morpheme analysis",
          "morpheme_analyzer",
          &["load_data"],
        ),
        NodeDef::new(
          "morpheme_quality_check",
          "Morpheme quality check",
          "morpheme_quality_checker",
          &["morpheme_analyzer"],
        ),
        NodeDef::new(
          "verification_report",
          "Verification report",
          "verification_report",
          &["morpheme_quality_check"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::VerifyEmbedding,
      name: "Embedding verification".to_string(),
      description: "Checks dense similarity between questions and contexts".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "embedding_search",
          "Dense similarity",
          "embedding_searcher",
          &["load_data"],
        ),
        NodeDef::new(
          "embedding_quality_check",
          "Embedding quality check",
          "embedding_quality_checker",
          &["embedding_search"],
        ),
        NodeDef::new(
          "verification_report",
          "Verification report",
          "verification_report",
          &["embedding_quality_check"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::VerifyRetrieval,
      name: "Retrieval verification".to_string(),
      description: "Checks retrieved context coverage and overlap".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "retrieval_analyzer",
          "Retrieval analysis",
          "retrieval_analyzer",
          &["load_data"],
        ),
        NodeDef::new(
          "retrieval_quality_check",
          "Retrieval quality check",
          "retrieval_quality_checker",
          &["retrieval_analyzer"],
        ),
        NodeDef::new(
          "verification_report",
          "Verification report",
          "verification_report",
          &["retrieval_quality_check"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::CompareSearchMethods,
      name: "Search method comparison".to_string(),
      description: "Compares sparse, dense and hybrid retrieval scores".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "morpheme_analyzer",
          "Morpheme analysis",
          "morpheme_analyzer",
          &["load_data"],
        ),
        NodeDef::new(
          "bm25_search",
          "BM25 search",
          "bm25_searcher",
          &["morpheme_analyzer"],
        ),
        NodeDef::new(
          "embedding_search",
          "Embedding search",
          "embedding_searcher",
          &["load_data"],
        ),
        NodeDef::new(
          "rrf_hybrid",
          "RRF hybrid",
          "rrf_hybrid",
          &["bm25_search", "embedding_search"],
        ),
        NodeDef::new(
          "weighted_hybrid",
          "Weighted hybrid",
          "weighted_hybrid",
          &["bm25_search", "embedding_search"],
        )
        .with_param("bm25_weight", json!(0.4))
        .with_param("embedding_weight", json!(0.6)),
        NodeDef::new(
          "search_comparator",
          "Search comparison",
          "search_comparator",
          &["rrf_hybrid", "weighted_hybrid"],
        ),
        NodeDef::new(
          "comparison_report",
          "Comparison report",
          "comparison_report",
          &["search_comparator"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::CompareRuns,
      name: "Run comparison".to_string(),
      description: "Compares metric means between two evaluation runs".to_string(),
      nodes: vec![
        NodeDef::new("load_runs", "Load evaluation runs", "run_loader", &[]),
        NodeDef::new(
          "run_comparator",
          "Run comparison",
          "run_comparator",
          &["load_runs"],
        ),
        NodeDef::new(
          "comparison_report",
          "Comparison report",
          "comparison_report",
          &["run_comparator"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::AnalyzeLowMetrics,
      name: "Low metric root cause".to_string(),
      description: "Finds failing cases and likely causes of low scores".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "statistics",
          "Statistics",
          "statistical_analyzer",
          &["load_data"],
        ),
        NodeDef::new(
          "low_performers",
          "Low performers",
          "low_performer_extractor",
          &["load_data"],
        ),
        NodeDef::new(
          "root_cause",
          "Root cause analysis",
          "root_cause_analyzer",
          &["statistics", "low_performers"],
        ),
        NodeDef::new(
          "analysis_report",
          "Analysis report",
          "analysis_report",
          &["root_cause"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::AnalyzePatterns,
      name: "Question pattern analysis".to_string(),
      description: "Relates question shape to metric scores".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new("nlp_analysis", "NLP analysis", "nlp_analyzer", &["load_data"]),
        NodeDef::new(
          "pattern_detector",
          "Pattern detection",
          "pattern_detector",
          &["nlp_analysis", "load_data"],
        ),
        NodeDef::new(
          "analysis_report",
          "Analysis report",
          "analysis_report",
          &["pattern_detector"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::GenerateSummary,
      name: "Summary report".to_string(),
      description: "Per-metric statistics for one run".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "statistics",
          "Statistics",
          "statistical_analyzer",
          &["load_data"],
        ),
        NodeDef::new(
          "summary_report",
          "Summary report",
          "summary_report",
          &["statistics"],
        ),
      ],
    },
    TemplateDef {
      intent: Intent::GenerateDetailed,
      name: "Detailed report".to_string(),
      description: "Statistics, question analysis, low performers and quality gate".to_string(),
      nodes: vec![
        NodeDef::new("load_data", "Load evaluation run", "data_loader", &[]),
        NodeDef::new(
          "statistics",
          "Statistics",
          "statistical_analyzer",
          &["load_data"],
        ),
        NodeDef::new("nlp_analysis", "NLP analysis", "nlp_analyzer", &["load_data"]),
        NodeDef::new(
          "low_performers",
          "Low performers",
          "low_performer_extractor",
          &["load_data"],
        ),
        NodeDef::new("quality_gate", "Quality gate", "quality_gate", &["statistics"]),
        NodeDef::new(
          "detailed_report",
          "Detailed report",
          "detailed_report",
          &["statistics", "nlp_analysis", "low_performers", "quality_gate"],
        ),
      ],
    },
  ]
}
