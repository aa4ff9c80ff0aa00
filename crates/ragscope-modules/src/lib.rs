//! Ragscope Modules
//!
//! Built-in implementations of [`AnalysisModule`]. Every module documents the
//! fields it reads from upstream outputs and the fields it emits; the numbers
//! themselves are heuristics and can be swapped by registering another module
//! under the same id.
//!
//! | id | reads | emits |
//! |---|---|---|
//! | `data_loader` | `run_id` param | `cases`, `metrics`, `thresholds` |
//! | `run_loader` | `run_ids` param | `runs` |
//! | `statistical_analyzer` | `metrics` | `statistics`, `summary` |
//! | `morpheme_analyzer` | `cases` | `token_stats`, `tokenized_cases` |
//! | `bm25_searcher` | `tokenized_cases` | `score`, `method` |
//! | `embedding_searcher` | `cases` | `score`, `method` |
//! | `rrf_hybrid`, `weighted_hybrid` | two `score`s | `score`, `method` |
//! | `search_comparator` | hybrid scores | `winner` |
//! | `*_quality_checker`, `quality_gate` | stats | `checks`, `passed` |
//! | `*_report` | anything above | `report`, `summary` |

mod diagnostics;
mod loader;
mod morpheme;
mod nlp;
mod quality;
mod report;
mod retrieval;
mod search;
mod statistics;
mod util;

use std::sync::Arc;

use ragscope_module::{AnalysisModule, ModuleRegistry};
use ragscope_store::RunStore;

pub use diagnostics::{LowPerformerExtractor, RootCauseAnalyzer, RunComparator};
pub use loader::{DataLoader, RunLoader};
pub use morpheme::{MorphemeAnalyzer, tokenize};
pub use nlp::{NlpAnalyzer, PatternDetector, classify_question};
pub use quality::{
  EmbeddingQualityChecker, MorphemeQualityChecker, QualityGate, RetrievalQualityChecker,
};
pub use report::{AnalysisReport, ComparisonReport, DetailedReport, SummaryReport, VerificationReport};
pub use retrieval::RetrievalAnalyzer;
pub use search::{
  Bm25Searcher, Embedder, EmbeddingSearcher, HashingEmbedder, RrfHybrid, SearchComparator,
  WeightedHybrid,
};
pub use statistics::{MetricStatistics, StatisticalAnalyzer, summarize};

/// Every built-in module, wired to `store`.
pub fn builtin_modules(store: Arc<dyn RunStore>) -> Vec<Arc<dyn AnalysisModule>> {
  vec![
    Arc::new(DataLoader::new(store.clone())),
    Arc::new(RunLoader::new(store)),
    Arc::new(StatisticalAnalyzer::new()),
    Arc::new(MorphemeAnalyzer::new()),
    Arc::new(Bm25Searcher::new()),
    Arc::new(EmbeddingSearcher::new(Arc::new(HashingEmbedder::default()))),
    Arc::new(RrfHybrid::new()),
    Arc::new(WeightedHybrid::new()),
    Arc::new(SearchComparator::new()),
    Arc::new(RetrievalAnalyzer::new()),
    Arc::new(NlpAnalyzer::new()),
    Arc::new(PatternDetector::new()),
    Arc::new(LowPerformerExtractor::new()),
    Arc::new(RootCauseAnalyzer::new()),
    Arc::new(RunComparator::new()),
    Arc::new(QualityGate::new()),
    Arc::new(MorphemeQualityChecker::new()),
    Arc::new(RetrievalQualityChecker::new()),
    Arc::new(EmbeddingQualityChecker::new()),
    Arc::new(SummaryReport::new()),
    Arc::new(VerificationReport::new()),
    Arc::new(ComparisonReport::new()),
    Arc::new(AnalysisReport::new()),
    Arc::new(DetailedReport::new()),
  ]
}

/// Register every built-in module into `registry`.
pub fn register_builtin(registry: &mut ModuleRegistry, store: Arc<dyn RunStore>) {
  for module in builtin_modules(store) {
    registry.register(module);
  }
}
