//! Text report renderers.
//!
//! Each renderer emits `report` (plain text rendered through a minijinja
//! template) and `summary` (structured highlights). Maps are iterated through
//! `dictsort`, so output is stable for identical input.

use std::collections::BTreeMap;

use async_trait::async_trait;
use minijinja::Environment;
use ragscope_module::{AnalysisModule, ModuleError, ModuleInputs, ModuleMetadata, ModuleOutput, Params};
use serde_json::{Value, json};

use crate::statistics::MetricStatistics;
use crate::util::{field, object, optional_upstream_field, upstream_field};

const SUMMARY_TEMPLATE: &str = r#"Evaluation summary
==================
Metrics: {{ summary.metric_count }}
Average score: {{ summary.average_score }}
{% for name, s in statistics|dictsort %}
- {{ name }}: mean {{ s.mean }}, median {{ s.median }}, std {{ s.std }}, range [{{ s.min }}, {{ s.max }}]{% if s.pass_rate is defined %}, pass rate {{ s.pass_rate }}{% endif %}

{% endfor %}
"#;

const VERIFICATION_TEMPLATE: &str = r#"{{ gate|upper }} verification: {{ "PASSED" if passed else "FAILED" }}
{% for c in checks %}
[{{ "x" if c.passed else " " }}] {{ c.name }}: {{ c.value }} {{ c.comparison }} {{ c.threshold }}
{% endfor %}
"#;

const SEARCH_COMPARISON_TEMPLATE: &str = r#"Search method comparison
Winner: {{ winner }} (margin {{ margin }})
{% for name, score in scores|dictsort %}
- {{ name }}: {{ score }}
{% endfor %}
"#;

const RUN_COMPARISON_TEMPLATE: &str = r#"Run comparison: {{ baseline }} -> {{ candidate }}
{% for name, d in metric_deltas|dictsort %}
- {{ name }}: {{ d.baseline_mean }} -> {{ d.candidate_mean }} ({{ d.change }}, {{ d.delta }})
{% endfor %}
Improved: {{ improved|join(", ") or "none" }}
Regressed: {{ regressed|join(", ") or "none" }}
"#;

const ROOT_CAUSE_TEMPLATE: &str = r#"Low metric analysis
{% for c in root_causes %}
{{ loop.index }}. {{ c.metric }} [{{ c.severity }}]: {{ c.failure_count }} failing cases (rate {{ c.failure_rate }})
   cause: {{ c.cause }}
   action: {{ c.recommendation }}
{% else %}
No failing metrics.
{% endfor %}
"#;

const PATTERN_TEMPLATE: &str = r#"Pattern analysis
{% for p in patterns %}
- {{ p.metric }} is {{ p.direction }} average for {{ p.dimension }} '{{ p.group }}': {{ p.mean }} vs {{ p.overall_mean }} (gap {{ p.gap }})
{% else %}
No significant patterns.
{% endfor %}
"#;

const DETAILED_TEMPLATE: &str = r#"Detailed evaluation report
==========================
Average score: {{ summary.average_score }} over {{ summary.metric_count }} metrics
{% for name, s in statistics|dictsort %}
- {{ name }}: mean {{ s.mean }}, std {{ s.std }}, range [{{ s.min }}, {{ s.max }}]
{% endfor %}
{% if gate is not none %}

Quality gate: {{ "PASSED" if gate.passed else "FAILED" }}
{% for c in gate.checks %}
[{{ "x" if c.passed else " " }}] {{ c.name }}: {{ c.value }} {{ c.comparison }} {{ c.threshold }}
{% endfor %}
{% endif %}
{% if question_types is not none %}

Question types:
{% for kind, count in question_types|dictsort %}
- {{ kind }}: {{ count }}
{% endfor %}
{% endif %}
{% if low_performers is not none %}

Low performers: {{ low_count }}
{% for case in low_performers %}
- {{ case.test_case_id }} ({{ case.worst_score }}): {{ case.question }}
{% endfor %}
{% endif %}
"#;

fn render(source: &str, context: &Value) -> Result<String, ModuleError> {
  let mut env = Environment::new();
  env.set_trim_blocks(true);
  env.set_lstrip_blocks(true);
  env
    .render_str(source, minijinja::Value::from_serialize(context))
    .map_err(|e| ModuleError::Execution(format!("failed to render report: {}", e)))
}

fn report_output(report: String, summary: Value) -> ModuleOutput {
  object(json!({ "report": report, "summary": summary }))
}

fn report_metadata(id: &str, name: &str, description: &str, requires: &[&str]) -> ModuleMetadata {
  ModuleMetadata::new(id, name)
    .description(description)
    .outputs(&["report", "summary"])
    .requires(requires)
}

/// Renders `statistical_analyzer` output.
///
/// The summary names the metrics with the highest and lowest mean.
pub struct SummaryReport {
  metadata: ModuleMetadata,
}

impl SummaryReport {
  pub fn new() -> Self {
    Self {
      metadata: report_metadata(
        "summary_report",
        "Summary report",
        "Short statistical summary",
        &["statistical_analyzer"],
      )
      .inputs(&["statistics", "summary"]),
    }
  }
}

impl Default for SummaryReport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for SummaryReport {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let upstream = inputs
      .first_with("statistics")
      .ok_or_else(|| ModuleError::MissingInput("statistics".to_string()))?;
    let statistics: BTreeMap<String, MetricStatistics> = field(upstream, "statistics")?;
    let overview: Value = field(upstream, "summary")?;

    let mut best: Option<(&String, f64)> = None;
    let mut worst: Option<(&String, f64)> = None;
    for (name, stats) in &statistics {
      if best.is_none_or(|(_, mean)| stats.mean > mean) {
        best = Some((name, stats.mean));
      }
      if worst.is_none_or(|(_, mean)| stats.mean < mean) {
        worst = Some((name, stats.mean));
      }
    }

    let report = render(
      SUMMARY_TEMPLATE,
      &json!({ "statistics": statistics, "summary": overview }),
    )?;

    Ok(report_output(
      report,
      json!({
        "metric_count": overview.get("metric_count"),
        "average_score": overview.get("average_score"),
        "best_metric": best.map(|(name, _)| name),
        "worst_metric": worst.map(|(name, _)| name),
      }),
    ))
  }
}

/// Renders a quality checker's `checks` as a checklist.
pub struct VerificationReport {
  metadata: ModuleMetadata,
}

impl VerificationReport {
  pub fn new() -> Self {
    Self {
      metadata: report_metadata(
        "verification_report",
        "Verification report",
        "Checklist for a verification gate",
        &[
          "morpheme_quality_checker",
          "embedding_quality_checker",
          "retrieval_quality_checker",
        ],
      )
      .inputs(&["checks", "passed"]),
    }
  }
}

impl Default for VerificationReport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for VerificationReport {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let upstream = inputs
      .first_with("checks")
      .ok_or_else(|| ModuleError::MissingInput("checks".to_string()))?;
    let gate = upstream.get("gate").and_then(Value::as_str).unwrap_or("quality");
    let passed: bool = field(upstream, "passed")?;
    let checks: Vec<Value> = field(upstream, "checks")?;

    let report = render(
      VERIFICATION_TEMPLATE,
      &json!({ "gate": gate, "passed": passed, "checks": checks }),
    )?;

    Ok(report_output(
      report,
      json!({
        "gate": gate,
        "passed": passed,
        "check_count": checks.len(),
        "failed_checks": upstream.get("failed_checks").cloned().unwrap_or(json!([])),
      }),
    ))
  }
}

/// Renders either a search method comparison (`winner`) or a run comparison
/// (`metric_deltas`), whichever the upstream produced.
pub struct ComparisonReport {
  metadata: ModuleMetadata,
}

impl ComparisonReport {
  pub fn new() -> Self {
    Self {
      metadata: report_metadata(
        "comparison_report",
        "Comparison report",
        "Search method or run comparison",
        &["search_comparator", "run_comparator"],
      )
      .inputs(&["winner", "metric_deltas"]),
    }
  }
}

impl Default for ComparisonReport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for ComparisonReport {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    if let Some(search) = inputs.first_with("winner") {
      let context = Value::Object(search.clone());
      let report = render(SEARCH_COMPARISON_TEMPLATE, &context)?;
      return Ok(report_output(
        report,
        json!({
          "kind": "search_methods",
          "winner": search.get("winner"),
          "margin": search.get("margin"),
        }),
      ));
    }

    if let Some(runs) = inputs.first_with("metric_deltas") {
      let context = Value::Object(runs.clone());
      let report = render(RUN_COMPARISON_TEMPLATE, &context)?;
      let count = |key: &str| runs.get(key).and_then(Value::as_array).map_or(0, Vec::len);
      return Ok(report_output(
        report,
        json!({
          "kind": "runs",
          "baseline": runs.get("baseline"),
          "candidate": runs.get("candidate"),
          "improved_count": count("improved"),
          "regressed_count": count("regressed"),
        }),
      ));
    }

    Err(ModuleError::MissingInput("winner or metric_deltas".to_string()))
  }
}

/// Renders root causes (`root_causes`) or detected patterns (`patterns`).
pub struct AnalysisReport {
  metadata: ModuleMetadata,
}

impl AnalysisReport {
  pub fn new() -> Self {
    Self {
      metadata: report_metadata(
        "analysis_report",
        "Analysis report",
        "Root cause or pattern findings",
        &["root_cause_analyzer", "pattern_detector"],
      )
      .inputs(&["root_causes", "patterns"]),
    }
  }
}

impl Default for AnalysisReport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for AnalysisReport {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    if let Some(causes) = inputs.first_with("root_causes") {
      let root_causes: Vec<Value> = field(causes, "root_causes")?;
      let report = render(ROOT_CAUSE_TEMPLATE, &json!({ "root_causes": root_causes }))?;
      return Ok(report_output(
        report,
        json!({
          "kind": "low_metrics",
          "cause_count": root_causes.len(),
          "primary_metric": root_causes.first().and_then(|c| c.get("metric")),
        }),
      ));
    }

    if let Some(found) = inputs.first_with("patterns") {
      let patterns: Vec<Value> = field(found, "patterns")?;
      let report = render(PATTERN_TEMPLATE, &json!({ "patterns": patterns }))?;
      return Ok(report_output(
        report,
        json!({ "kind": "patterns", "pattern_count": patterns.len() }),
      ));
    }

    Err(ModuleError::MissingInput("root_causes or patterns".to_string()))
  }
}

/// Full report combining statistics with whatever else is available:
/// quality gate, question types and low performers.
pub struct DetailedReport {
  metadata: ModuleMetadata,
}

impl DetailedReport {
  pub fn new() -> Self {
    Self {
      metadata: report_metadata(
        "detailed_report",
        "Detailed report",
        "Statistics, quality gate, question types and low performers",
        &[
          "statistical_analyzer",
          "nlp_analyzer",
          "low_performer_extractor",
          "quality_gate",
        ],
      )
      .inputs(&["statistics", "checks", "question_types", "low_performers"]),
    }
  }
}

impl Default for DetailedReport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl AnalysisModule for DetailedReport {
  fn metadata(&self) -> &ModuleMetadata {
    &self.metadata
  }

  async fn execute(
    &self,
    inputs: &ModuleInputs,
    _params: &Params,
  ) -> Result<ModuleOutput, ModuleError> {
    let statistics: Value = upstream_field(inputs, "statistics")?;
    let overview: Value = upstream_field(inputs, "summary")?;
    let gate = inputs
      .first_with("checks")
      .map(|g| Value::Object(g.clone()));
    let question_types: Option<Value> = optional_upstream_field(inputs, "question_types")?;
    let low_performers: Option<Vec<Value>> = optional_upstream_field(inputs, "low_performers")?;
    let low_count: Option<usize> = match inputs.first_with("low_performers") {
      Some(output) => output.get("count").and_then(Value::as_u64).map(|n| n as usize),
      None => None,
    };
    let low_count = low_count.or(low_performers.as_ref().map(Vec::len));

    let report = render(
      DETAILED_TEMPLATE,
      &json!({
        "statistics": statistics,
        "summary": overview,
        "gate": gate,
        "question_types": question_types,
        "low_performers": low_performers,
        "low_count": low_count,
      }),
    )?;

    Ok(report_output(
      report,
      json!({
        "metric_count": overview.get("metric_count"),
        "average_score": overview.get("average_score"),
        "quality_passed": gate.as_ref().and_then(|g| g.get("passed")),
        "low_performer_count": low_count,
        "question_types": question_types,
      }),
    ))
  }
}
