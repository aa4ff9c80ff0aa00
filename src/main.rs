use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragscope_module::{ModuleRegistry, Params};
use ragscope_modules::register_builtin;
use ragscope_orchestrator::{Orchestrator, OrchestratorConfig};
use ragscope_pipeline::TemplateCatalog;
use ragscope_store::{JsonFileStore, MemoryStore, RunStore};

/// ragscope - intent-driven analysis pipelines over RAG evaluation runs
#[derive(Parser)]
#[command(name = "ragscope")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.ragscope)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Evaluation runs file (default: <data_dir>/runs.json)
  #[arg(long, global = true)]
  runs: Option<PathBuf>,

  /// Orchestrator config file (JSON)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Extra pipeline templates (JSON array); they replace built-ins per intent
  #[arg(long, global = true)]
  templates: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the analysis pipeline for a query
  Analyze {
    /// Free-text request, classified into an intent unless --intent is given
    query: String,

    /// Intent wire name, e.g. GENERATE_SUMMARY
    #[arg(long)]
    intent: Option<String>,

    /// Evaluation run to analyze
    #[arg(long)]
    run_id: Option<String>,

    /// Second run for COMPARE_RUNS
    #[arg(long)]
    compare_run_id: Option<String>,
  },

  /// List intents and whether their pipelines can run
  Intents,

  /// Print the pipeline template of an intent
  Template {
    /// Intent wire name
    intent: String,
  },

  /// List registered analysis modules
  Modules,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let Some(command) = cli.command else {
    println!("ragscope - use --help to see available commands");
    return Ok(());
  };

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".ragscope"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let orchestrator = build_orchestrator(
      &data_dir,
      cli.runs.as_deref(),
      cli.config.as_deref(),
      cli.templates.as_deref(),
    )
    .await?;

    match command {
      Commands::Analyze {
        query,
        intent,
        run_id,
        compare_run_id,
      } => analyze(&orchestrator, &query, intent, run_id, compare_run_id).await,
      Commands::Intents => print_json(&orchestrator.intent_availability()),
      Commands::Template { intent } => {
        let intent = Orchestrator::parse_intent(&intent)?;
        let template = orchestrator
          .get_pipeline_template(intent)
          .with_context(|| format!("no pipeline template for intent {}", intent))?;
        print_json(&template.to_def())
      }
      Commands::Modules => print_json(&orchestrator.registry().list_metadata()),
    }
  })
}

async fn build_orchestrator(
  data_dir: &Path,
  runs: Option<&Path>,
  config: Option<&Path>,
  templates: Option<&Path>,
) -> Result<Orchestrator> {
  let store = open_store(data_dir, runs).await?;

  let mut catalog = TemplateCatalog::builtin();
  if let Some(path) = templates {
    let content = tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read templates file: {}", path.display()))?;
    let extra = TemplateCatalog::from_json(&content)
      .with_context(|| format!("failed to parse templates file: {}", path.display()))?;
    info!(count = extra.len(), path = %path.display(), "templates loaded");
    catalog.extend(extra);
  }

  let config = match config {
    Some(path) => {
      let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
      serde_json::from_str::<OrchestratorConfig>(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?
    }
    None => OrchestratorConfig::default(),
  };

  let mut registry = ModuleRegistry::new();
  register_builtin(&mut registry, store);

  Ok(
    Orchestrator::new(catalog)
      .with_registry(registry)
      .with_config(config),
  )
}

/// An explicit `--runs` file must exist; the default one may be absent.
async fn open_store(data_dir: &Path, runs: Option<&Path>) -> Result<Arc<dyn RunStore>> {
  let (path, explicit) = match runs {
    Some(path) => (path.to_path_buf(), true),
    None => (data_dir.join("runs.json"), false),
  };

  if !explicit && !tokio::fs::try_exists(&path).await.unwrap_or(false) {
    warn!(path = %path.display(), "runs file not found, starting with an empty store");
    return Ok(Arc::new(MemoryStore::new()));
  }

  let store = JsonFileStore::open(&path)
    .await
    .with_context(|| format!("failed to open runs file: {}", path.display()))?;
  Ok(Arc::new(store))
}

async fn analyze(
  orchestrator: &Orchestrator,
  query: &str,
  intent: Option<String>,
  run_id: Option<String>,
  compare_run_id: Option<String>,
) -> Result<()> {
  let intent = match intent {
    Some(value) => Orchestrator::parse_intent(&value)?,
    None => orchestrator.classify(query)?,
  };

  let mut params = Params::new();
  if let Some(run_id) = run_id {
    params.insert("run_id".to_string(), run_id.into());
  }
  if let Some(compare_run_id) = compare_run_id {
    params.insert("compare_run_id".to_string(), compare_run_id.into());
  }

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling run");
      ctrl_c.cancel();
    }
  });

  let run = orchestrator
    .analyze_with_cancel(intent, query, params, cancel)
    .await
    .context("analysis failed")?;

  eprintln!(
    "Run {} ({}) finished in {:.1}ms",
    run.run_id,
    run.intent,
    run.total_duration.as_secs_f64() * 1000.0
  );
  print_json(&run)?;

  if !run.is_complete {
    bail!("pipeline did not complete: {} node(s) failed or skipped", incomplete(&run));
  }
  Ok(())
}

fn incomplete(run: &ragscope_orchestrator::PipelineRun) -> usize {
  run
    .node_results
    .iter()
    .filter(|r| r.status != ragscope_orchestrator::NodeStatus::Completed)
    .count()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
