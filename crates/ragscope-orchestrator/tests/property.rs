mod common;

use std::collections::BTreeSet;

use common::{TestModule, call_log, orchestrator};
use proptest::prelude::*;
use ragscope_config::{Intent, NodeDef};
use ragscope_orchestrator::{NodeStatus, OrchestratorConfig};
use ragscope_pipeline::{Node, PipelineTemplate};

/// A random DAG: node `i` may only depend on nodes `< i`, plus a failing flag
/// per node.
fn dag() -> impl Strategy<Value = Vec<(Vec<usize>, bool)>> {
  (1usize..12).prop_flat_map(|n| {
    (0..n)
      .map(|i| {
        (
          proptest::collection::btree_set(0..i.max(1), 0..=i.min(3)),
          proptest::bool::weighted(0.2),
        )
          .prop_map(move |(deps, fails)| {
            let deps = if i == 0 { Vec::new() } else { deps.into_iter().collect() };
            (deps, fails)
          })
      })
      .collect::<Vec<_>>()
  })
}

fn node_id(i: usize) -> String {
  format!("n{:02}", i)
}

/// Declaration order is shuffled by reversing, so it differs from index order.
fn build(shape: &[(Vec<usize>, bool)]) -> PipelineTemplate {
  let nodes: Vec<Node> = shape
    .iter()
    .enumerate()
    .rev()
    .map(|(i, (deps, _))| {
      let id = node_id(i);
      let deps: Vec<String> = deps.iter().map(|d| node_id(*d)).collect();
      let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
      Node::from(NodeDef::new(&id, &id, &id, &deps))
    })
    .collect();
  PipelineTemplate::new(Intent::GenerateSummary, "random", "", nodes)
}

/// Transitive closure of `roots` over the dependents relation.
fn downstream(shape: &[(Vec<usize>, bool)], roots: &BTreeSet<usize>) -> BTreeSet<usize> {
  let mut reached = roots.clone();
  // Dependencies always point to lower indexes, so one ascending pass suffices.
  for (i, (deps, _)) in shape.iter().enumerate() {
    if deps.iter().any(|d| reached.contains(d)) {
      reached.insert(i);
    }
  }
  reached
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn test_every_node_runs_after_its_dependencies(
    shape in dag(),
    concurrency in 1usize..4,
  ) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let log = call_log();

    let mut orch = orchestrator(build(&shape))
      .with_config(OrchestratorConfig::default().with_max_concurrency(concurrency));
    for i in 0..shape.len() {
      orch.register_module(TestModule::ok(&node_id(i), &log));
    }

    let run = runtime.block_on(orch.analyze_intent(Intent::GenerateSummary, "q", Some("r"))).unwrap();
    prop_assert!(run.is_complete);

    let order = log.lock().unwrap().clone();
    prop_assert_eq!(order.len(), shape.len());
    for (i, (deps, _)) in shape.iter().enumerate() {
      let at = order.iter().position(|id| *id == node_id(i)).unwrap();
      for dep in deps {
        let dep_at = order.iter().position(|id| *id == node_id(*dep)).unwrap();
        prop_assert!(dep_at < at, "{} ran before its dependency {}", node_id(i), node_id(*dep));
      }
    }
  }

  #[test]
  fn test_failures_skip_exactly_their_descendants(shape in dag()) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let log = call_log();

    let mut orch = orchestrator(build(&shape));
    for (i, (_, fails)) in shape.iter().enumerate() {
      let module = if *fails {
        TestModule::failing(&node_id(i), "injected", &log)
      } else {
        TestModule::ok(&node_id(i), &log)
      };
      orch.register_module(module);
    }

    let run = runtime.block_on(orch.analyze_intent(Intent::GenerateSummary, "q", Some("r"))).unwrap();

    let failing: BTreeSet<usize> = shape.iter().enumerate().filter(|(_, (_, f))| *f).map(|(i, _)| i).collect();
    let affected = downstream(&shape, &failing);

    for i in 0..shape.len() {
      let status = run.status(&node_id(i)).unwrap();
      if !affected.contains(&i) {
        prop_assert_eq!(status, NodeStatus::Completed);
      } else if failing.contains(&i) {
        // A failing node is skipped instead when one of its ancestors failed first.
        prop_assert!(status == NodeStatus::Failed || status == NodeStatus::Skipped);
      } else {
        prop_assert_eq!(status, NodeStatus::Skipped);
      }
    }
    // Failing nodes with a healthy upstream are the only ones that actually run and fail.
    let first_failures = failing
      .iter()
      .filter(|f| !shape[**f].0.iter().any(|d| affected.contains(d)))
      .count();
    prop_assert_eq!(run.nodes_with_status(NodeStatus::Failed).len(), first_failures);
    prop_assert_eq!(run.is_complete, failing.is_empty());
  }
}
