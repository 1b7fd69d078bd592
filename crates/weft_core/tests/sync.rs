// Tests for syncing topology snapshots into the controller.

mod common;

use common::{ScriptExecutor, init_logging};
use serde_json::{Value, json};
use weft_core::{Completion, Controller, Executor, Topology, controls::ControlsCache};

fn outputs<E: Executor, C: ControlsCache>(c: &Controller<E, C>, id: &str) -> Value {
    Value::Object(c.get(id).expect("no record").outputs.clone())
}

// A value produced by `a` flows into `b`.
//
//    -----
//    | a | out y = 2
//    -+---
//     |
//    -+---
//    | b | out z = y * 10
//    -----
fn two_nodes() -> Topology {
    Topology::new()
        .node("a", "out y = 2")
        .node("b", "out z = y * 10")
        .edge("a", "b")
}

#[test]
fn test_sync_propagates_outputs() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let report = pollster::block_on(c.sync_graph(two_nodes()));

    assert_eq!(report.dirty, vec!["a", "b"]);
    assert_eq!(report.completion, Completion::Completed);
    assert_eq!(outputs(&c, "a"), json!({ "y": 2 }));
    assert_eq!(outputs(&c, "b"), json!({ "z": 20 }));
    // `b` is reachable from both seeds but only runs once.
    assert_eq!(exec.count("out z"), 1);
    assert_eq!(exec.last("out z").unwrap().inputs["y"], json!(2));
    assert!(!c.get("a").unwrap().is_evaluating);
}

#[test]
fn test_identical_sync_is_a_no_op() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    pollster::block_on(c.sync_graph(two_nodes()));
    let calls = exec.calls().len();
    let before = c.snapshot();

    let report = pollster::block_on(c.sync_graph(two_nodes()));
    assert!(report.dirty.is_empty());
    assert!(!report.delta.has_changes());
    assert_eq!(exec.calls().len(), calls);
    assert_eq!(c.snapshot(), before);
}

#[test]
fn test_code_edit_reaches_downstream() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let mut topology = two_nodes();
    pollster::block_on(c.sync_graph(topology.clone()));

    assert!(topology.set_code("a", "out y = 5"));
    let report = pollster::block_on(c.sync_graph(topology));
    assert_eq!(report.dirty, vec!["a"]);
    assert_eq!(report.delta.nodes_updated.len(), 1);
    assert_eq!(outputs(&c, "a"), json!({ "y": 5 }));
    assert_eq!(outputs(&c, "b"), json!({ "z": 50 }));
    assert_eq!(c.get("a").unwrap().code, "out y = 5");
}

#[test]
fn test_removed_edge_withdraws_input() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let mut topology = two_nodes();
    pollster::block_on(c.sync_graph(topology.clone()));
    let runs = exec.count("out z");

    topology.remove_edge("a", "b");
    let report = pollster::block_on(c.sync_graph(topology));
    assert_eq!(report.delta.edges_removed.len(), 1);
    assert!(report.dirty.contains(&"b".to_string()));

    assert_eq!(exec.count("out z"), runs + 1);
    assert!(!exec.last("out z").unwrap().inputs.contains_key("y"));
    let b = c.get("b").unwrap();
    assert!(b.failed());
    assert!(b.outputs.is_empty());
    // `a` keeps its outputs.
    assert_eq!(outputs(&c, "a"), json!({ "y": 2 }));
}

#[test]
fn test_failed_source_withdraws_its_outputs() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let mut topology = two_nodes();
    pollster::block_on(c.sync_graph(topology.clone()));
    assert_eq!(exec.last("out z").unwrap().inputs["y"], json!(2));
    let runs = exec.count("out z");

    topology.set_code("a", "out y = nope");
    let report = pollster::block_on(c.sync_graph(topology));
    assert_eq!(report.completion, Completion::Completed);
    assert!(c.get("a").unwrap().failed());

    // The failure does not stop the walk, and `b` runs without `y`.
    assert_eq!(exec.count("out z"), runs + 1);
    assert!(!exec.last("out z").unwrap().inputs.contains_key("y"));
    let b = c.get("b").unwrap();
    assert!(!b.errors.is_empty());
    assert!(b.outputs.is_empty());
}

// Moving an edge re-evaluates both old and new endpoints once each.
//
//    -----  -----         -----  -----
//    | a |  | b |         | a |  | b |
//    -+---  -----   =>    -----  -+---
//     |                          |
//    -+---                      -+---
//    | c |                      | c |
//    -----                      -----
#[test]
fn test_rewired_edge_marks_endpoints_dirty() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let nodes = Topology::new()
        .node("a", "out x = 1")
        .node("b", "out x = 2")
        .node("c", "out y = x");
    pollster::block_on(c.sync_graph(nodes.clone().edge("a", "c")));
    assert_eq!(outputs(&c, "c"), json!({ "y": 1 }));

    let runs = exec.count("out y");
    let report = pollster::block_on(c.sync_graph(nodes.edge("b", "c")));
    assert_eq!(report.dirty, vec!["b", "c", "a"]);
    assert_eq!(exec.count("out y"), runs + 1);
    assert_eq!(outputs(&c, "c"), json!({ "y": 2 }));
}

#[test]
fn test_removed_node_drops_record() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    pollster::block_on(c.sync_graph(two_nodes()));

    let topology = Topology::new().node("b", "out z = y * 10");
    let report = pollster::block_on(c.sync_graph(topology));
    assert_eq!(report.delta.nodes_removed.len(), 1);
    assert!(c.get("a").is_none());
    assert!(!c.snapshot().contains_key("a"));
    assert!(c.get("b").unwrap().failed());
}

#[test]
fn test_empty_code_clears_results() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let mut topology = two_nodes();
    pollster::block_on(c.sync_graph(topology.clone()));
    let calls = exec.count("out y");

    topology.set_code("a", "  \n ");
    pollster::block_on(c.sync_graph(topology));
    let a = c.get("a").unwrap();
    assert!(a.outputs.is_empty());
    assert!(a.errors.is_empty());
    assert!(!a.is_evaluating);
    assert_eq!(exec.count("out y"), calls);
    // Downstream still runs, just without `y`.
    assert!(c.get("b").unwrap().failed());
}

// Cycles and self-loops terminate, each node running once.
//
//    -----
//    | a |<--
//    -+---  |
//     |     |
//    -+---  |
//    | b |---
//    -----
#[test]
fn test_cycle_terminates() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let topology = Topology::new()
        .node("a", "log a")
        .node("b", "log b")
        .node("s", "log s")
        .edge("a", "b")
        .edge("b", "a")
        .edge("s", "s");
    pollster::block_on(c.sync_graph(topology));
    assert_eq!(exec.count("log a"), 1);
    assert_eq!(exec.count("log b"), 1);
    assert_eq!(exec.count("log s"), 1);

    let cyclic = c.index().cyclic_nodes();
    assert!(cyclic.contains("a"));
    assert!(cyclic.contains("b"));
    assert!(cyclic.contains("s"));
}

#[test]
fn test_dangling_edge_is_tolerated() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let topology = Topology::new()
        .node("a", "out x = ghost")
        .edge("ghost", "a");
    let report = pollster::block_on(c.sync_graph(topology));
    assert_eq!(report.completion, Completion::Completed);
    assert!(c.get("ghost").is_none());
    assert!(c.get("a").unwrap().failed());
}

#[test]
fn test_later_source_wins_on_collision() {
    init_logging();
    let exec = ScriptExecutor::new();
    let c = Controller::new(&exec);
    let topology = Topology::new()
        .node("a", "out x = 1")
        .node("b", "out x = 2")
        .node("c", "out y = x")
        .edge("a", "c")
        .edge("b", "c");
    pollster::block_on(c.sync_graph(topology));
    // With a shared visited set `c` only saw `a` during the sync.
    assert_eq!(outputs(&c, "c"), json!({ "y": 1 }));
    pollster::block_on(c.evaluate_node("c"));
    assert_eq!(outputs(&c, "c"), json!({ "y": 2 }));
}
