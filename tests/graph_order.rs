use homeport::{MigrateError, Resource, ResourceGraph, ResourceKind};
use pretty_assertions::assert_eq;

fn kind() -> ResourceKind {
    ResourceKind::new("aws", "s3_bucket")
}

/// Nodes and `(dependent, dependency)` edges, inserted in the given order.
fn build(nodes: &[&str], edges: &[(&str, &str)]) -> ResourceGraph {
    let mut graph = ResourceGraph::new();
    for id in nodes {
        graph.add(&Resource::new(*id, *id, kind()));
    }
    for (from, to) in edges {
        graph.add_edge(from, to).unwrap();
    }
    graph
}

const NODES: &[&str] = &["api", "assets", "cache", "db", "edge", "queue", "worker"];
const EDGES: &[(&str, &str)] = &[
    ("api", "db"),
    ("api", "cache"),
    ("api", "assets"),
    ("worker", "queue"),
    ("worker", "db"),
    ("edge", "api"),
    ("db", "assets"),
];

#[test]
fn dependencies_always_come_first() {
    let order = build(NODES, EDGES).topological_order().unwrap();
    assert_eq!(order.len(), NODES.len());
    let at = |id: &str| order.iter().position(|n| n == id).unwrap();
    for (from, to) in EDGES {
        assert!(at(to) < at(from), "{to} must precede {from} in {order:?}");
    }
}

#[test]
fn insertion_order_does_not_change_the_result() {
    let expected = build(NODES, EDGES).topological_order().unwrap();

    let mut nodes = NODES.to_vec();
    let mut edges = EDGES.to_vec();
    for shift in 1..nodes.len() {
        nodes.rotate_left(1);
        let len = edges.len();
        edges.rotate_right(shift % len);
        assert_eq!(build(&nodes, &edges).topological_order().unwrap(), expected);
    }
    nodes.reverse();
    edges.reverse();
    assert_eq!(build(&nodes, &edges).topological_order().unwrap(), expected);
}

#[test]
fn chain_example_orders_c_b_a() {
    let graph = build(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
    assert_eq!(graph.topological_order().unwrap(), ["C", "B", "A"]);
    assert_eq!(graph.dependencies("A"), ["B"]);
    assert_eq!(graph.dependents("C"), ["B"]);
}

#[test]
fn two_node_cycle_names_both_nodes() {
    let graph = build(&["X", "Y"], &[("X", "Y"), ("Y", "X")]);
    let err = graph.topological_order().unwrap_err();
    assert!(matches!(err, MigrateError::CircularDependency { .. }));
    assert_eq!(err.cycle_members().unwrap(), ["X", "Y"]);
}

#[test]
fn cycle_payload_is_exactly_the_unvisited_nodes() {
    // "top" depends on the cycle and is never placed; "base" is
    let graph = build(
        &["base", "left", "right", "top"],
        &[("left", "right"), ("right", "left"), ("left", "base"), ("top", "left")],
    );
    let err = graph.topological_order().unwrap_err();
    assert_eq!(err.cycle_members().unwrap(), ["left", "right", "top"]);
}

#[test]
fn sorting_is_repeatable_and_leaves_the_graph_untouched() {
    let graph = build(NODES, EDGES);
    let snapshot = graph.clone();
    let first = graph.topological_order().unwrap();
    let second = graph.topological_order().unwrap();
    assert_eq!(first, second);
    for id in NODES {
        assert_eq!(graph.dependencies(id), snapshot.dependencies(id));
        assert_eq!(graph.dependents(id), snapshot.dependents(id));
    }
}

#[test]
fn edges_to_unknown_nodes_are_rejected() {
    let mut graph = build(&["api"], &[]);
    let err = graph.add_edge("api", "ghost").unwrap_err();
    assert!(matches!(err, MigrateError::UnknownNode { ref id } if id == "ghost"));
}
