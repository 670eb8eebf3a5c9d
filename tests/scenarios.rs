//! End-to-end scenario tests against the literal fixtures and expected
//! tuple sets used throughout the crate's design: two Persons, two Cities,
//! and the friend/visit/war edges connecting them.

use std::collections::HashSet;
use std::sync::Arc;

use graphcore::builder::{EdgeDirection, ExpressionBuilder, Pattern};
use graphcore::config::Config;
use graphcore::execution::QueryTimeout;
use graphcore::graph::{Graph, NodeId, SyncPolicy};
use graphcore::reachability;
use graphcore::runtime::Runtime;
use graphcore::value::AttributeSet;

fn fixture() -> Graph {
    let graph = Graph::new(Arc::new(Runtime::default()), Config::default().graph);
    let p0 = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
    let p1 = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
    let c2 = graph.create_node(&["City"], AttributeSet::new()).unwrap();
    let c3 = graph.create_node(&["City"], AttributeSet::new()).unwrap();
    assert_eq!((p0.0, p1.0, c2.0, c3.0), (0, 1, 2, 3));

    graph.create_edge("friend", p0, p1, AttributeSet::new()).unwrap();
    graph.create_edge("friend", p1, p0, AttributeSet::new()).unwrap();
    graph.create_edge("visit", p0, c2, AttributeSet::new()).unwrap();
    graph.create_edge("visit", p0, c3, AttributeSet::new()).unwrap();
    graph.create_edge("visit", p1, c2, AttributeSet::new()).unwrap();
    graph.create_edge("war", c2, c3, AttributeSet::new()).unwrap();
    graph.create_edge("war", c3, c2, AttributeSet::new()).unwrap();
    graph
}

fn pairs(rows: &[(u64, u64)]) -> HashSet<(u64, u64)> {
    rows.iter().copied().collect()
}

fn pattern_person_friend_person_visit_city_war_city() -> Pattern {
    Pattern::new()
        .node("p", Some("Person"))
        .node("f", Some("Person"))
        .node("c", Some("City"))
        .node("e", Some("City"))
        .edge(Some("e1"), "p", Some("friend"), "f", EdgeDirection::Out)
        .edge(Some("e2"), "f", Some("visit"), "c", EdgeDirection::Out)
        .edge(Some("e3"), "c", Some("war"), "e", EdgeDirection::Out)
}

#[test]
fn s1_adjacency_matches_every_inserted_edge() {
    let graph = fixture();
    graph.sync(SyncPolicy::FlushResize).unwrap();
    let guard = graph.read();
    let adjacency = guard.adjacency().snapshot().unwrap();

    let got: HashSet<(u64, u64)> =
        adjacency.iter().map(|(r, c, _)| (r as u64, c as u64)).collect();
    let expected = pairs(&[(0, 1), (1, 0), (0, 2), (0, 3), (1, 2), (2, 3), (3, 2)]);
    assert_eq!(got, expected);
}

#[test]
fn s2_pattern_with_no_intermediate_return_yields_the_expected_tuples() {
    let graph = fixture();
    let pattern = pattern_person_friend_person_visit_city_war_city().returning(&["p", "e"]);

    let rows = graphcore::query(&graph, &pattern, SyncPolicy::FlushResize, &QueryTimeout::infinite()).unwrap();

    let got: HashSet<(u64, u64)> =
        rows.iter().map(|r| (r.get("p").unwrap().0, r.get("e").unwrap().0)).collect();
    let expected = pairs(&[(1, 2), (0, 3), (1, 3)]);
    assert_eq!(got, expected);
}

#[test]
fn s3_pattern_with_intermediate_return_splits_into_two_expressions() {
    let graph = fixture();
    let pattern = pattern_person_friend_person_visit_city_war_city().returning(&["p", "c", "e"]);

    let expressions = ExpressionBuilder::new().build(&pattern, graph.runtime()).unwrap();
    assert_eq!(expressions.len(), 2);
    assert_eq!(expressions[0].source(), "p");
    assert_eq!(expressions[0].destination(), "c");
    assert_eq!(expressions[1].source(), "c");
    assert_eq!(expressions[1].destination(), "e");
}

#[test]
fn s4_undirected_edge_matches_both_directions() {
    let graph = fixture();
    let pattern = Pattern::new()
        .node("p", Some("Person"))
        .node("c", Some("City"))
        .edge(Some("e1"), "p", Some("visit"), "c", EdgeDirection::Undirected)
        .returning(&["p", "c"]);

    let rows = graphcore::query(&graph, &pattern, SyncPolicy::FlushResize, &QueryTimeout::infinite()).unwrap();

    let got: HashSet<(u64, u64)> =
        rows.iter().map(|r| (r.get("p").unwrap().0, r.get("c").unwrap().0)).collect();
    let expected = pairs(&[(0, 2), (0, 3), (1, 2), (2, 0), (2, 1), (3, 0)]);
    assert_eq!(got, expected);
}

#[test]
fn s5_reachability_respects_edge_direction() {
    let graph = fixture();
    assert!(reachability::reachable(&graph, NodeId(0), NodeId(3)).unwrap());
    assert!(!reachability::reachable(&graph, NodeId(2), NodeId(0)).unwrap());
}

#[test]
fn s6_delta_round_trip_settles_to_the_net_insert_count() {
    use graphcore::delta::DeltaMatrix;

    let mut d = DeltaMatrix::new(16);
    for i in 0..10u64 {
        d.set(0, i as usize, i).unwrap();
    }
    for i in 0..3u64 {
        d.unset(0, i as usize, i).unwrap();
    }
    d.flush().unwrap();

    assert_eq!(d.pending_ratio(), 0.0);
    let snapshot = d.snapshot().unwrap();
    assert_eq!(snapshot.nnz(), 7);
    let remaining: HashSet<usize> = snapshot.row_iter(0).map(|(col, _)| col).collect();
    assert_eq!(remaining, (3..10).collect());
}
