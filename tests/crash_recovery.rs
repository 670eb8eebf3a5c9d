//! WAL replay, snapshot round-trip, and corruption handling across a
//! simulated crash: write through one `Graph::open`, drop it without a
//! clean shutdown, reopen a fresh one against the same data directory.

use std::fs;
use std::sync::Arc;

use graphcore::config::Config;
use graphcore::graph::{Graph, GraphError, NodeId, SyncPolicy};
use graphcore::runtime::Runtime;
use graphcore::storage::StorageError;
use graphcore::value::AttributeSet;
use tempfile::TempDir;

fn open(dir: &std::path::Path) -> Graph {
    Graph::open(Arc::new(Runtime::default()), Config::default().graph, dir).unwrap()
}

#[test]
fn wal_recovers_writes_that_were_never_checkpointed() {
    let temp = TempDir::new().unwrap();

    {
        let graph = open(temp.path());
        let a = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        let b = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        graph.create_edge("friend", a, b, AttributeSet::new()).unwrap();
        // Dropped here with no checkpoint — only the WAL has this data.
    }

    let recovered = open(temp.path());
    assert_eq!(recovered.node_count(), 2);
    assert_eq!(recovered.edge_count(), 1);
    recovered.sync(SyncPolicy::FlushResize).unwrap();
    let guard = recovered.read();
    assert!(guard.adjacency().snapshot().unwrap().contains(0, 1));
}

#[test]
fn checkpoint_clears_the_wal_so_a_third_open_does_not_double_apply() {
    let temp = TempDir::new().unwrap();

    {
        let graph = open(temp.path());
        graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        graph.checkpoint().unwrap();
    }

    {
        let graph = open(temp.path());
        assert_eq!(graph.node_count(), 1);
        graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        // Not checkpointed — only the second node lives in the fresh WAL.
    }

    let graph = open(temp.path());
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn truncated_wal_entry_is_reported_as_a_typed_corruption_error() {
    let temp = TempDir::new().unwrap();

    {
        let graph = open(temp.path());
        let a = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        let b = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        graph.create_edge("friend", a, b, AttributeSet::new()).unwrap();
    }

    let wal_path = temp.path().join("wal/current.wal");
    let content = fs::read_to_string(&wal_path).unwrap();
    assert!(content.len() > 10);
    fs::write(&wal_path, &content[..content.len() - 10]).unwrap();

    let err = Graph::open(Arc::new(Runtime::default()), Config::default().graph, temp.path()).unwrap_err();
    assert!(matches!(err, GraphError::Storage(StorageError::CorruptWal { .. })));
}

#[test]
fn corrupted_snapshot_bytes_are_rejected_rather_than_silently_loaded() {
    let temp = TempDir::new().unwrap();

    {
        let graph = open(temp.path());
        graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        graph.checkpoint().unwrap();
    }

    let snapshot_path = temp.path().join("snapshot.bin");
    let mut bytes = fs::read(&snapshot_path).unwrap();
    bytes[0] ^= 0xFF;
    fs::write(&snapshot_path, bytes).unwrap();

    let err = Graph::open(Arc::new(Runtime::default()), Config::default().graph, temp.path()).unwrap_err();
    assert!(matches!(err, GraphError::Storage(StorageError::Codec(_))));
}

#[test]
fn missing_data_dir_is_created_on_first_open() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("nested").join("graph");
    assert!(!nested.exists());

    let graph = open(&nested);
    assert_eq!(graph.node_count(), 0);
    assert!(nested.exists());
}

#[test]
fn checkpoint_and_reopen_preserves_edges_and_attrs_across_several_generations() {
    let temp = TempDir::new().unwrap();

    {
        let graph = open(temp.path());
        let a = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        let b = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
        graph.create_edge("friend", a, b, AttributeSet::new()).unwrap();
        graph.checkpoint().unwrap();
    }

    {
        let graph = open(temp.path());
        let c = graph.create_node(&["City"], AttributeSet::new()).unwrap();
        graph.create_edge("visit", NodeId(0), c, AttributeSet::new()).unwrap();
        graph.checkpoint().unwrap();
    }

    let graph = open(temp.path());
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    graph.sync(SyncPolicy::FlushResize).unwrap();
    let guard = graph.read();
    let adjacency = guard.adjacency().snapshot().unwrap();
    assert!(adjacency.contains(0, 1));
    assert!(adjacency.contains(0, 2));
}
