//! # graphcore REPL
//!
//! A small interactive shell over [`graphcore::graph::Graph`] for exercising
//! `ingest` / `evaluate` / `reachable` without a Cypher front end — parsing
//! query text and dispatching commands over a wire protocol is out of scope
//! for this crate, so this binary talks to the graph API directly rather
//! than accepting Cypher.
//!
//! ```bash
//! cargo run --bin graphcore
//! ```
//!
//! Commands:
//! - `.demo`                        — loads a demo fixture (persons/cities/friend/visit/war)
//! - `.node <Label>`                — creates a node with one label
//! - `.edge <src> <REL> <dst>`      — creates an edge between two node ids
//! - `.reachable <src> <dst>`       — runs the BFS reachability kernel
//! - `.match`                       — runs the demo pattern against the loaded graph
//! - `.stats`                       — node/edge/label/relation counts
//! - `.checkpoint`                  — snapshots to the configured data directory
//! - `.help` / `.quit`

use std::io::{self, Write};
use std::sync::Arc;

use graphcore::builder::{EdgeDirection, ExpressionBuilder, Pattern};
use graphcore::config::Config;
use graphcore::evaluator::ExpressionEvaluator;
use graphcore::execution::{ExecutionConfig, QueryTimeout};
use graphcore::graph::{EdgeId, Graph, GraphError, NodeId, SyncPolicy};
use graphcore::optimizer::ExpressionOptimizer;
use graphcore::reachability;
use graphcore::runtime::Runtime;
use graphcore::value::AttributeSet;

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() {
    let config = Config::load().unwrap_or_else(|_| Config::default());
    init_logging(&config);

    println!("graphcore REPL");
    println!("==============\n");
    println!("Type .help for available commands.\n");

    let runtime = Arc::new(Runtime::default());
    let mut graph = Graph::new(runtime, config.graph.clone());

    loop {
        print!("> ");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).unwrap_or(0) == 0 {
            println!();
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        match parts.next().unwrap_or("") {
            ".quit" | ".exit" => {
                println!("Goodbye!");
                break;
            }
            ".help" => print_help(),
            ".demo" => {
                graph = load_demo_graph();
                println!("Loaded the demo fixture: 2 Person nodes, 2 City nodes, friend/visit/war edges.");
            }
            ".node" => match parts.next() {
                Some(label) => match graph.create_node(&[label], AttributeSet::new()) {
                    Ok(id) => println!("created {id}"),
                    Err(e) => println!("error: {e}"),
                },
                None => println!("usage: .node <Label>"),
            },
            ".edge" => {
                let (src, rel, dst) = (parts.next(), parts.next(), parts.next());
                match (src, rel, dst) {
                    (Some(src), Some(rel), Some(dst)) => match parse_and_create_edge(&graph, src, rel, dst) {
                        Ok(id) => println!("created {id}"),
                        Err(e) => println!("error: {e}"),
                    },
                    _ => println!("usage: .edge <src-id> <RELATION> <dst-id>"),
                }
            }
            ".reachable" => {
                let (src, dst) = (parts.next(), parts.next());
                match (src.and_then(parse_node_id), dst.and_then(parse_node_id)) {
                    (Some(src), Some(dst)) => match reachability::reachable(&graph, src, dst) {
                        Ok(yes) => println!("{yes}"),
                        Err(e) => println!("error: {e}"),
                    },
                    _ => println!("usage: .reachable <src-id> <dst-id>"),
                }
            }
            ".match" => run_demo_pattern(&graph),
            ".stats" => print_stats(&graph),
            ".checkpoint" => match graph.checkpoint() {
                Ok(()) => println!("checkpointed to {:?}", config.storage.data_dir),
                Err(e) => println!("error: {e} (open the graph with a data directory first)"),
            },
            other => println!("unknown command: {other} (try .help)"),
        }
    }
}

fn print_help() {
    println!("\nCommands:");
    println!("  .demo                       load the demo fixture");
    println!("  .node <Label>               create a labeled node");
    println!("  .edge <src> <REL> <dst>     create an edge between two node ids");
    println!("  .reachable <src> <dst>      BFS reachability between two node ids");
    println!("  .match                      run the demo pattern");
    println!("  .stats                      node/edge/label/relation counts");
    println!("  .checkpoint                 snapshot to the configured data directory");
    println!("  .help                       show this help");
    println!("  .quit                       exit\n");
}

fn parse_node_id(s: &str) -> Option<NodeId> {
    s.parse::<u64>().ok().map(NodeId)
}

fn parse_and_create_edge(graph: &Graph, src: &str, rel: &str, dst: &str) -> Result<EdgeId, GraphError> {
    let src = parse_node_id(src).ok_or_else(|| GraphError::InvalidArgument(format!("bad node id: {src}")))?;
    let dst = parse_node_id(dst).ok_or_else(|| GraphError::InvalidArgument(format!("bad node id: {dst}")))?;
    graph.create_edge(rel, src, dst, AttributeSet::new())
}

/// Builds a small demo graph: two Persons, two Cities, and the
/// friend/visit/war edges used throughout the bundled scenario tests.
fn load_demo_graph() -> Graph {
    let graph = Graph::new(Arc::new(Runtime::default()), Config::default().graph);
    let p0 = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
    let p1 = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
    let c2 = graph.create_node(&["City"], AttributeSet::new()).unwrap();
    let c3 = graph.create_node(&["City"], AttributeSet::new()).unwrap();

    graph.create_edge("friend", p0, p1, AttributeSet::new()).unwrap();
    graph.create_edge("friend", p1, p0, AttributeSet::new()).unwrap();
    graph.create_edge("visit", p0, c2, AttributeSet::new()).unwrap();
    graph.create_edge("visit", p0, c3, AttributeSet::new()).unwrap();
    graph.create_edge("visit", p1, c2, AttributeSet::new()).unwrap();
    graph.create_edge("war", c2, c3, AttributeSet::new()).unwrap();
    graph.create_edge("war", c3, c2, AttributeSet::new()).unwrap();
    graph
}

/// Runs the demo pattern —
/// `(p:Person)-[:friend]->(f:Person)-[:visit]->(c:City)-[:war]->(e:City)`
/// returning `(p,e)` — against whatever graph is currently loaded.
fn run_demo_pattern(graph: &Graph) {
    let pattern = Pattern::new()
        .node("p", Some("Person"))
        .node("f", Some("Person"))
        .node("c", Some("City"))
        .node("e", Some("City"))
        .edge(Some("e1"), "p", Some("friend"), "f", EdgeDirection::Out)
        .edge(Some("e2"), "f", Some("visit"), "c", EdgeDirection::Out)
        .edge(Some("e3"), "c", Some("war"), "e", EdgeDirection::Out)
        .returning(&["p", "e"]);

    let expressions = match ExpressionBuilder::new().build(&pattern, graph.runtime()) {
        Ok(e) => e,
        Err(e) => {
            println!("error building pattern: {e}");
            return;
        }
    };

    let guard = graph.read();
    let evaluator = ExpressionEvaluator::new(graph).with_limits(ExecutionConfig::default().limits);
    let cardinality = evaluator.cardinality_source(&guard);
    let optimizer = ExpressionOptimizer::new();
    let rewritten: Vec<_> = expressions.into_iter().map(|e| optimizer.optimize(e, &cardinality)).collect();
    drop(guard);

    match evaluator.evaluate(&rewritten, SyncPolicy::FlushResize, &QueryTimeout::infinite()) {
        Ok(rows) => {
            println!("Results:");
            for row in rows {
                let p = row.get("p").map(|n| n.to_string()).unwrap_or_default();
                let e = row.get("e").map(|n| n.to_string()).unwrap_or_default();
                println!("  (p={p}, e={e})");
            }
        }
        Err(e) => println!("error evaluating pattern: {e}"),
    }
}

fn print_stats(graph: &Graph) {
    let guard = graph.read();
    println!("nodes:     {}", guard.node_count());
    println!("edges:     {}", guard.edge_count());
    println!("labels:    {}", graph.runtime().label_count());
    println!("relations: {}", graph.runtime().relation_count());
}
