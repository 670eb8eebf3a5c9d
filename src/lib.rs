//! # graphcore
//!
//! A property graph store backed by sparse boolean matrices, queried
//! through a small algebra of matrix multiply/add/transpose rather than a
//! row-at-a-time join executor.
//!
//! ## Pipeline
//!
//! ```text
//! Pattern (nodes + edges, a small graph of its own)
//!     ↓
//! [builder::ExpressionBuilder]      → Vec<AlgebraicExpression>
//!     ↓
//! [optimizer::ExpressionOptimizer]  → rewritten (transpose push-down,
//!                                      distributivity, redundant-diagonal
//!                                      elimination)
//!     ↓
//! [evaluator::ExpressionEvaluator]  → Vec<ResultTuple>
//! ```
//!
//! Every expression bottoms out at a leaf [`algebra::Operand`] naming one of
//! three concrete matrices a [`graph::Graph`] owns: a label's diagonal, a
//! relation's adjacency, or the graph-wide union adjacency
//! ([`graph::GraphReadGuard::adjacency`]). [`reachability`] is the
//! representative consumer that talks to the matrix layer directly, for
//! callers that want a BFS-style traversal rather than a full pattern match.
//!
//! ## Storage
//!
//! [`graph::Graph`] is append-mostly ground truth ([`datablock::DataBlock`]
//! records for nodes/edges) plus derived index matrices
//! ([`store::LabelStore`]/[`store::RelationStore`]) layered with
//! [`delta::DeltaMatrix`] overlays so a write never blocks a reader holding
//! an in-flight evaluation. [`storage`] durably logs every mutation to a
//! write-ahead log and periodically checkpoints to a binary snapshot;
//! [`graph::Graph::open`] replays both on startup.
//!
//! ## Configuration and logging
//!
//! [`config::Config`] loads from `config.toml` + `config.local.toml` +
//! `GRAPHCORE_*` environment overrides (via `figment`). The crate logs
//! through `tracing`; see `main.rs` for the subscriber setup used by the
//! bundled CLI.
//!
//! ## Example
//!
//! ```rust
//! use graphcore::builder::{EdgeDirection, ExpressionBuilder, Pattern};
//! use graphcore::config::Config;
//! use graphcore::evaluator::ExpressionEvaluator;
//! use graphcore::execution::QueryTimeout;
//! use graphcore::graph::{Graph, SyncPolicy};
//! use graphcore::runtime::Runtime;
//! use graphcore::value::AttributeSet;
//! use std::sync::Arc;
//!
//! let graph = Graph::new(Arc::new(Runtime::default()), Config::default().graph);
//! let alice = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
//! let bob = graph.create_node(&["Person"], AttributeSet::new()).unwrap();
//! graph.create_edge("KNOWS", alice, bob, AttributeSet::new()).unwrap();
//!
//! let pattern = Pattern::new()
//!     .node("p", Some("Person"))
//!     .node("q", Some("Person"))
//!     .edge(None, "p", Some("KNOWS"), "q", EdgeDirection::Out)
//!     .returning(&["p", "q"]);
//! let expressions = ExpressionBuilder::new().build(&pattern, graph.runtime()).unwrap();
//!
//! let evaluator = ExpressionEvaluator::new(&graph);
//! let rows = evaluator
//!     .evaluate(&expressions, SyncPolicy::FlushResize, &QueryTimeout::infinite())
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

pub mod algebra;
pub mod builder;
pub mod config;
pub mod datablock;
pub mod delta;
pub mod evaluator;
pub mod execution;
pub mod graph;
pub mod matrix;
pub mod optimizer;
pub mod reachability;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod value;

use thiserror::Error;

/// Aggregates every subsystem error behind one type, mirroring the way
/// [`graph::GraphError`] itself folds in [`matrix::MatrixError`]/
/// [`delta::DeltaError`]/[`datablock::DataBlockError`]/[`runtime::RuntimeError`]/
/// [`storage::StorageError`] one level down. A caller driving the whole
/// pattern → expressions → result-tuples pipeline only needs to match this
/// one enum rather than threading each subsystem's error type through by hand.
#[derive(Debug, Error)]
pub enum GraphCoreError {
    #[error(transparent)]
    Graph(#[from] graph::GraphError),

    #[error(transparent)]
    Algebra(#[from] builder::AlgebraError),

    #[error(transparent)]
    Eval(#[from] evaluator::EvalError),

    #[error(transparent)]
    Matrix(#[from] matrix::MatrixError),

    #[error(transparent)]
    Delta(#[from] delta::DeltaError),

    #[error(transparent)]
    Storage(#[from] storage::StorageError),

    #[error(transparent)]
    Runtime(#[from] runtime::RuntimeError),
}

pub type GraphCoreResult<T> = Result<T, GraphCoreError>;

/// Runs a [`builder::Pattern`] end to end against `graph`: builds its
/// expression list, rewrites it with [`optimizer::ExpressionOptimizer`]
/// (consulting `graph`'s live cardinality counters), and evaluates the
/// rewritten list to a joined result stream.
///
/// This is the one-call convenience path most callers want; `builder`,
/// `optimizer`, and `evaluator` remain public for callers that need to
/// inspect or cache the intermediate expression list (e.g. a REPL printing
/// the rewritten plan before running it).
pub fn query(
    graph: &graph::Graph,
    pattern: &builder::Pattern,
    policy: graph::SyncPolicy,
    timeout: &execution::QueryTimeout,
) -> GraphCoreResult<Vec<evaluator::ResultTuple>> {
    query_with_limits(graph, pattern, policy, timeout, execution::ResourceLimits::unlimited())
}

/// Same pipeline as [`query`], but enforces `limits` on every intermediate
/// product, join step, result row width, and variable-length expansion depth
/// (see [`execution::ResourceLimits`]). A server dispatching untrusted or
/// multi-tenant queries wants this one; `query` keeps the old unlimited
/// behavior for trusted, offline callers.
pub fn query_with_limits(
    graph: &graph::Graph,
    pattern: &builder::Pattern,
    policy: graph::SyncPolicy,
    timeout: &execution::QueryTimeout,
    limits: execution::ResourceLimits,
) -> GraphCoreResult<Vec<evaluator::ResultTuple>> {
    let expressions = builder::ExpressionBuilder::new().build(pattern, graph.runtime())?;

    let guard = graph.read();
    let evaluator = evaluator::ExpressionEvaluator::new(graph).with_limits(limits);
    let cardinality = evaluator.cardinality_source(&guard);
    let optimizer = optimizer::ExpressionOptimizer::new();
    let rewritten: Vec<algebra::AlgebraicExpression> =
        expressions.into_iter().map(|e| optimizer.optimize(e, &cardinality)).collect();
    drop(guard);

    Ok(evaluator.evaluate(&rewritten, policy, timeout)?)
}
