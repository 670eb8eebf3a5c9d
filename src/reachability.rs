//! BFS-style reachability over the graph's union adjacency matrix.
//!
//! A frontier vector `Q` is iteratively expanded one hop at a time via a
//! vector-matrix product against the adjacency matrix, excluding
//! already-visited vertices with a structural complement mask `M`. This
//! mirrors the classic `GrB_vxm`-with-complemented-mask loop used to express
//! BFS over a GraphBLAS-style boolean semiring; this module runs the same
//! loop over [`crate::matrix::SparseBoolMatrix::expand_frontier`] since the
//! crate's matrix type has no general `vxm` primitive of its own, only the
//! boolean frontier-expansion helper that loop needs.

use crate::execution::QueryTimeout;
use crate::graph::{Graph, GraphError, GraphResult, NodeId, SyncPolicy};

/// Returns `true` iff some directed path connects `src` to `dest` through
/// live edges of any relation type.
///
/// A quick `src == dest` check, then repeated frontier expansion
/// (`Q <- vxm(Q, A, mask=M, complement, replace)`) until either `dest` is
/// hit or the frontier goes empty. `M` accumulates every vertex ever placed
/// in `Q` so no vertex is explored twice — a monotone-frontier argument that
/// bounds termination at `n` steps for an `n`-vertex graph.
pub fn reachable(graph: &Graph, src: NodeId, dest: NodeId) -> GraphResult<bool> {
    reachable_cancellable(graph, src, dest, &QueryTimeout::infinite())
}

/// As [`reachable`], but polls `timeout` once per hop so a caller running
/// this against an adversarially large or pathological graph can bound the
/// work, the same way the evaluator checks a cancellation token between
/// frontier iterations.
pub fn reachable_cancellable(
    graph: &Graph,
    src: NodeId,
    dest: NodeId,
    timeout: &QueryTimeout,
) -> GraphResult<bool> {
    graph.sync(SyncPolicy::FlushResize)?;
    let guard = graph.read();
    let adjacency = guard.adjacency().snapshot()?;
    let dim = adjacency.nrows().max(adjacency.ncols());

    if src.0 as usize >= dim {
        return Err(GraphError::InvalidArgument(format!("source node {src} out of bounds")));
    }
    if dest.0 as usize >= dim {
        return Err(GraphError::InvalidArgument(format!("destination node {dest} out of bounds")));
    }
    if src == dest {
        return Ok(true);
    }

    let mut frontier = vec![false; dim];
    frontier[src.0 as usize] = true;
    let mut visited = vec![false; dim];
    visited[src.0 as usize] = true;

    loop {
        if timeout.check().is_err() {
            tracing::debug!(src = src.0, dest = dest.0, "reachability_cancelled");
            return Err(GraphError::Cancelled);
        }

        let mut next = adjacency.expand_frontier(&frontier);
        for (i, seen) in visited.iter().enumerate() {
            if *seen {
                next[i] = false;
            }
        }

        if next.iter().all(|b| !*b) {
            return Ok(false);
        }
        if next[dest.0 as usize] {
            return Ok(true);
        }

        for (i, hit) in next.iter().enumerate() {
            if *hit {
                visited[i] = true;
            }
        }
        frontier = next;
    }
}

/// Length (in hops) of a shortest path from `src` to `dest`, or `None` if
/// unreachable. The frontier loop above already counts hops to decide
/// termination, so surfacing the count costs nothing extra; `reachable()`
/// itself just discards the counter it doesn't need.
pub fn shortest_path_len(graph: &Graph, src: NodeId, dest: NodeId) -> GraphResult<Option<u64>> {
    graph.sync(SyncPolicy::FlushResize)?;
    let guard = graph.read();
    let adjacency = guard.adjacency().snapshot()?;
    let dim = adjacency.nrows().max(adjacency.ncols());

    if src.0 as usize >= dim || dest.0 as usize >= dim {
        return Err(GraphError::InvalidArgument("node id out of bounds".to_string()));
    }
    if src == dest {
        return Ok(Some(0));
    }

    let mut frontier = vec![false; dim];
    frontier[src.0 as usize] = true;
    let mut visited = vec![false; dim];
    visited[src.0 as usize] = true;

    let mut hops: u64 = 0;
    loop {
        let mut next = adjacency.expand_frontier(&frontier);
        for (i, seen) in visited.iter().enumerate() {
            if *seen {
                next[i] = false;
            }
        }
        if next.iter().all(|b| !*b) {
            return Ok(None);
        }
        hops += 1;
        if next[dest.0 as usize] {
            return Ok(Some(hops));
        }
        for (i, hit) in next.iter().enumerate() {
            if *hit {
                visited[i] = true;
            }
        }
        frontier = next;
    }
}
