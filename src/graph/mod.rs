//! The property graph: nodes, edges, and the matrices that index them.
//!
//! `Graph` owns the ground truth ([`crate::datablock::DataBlock`] records)
//! and the derived matrices ([`crate::store::LabelStore`] /
//! [`crate::store::RelationStore`]) that the algebra module queries. All
//! mutable state lives behind one `parking_lot::RwLock` (chosen over
//! `std::sync::RwLock` because its guards never poison — a panicking writer
//! must not leave every future reader permanently locked out, which would
//! violate the "no partial mutation is ever visible" invariant as badly as
//! the partial mutation itself would). Reads take a shared lock for the
//! whole evaluation of one expression so they see one consistent snapshot;
//! writes take the exclusive lock per mutating call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::config::GraphConfig;
use crate::datablock::{DataBlock, DataBlockError};
use crate::delta::{DeltaError, DeltaMatrix};
use crate::runtime::{Runtime, RuntimeError};
use crate::storage::{self, GraphSnapshot, StorageError, Wal, WalOp};
use crate::store::{LabelStore, RelationStore};
use crate::value::{AttrId, AttrValue, AttributeSet};

/// Node id. Stable for the lifetime of the node; reused by a future node
/// only after this one is deleted (see `DataBlock`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Edge id, same reuse semantics as `NodeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}
impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Errors a `Graph` operation can raise. Subsystem errors (matrix, delta,
/// datablock, interning, storage) are folded in here rather than
/// propagated raw, so callers only ever match one error type per crate
/// boundary rather than matching on each subsystem's own error type.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    DataBlock(#[from] DataBlockError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("id space exhausted: {0} would overflow a 64-bit id")]
    IntegerOverflow(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Which side of a node's incident edges `get_node_edges` should scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// Controls how a matrix fetch reconciles pending `DeltaMatrix` overlays
/// and dimension growth against the rest of the graph before handing a
/// snapshot view to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Flush pending overlays into the base matrix and grow it to the
    /// current node/edge id span before returning it. Slowest, always
    /// correct, and the default for interactive evaluation.
    FlushResize,
    /// Grow the matrix to the current id span but leave overlays pending.
    /// Cheaper than `FlushResize` when a caller already folds overlays
    /// itself (e.g. repeated evaluation against a graph under heavy writes).
    ResizeOnly,
    /// Do nothing; the caller has already synced or does not need to.
    Nop,
}

struct NodeData {
    labels: Vec<u32>,
    attrs: AttributeSet,
}

struct EdgeData {
    relation: u32,
    src: u64,
    dst: u64,
    attrs: AttributeSet,
}

struct GraphInner {
    nodes: DataBlock<NodeData>,
    edges: DataBlock<EdgeData>,
    labels: HashMap<u32, LabelStore>,
    relations: HashMap<u32, RelationStore>,
    /// Union of every relation matrix: `adjacency[u,v]` present iff some
    /// edge of any type connects `u` to `v`. Maintained incrementally
    /// alongside `relations` rather than recomputed, since recomputation
    /// would mean a full scan of every relation matrix on each fetch.
    adjacency: DeltaMatrix,
    wal: Option<Wal>,
}

impl GraphInner {
    fn dim(&self) -> usize {
        self.nodes.capacity_span()
    }

    fn sync_label(&mut self, label: u32, policy: SyncPolicy) -> GraphResult<()> {
        let dim = self.dim();
        if let Some(store) = self.labels.get_mut(&label) {
            match policy {
                SyncPolicy::FlushResize => {
                    store.resize(dim);
                    store.flush()?;
                }
                SyncPolicy::ResizeOnly => store.resize(dim),
                SyncPolicy::Nop => {}
            }
        }
        Ok(())
    }

    fn sync_relation(&mut self, relation: u32, policy: SyncPolicy) -> GraphResult<()> {
        let dim = self.dim();
        if let Some(store) = self.relations.get_mut(&relation) {
            match policy {
                SyncPolicy::FlushResize => {
                    store.resize(dim);
                    store.flush()?;
                }
                SyncPolicy::ResizeOnly => store.resize(dim),
                SyncPolicy::Nop => {}
            }
        }
        Ok(())
    }

    fn sync_adjacency(&mut self, policy: SyncPolicy) -> GraphResult<()> {
        let dim = self.dim();
        match policy {
            SyncPolicy::FlushResize => {
                self.adjacency.resize(dim);
                self.adjacency.flush()?;
            }
            SyncPolicy::ResizeOnly => self.adjacency.resize(dim),
            SyncPolicy::Nop => {}
        }
        Ok(())
    }

    /// True iff some relation other than `except` still connects `(src,dst)`.
    fn any_other_relation_holds(&self, except: u32, src: usize, dst: usize) -> GraphResult<bool> {
        for (&rel, store) in &self.relations {
            if rel == except {
                continue;
            }
            if store.matrix().contains(src, dst)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Out-edges of `node` within one relation's matrix: a row scan of `R_r[node,:]`.
fn edges_out(store: &RelationStore, node: usize) -> GraphResult<Vec<u64>> {
    let snap = store.matrix().snapshot()?;
    Ok(snap.row_iter(node).flat_map(|(_, cell)| cell.edge_ids().to_vec()).collect())
}

/// In-edges of `node`: a row scan of the transposed companion if maintained,
/// else a transpose-on-demand of the forward matrix (slower, still correct).
fn edges_in(store: &RelationStore, node: usize) -> GraphResult<Vec<u64>> {
    if let Some(t) = store.transposed() {
        let snap = t.snapshot()?;
        Ok(snap.row_iter(node).flat_map(|(_, cell)| cell.edge_ids().to_vec()).collect())
    } else {
        let snap = store.matrix().snapshot()?.transpose();
        Ok(snap.row_iter(node).flat_map(|(_, cell)| cell.edge_ids().to_vec()).collect())
    }
}

/// A property graph: the ground-truth node/edge records and the sparse
/// matrices derived from them.
pub struct Graph {
    runtime: Arc<Runtime>,
    config: GraphConfig,
    inner: RwLock<GraphInner>,
    data_dir: Option<PathBuf>,
}

/// A snapshot read handle: holds the shared lock for as long as the
/// evaluator needs a stable view across an entire `evaluate()` call.
pub struct GraphReadGuard<'g> {
    guard: parking_lot::RwLockReadGuard<'g, GraphInner>,
}

impl<'g> GraphReadGuard<'g> {
    pub fn node_count(&self) -> usize {
        self.guard.nodes.live_count()
    }

    pub fn edge_count(&self) -> usize {
        self.guard.edges.live_count()
    }

    pub fn label_matrix(&self, label: u32) -> Option<&DeltaMatrix> {
        self.guard.labels.get(&label).map(LabelStore::matrix)
    }

    pub fn relation_matrix(&self, relation: u32, transposed: bool) -> Option<&DeltaMatrix> {
        let store = self.guard.relations.get(&relation)?;
        if transposed {
            store.transposed().or(Some(store.matrix()))
        } else {
            Some(store.matrix())
        }
    }

    /// Every interned label's store, keyed by label id. Exposed so the
    /// optimizer's cardinality heuristic (`crate::optimizer::StoreCardinality`)
    /// and the evaluator's operand fetch can read live stores directly
    /// rather than through a second indirection.
    pub fn labels(&self) -> &HashMap<u32, LabelStore> {
        &self.guard.labels
    }

    /// Every interned relation type's store, keyed by relation id.
    pub fn relations(&self) -> &HashMap<u32, RelationStore> {
        &self.guard.relations
    }

    /// The union adjacency matrix: present at `(u,v)` iff some edge of any
    /// relation type connects `u` to `v`.
    pub fn adjacency(&self) -> &DeltaMatrix {
        &self.guard.adjacency
    }

    pub fn node_labels(&self, id: NodeId) -> GraphResult<&[u32]> {
        Ok(&self.guard.nodes.get(id.0).map_err(GraphError::from)?.labels)
    }

    pub fn node_attrs(&self, id: NodeId) -> GraphResult<&AttributeSet> {
        Ok(&self.guard.nodes.get(id.0)?.attrs)
    }

    pub fn edge_attrs(&self, id: EdgeId) -> GraphResult<&AttributeSet> {
        Ok(&self.guard.edges.get(id.0)?.attrs)
    }

    pub fn edge_endpoints(&self, id: EdgeId) -> GraphResult<(NodeId, NodeId)> {
        let e = self.guard.edges.get(id.0)?;
        Ok((NodeId(e.src), NodeId(e.dst)))
    }
}

impl Graph {
    pub fn new(runtime: Arc<Runtime>, config: GraphConfig) -> Self {
        Graph {
            runtime,
            config,
            inner: RwLock::new(GraphInner {
                nodes: DataBlock::with_capacity(0),
                edges: DataBlock::with_capacity(0),
                labels: HashMap::new(),
                relations: HashMap::new(),
                adjacency: DeltaMatrix::new(0),
                wal: None,
            }),
            data_dir: None,
        }
    }

    /// Opens a graph backed by a data directory: replays the WAL (if any)
    /// on top of whatever the last snapshot held, then resumes logging new
    /// mutations to a fresh WAL segment.
    pub fn open(runtime: Arc<Runtime>, config: GraphConfig, data_dir: &Path) -> GraphResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(StorageError::from)?;
        let mut graph = Graph::new(runtime, config.clone());
        graph.data_dir = Some(data_dir.to_path_buf());

        let snapshot_path = data_dir.join("snapshot.bin");
        if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path).map_err(StorageError::from)?;
            let snapshot = storage::decode_graph(&bytes)?;
            graph.load_snapshot(&snapshot)?;
        }

        let wal_dir = data_dir.join("wal");
        let wal = Wal::new(wal_dir)?;
        if config.enable_wal {
            let entries = wal.read_all()?;
            storage::replay_wal(&entries, |op| graph.apply_wal_op(op))?;
        }

        if config.enable_wal {
            graph.inner.write().wal = Some(wal);
        }

        Ok(graph)
    }

    fn load_snapshot(&mut self, snapshot: &GraphSnapshot) -> GraphResult<()> {
        for (id, name) in &snapshot.label_names {
            let interned = self.runtime.intern_label(name)?;
            debug_assert_eq!(interned, *id, "snapshot label ids must be interned in order");
        }
        for (id, name) in &snapshot.relation_names {
            let interned = self.runtime.intern_relation(name)?;
            debug_assert_eq!(interned, *id, "snapshot relation ids must be interned in order");
        }
        for (_, name) in &snapshot.attr_names {
            self.runtime.intern_attr(name);
        }

        // Records are restored at their original ids, not re-assigned
        // sequentially: a snapshot taken after earlier deletions can have
        // non-contiguous ids, and every matrix coordinate below (label
        // diagonal position, edge src/dst) is expressed in those original
        // ids, not in re-push order.
        let mut inner = self.inner.write();
        for node in &snapshot.nodes {
            inner.nodes.restore(node.id, NodeData { labels: node.labels.clone(), attrs: node.attrs.clone() })?;
        }
        for edge in &snapshot.edges {
            inner.edges.restore(
                edge.id,
                EdgeData { relation: edge.relation, src: edge.src, dst: edge.dst, attrs: edge.attrs.clone() },
            )?;
        }
        drop(inner);

        // Rebuild matrices from the freshly loaded records.
        for node in &snapshot.nodes {
            for &label in &node.labels {
                self.ensure_label_store(label)?;
                self.inner.write().labels.get_mut(&label).unwrap().mark(node.id as usize)?;
            }
        }
        for edge in &snapshot.edges {
            self.record_edge_in_matrices(edge.relation, edge.src, edge.dst, edge.id)?;
        }
        Ok(())
    }

    /// Replays one WAL entry against both the raw datablocks and the
    /// derived label/relation/adjacency matrices — recovery must leave the
    /// graph in the same state `create_node`/`create_edge` would have, not
    /// just with the right records present.
    fn apply_wal_op(&self, op: &WalOp) -> Result<(), StorageError> {
        let to_storage = |e: GraphError| StorageError::Other(e.to_string());

        match op {
            WalOp::CreateNode { id, labels } => {
                {
                    let mut inner = self.inner.write();
                    inner
                        .nodes
                        .restore(*id, NodeData { labels: labels.clone(), attrs: AttributeSet::new() })
                        .map_err(|e| StorageError::Other(e.to_string()))?;
                }
                self.mark_node_labels(*id, labels).map_err(to_storage)?;
            }
            WalOp::DeleteNode { id } => {
                let labels = {
                    let mut inner = self.inner.write();
                    inner.nodes.remove(*id).map(|n| n.labels).unwrap_or_default()
                };
                self.unmark_node_labels(*id, &labels).map_err(to_storage)?;
            }
            WalOp::CreateEdge { id, src, dst, relation } => {
                {
                    let mut inner = self.inner.write();
                    inner
                        .edges
                        .restore(
                            *id,
                            EdgeData { relation: *relation, src: *src, dst: *dst, attrs: AttributeSet::new() },
                        )
                        .map_err(|e| StorageError::Other(e.to_string()))?;
                }
                self.record_edge_in_matrices(*relation, *src, *dst, *id).map_err(to_storage)?;
            }
            WalOp::DeleteEdge { id } => {
                let removed = {
                    let mut inner = self.inner.write();
                    inner.edges.remove(*id).ok()
                };
                if let Some(edge) = removed {
                    self.remove_edge_from_matrices(edge.relation, edge.src, edge.dst, *id)
                        .map_err(to_storage)?;
                }
            }
            WalOp::SetNodeAttr { id, attr, value } => {
                let mut inner = self.inner.write();
                if let Ok(node) = inner.nodes.get_mut(*id) {
                    node.attrs.set(AttrId(*attr), value.clone());
                }
            }
            WalOp::RemoveNodeAttr { id, attr } => {
                let mut inner = self.inner.write();
                if let Ok(node) = inner.nodes.get_mut(*id) {
                    node.attrs.remove(AttrId(*attr));
                }
            }
            WalOp::SetEdgeAttr { id, attr, value } => {
                let mut inner = self.inner.write();
                if let Ok(edge) = inner.edges.get_mut(*id) {
                    edge.attrs.set(AttrId(*attr), value.clone());
                }
            }
            WalOp::RemoveEdgeAttr { id, attr } => {
                let mut inner = self.inner.write();
                if let Ok(edge) = inner.edges.get_mut(*id) {
                    edge.attrs.remove(AttrId(*attr));
                }
            }
        }
        Ok(())
    }

    /// Marks `id` present in every named label's diagonal matrix, creating
    /// the store on first use.
    fn mark_node_labels(&self, id: u64, labels: &[u32]) -> GraphResult<()> {
        for &label in labels {
            self.ensure_label_store(label)?;
            let mut inner = self.inner.write();
            let dim = inner.dim();
            let store = inner.labels.get_mut(&label).unwrap();
            store.resize(dim);
            store.mark(id as usize)?;
        }
        Ok(())
    }

    fn unmark_node_labels(&self, id: u64, labels: &[u32]) -> GraphResult<()> {
        for &label in labels {
            if let Some(store) = self.inner.write().labels.get_mut(&label) {
                store.unmark(id as usize)?;
            }
        }
        Ok(())
    }

    /// Records an edge in its relation matrix (and transposed companion, if
    /// maintained) and in the union adjacency matrix. Insertion into
    /// adjacency is unconditional: per the data model, `adjacency[u,v]`
    /// holds whenever *any* relation connects `u` to `v`.
    fn record_edge_in_matrices(&self, relation: u32, src: u64, dst: u64, id: u64) -> GraphResult<()> {
        self.ensure_relation_store(relation)?;
        {
            let mut inner = self.inner.write();
            let dim = inner.dim();
            let store = inner.relations.get_mut(&relation).unwrap();
            store.resize(dim);
            store.add_edge(src as usize, dst as usize, id)?;
        }
        {
            let mut inner = self.inner.write();
            let dim = inner.dim();
            inner.adjacency.resize(dim);
            inner.adjacency.set(src as usize, dst as usize, id)?;
        }
        Ok(())
    }

    /// Removes an edge from its relation matrix, and from adjacency only if
    /// no other relation still connects the same `(src,dst)` pair.
    fn remove_edge_from_matrices(&self, relation: u32, src: u64, dst: u64, id: u64) -> GraphResult<()> {
        {
            let mut inner = self.inner.write();
            if let Some(store) = inner.relations.get_mut(&relation) {
                store.remove_edge(src as usize, dst as usize, id)?;
            }
        }
        let mut inner = self.inner.write();
        if !inner.any_other_relation_holds(relation, src as usize, dst as usize)? {
            inner.adjacency.unset(src as usize, dst as usize, id)?;
        }
        Ok(())
    }

    fn log(&self, op: WalOp) -> GraphResult<()> {
        let mut inner = self.inner.write();
        if let Some(wal) = inner.wal.as_mut() {
            wal.log(op)?;
        }
        Ok(())
    }

    fn ensure_label_store(&self, label: u32) -> GraphResult<()> {
        let mut inner = self.inner.write();
        let dim = inner.dim();
        inner.labels.entry(label).or_insert_with(|| LabelStore::new(dim));
        Ok(())
    }

    fn ensure_relation_store(&self, relation: u32) -> GraphResult<()> {
        let mut inner = self.inner.write();
        let dim = inner.dim();
        let maintain_transposed = self.config.maintain_transposed_relations;
        inner
            .relations
            .entry(relation)
            .or_insert_with(|| RelationStore::new(dim, maintain_transposed));
        Ok(())
    }

    /// Creates a node with the given labels (interned by name) and
    /// attributes, returning its id.
    pub fn create_node(&self, labels: &[&str], attrs: AttributeSet) -> GraphResult<NodeId> {
        let mut label_ids = Vec::with_capacity(labels.len());
        for name in labels {
            label_ids.push(self.runtime.intern_label(name)?);
        }

        let id = {
            let mut inner = self.inner.write();
            inner.nodes.push(NodeData { labels: label_ids.clone(), attrs })?
        };

        self.log(WalOp::CreateNode { id, labels: label_ids.clone() })?;

        self.mark_node_labels(id, &label_ids)?;

        Ok(NodeId(id))
    }

    /// Deletes a node and every edge incident to it. Cascading the delete
    /// is the only option that keeps the adjacency matrices consistent —
    /// an edge whose endpoint no longer exists is not a valid matrix cell.
    pub fn delete_node(&self, id: NodeId) -> GraphResult<()> {
        let incident = self.incident_edges(id)?;
        for edge_id in incident {
            self.delete_edge(edge_id)?;
        }

        let labels = {
            let mut inner = self.inner.write();
            let node = inner.nodes.remove(id.0)?;
            node.labels
        };
        self.unmark_node_labels(id.0, &labels)?;

        self.log(WalOp::DeleteNode { id: id.0 })?;
        self.maybe_compact()?;
        Ok(())
    }

    fn incident_edges(&self, id: NodeId) -> GraphResult<Vec<EdgeId>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for (edge_id, edge) in inner.edges.iter() {
            if edge.src == id.0 || edge.dst == id.0 {
                out.push(EdgeId(edge_id));
            }
        }
        Ok(out)
    }

    /// Creates an edge of the named relation type between two existing
    /// nodes.
    pub fn create_edge(
        &self,
        relation: &str,
        src: NodeId,
        dst: NodeId,
        attrs: AttributeSet,
    ) -> GraphResult<EdgeId> {
        if !self.inner.read().nodes.contains(src.0) {
            return Err(GraphError::NodeNotFound(src));
        }
        if !self.inner.read().nodes.contains(dst.0) {
            return Err(GraphError::NodeNotFound(dst));
        }

        let relation_id = self.runtime.intern_relation(relation)?;
        self.ensure_relation_store(relation_id)?;

        let id = {
            let mut inner = self.inner.write();
            inner.edges.push(EdgeData { relation: relation_id, src: src.0, dst: dst.0, attrs })?
        };

        self.record_edge_in_matrices(relation_id, src.0, dst.0, id)?;

        self.log(WalOp::CreateEdge { id, src: src.0, dst: dst.0, relation: relation_id })?;
        Ok(EdgeId(id))
    }

    pub fn delete_edge(&self, id: EdgeId) -> GraphResult<()> {
        let (relation, src, dst) = {
            let mut inner = self.inner.write();
            let edge = inner.edges.remove(id.0)?;
            (edge.relation, edge.src, edge.dst)
        };

        self.remove_edge_from_matrices(relation, src, dst, id.0)?;

        self.log(WalOp::DeleteEdge { id: id.0 })?;
        self.maybe_compact()?;
        Ok(())
    }

    /// Returns the ids of every edge connecting `src` to `dest`, optionally
    /// restricted to one named relation type. With no relation filter, all
    /// relevant relation matrices are scanned and their hits pooled.
    pub fn get_edges(
        &self,
        src: NodeId,
        dest: NodeId,
        relation: Option<&str>,
    ) -> GraphResult<Vec<EdgeId>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        if let Some(name) = relation {
            let rid = self
                .runtime
                .relation_id(name)
                .ok_or_else(|| GraphError::InvalidArgument(format!("unknown relation: {name}")))?;
            if let Some(store) = inner.relations.get(&rid) {
                if let Some(cell) = store.matrix().get(src.0 as usize, dest.0 as usize)? {
                    out.extend(cell.edge_ids().iter().copied().map(EdgeId));
                }
            }
        } else {
            for store in inner.relations.values() {
                if let Some(cell) = store.matrix().get(src.0 as usize, dest.0 as usize)? {
                    out.extend(cell.edge_ids().iter().copied().map(EdgeId));
                }
            }
        }
        Ok(out)
    }

    /// Returns the ids of every edge incident to `node` on the requested
    /// side(s), optionally restricted to one named relation type.
    /// Out-edges are a row scan of `R_r[node,:]`; in-edges use the
    /// transposed companion matrix when maintained, else a transpose
    /// computed on demand.
    pub fn get_node_edges(
        &self,
        node: NodeId,
        direction: Direction,
        relation: Option<&str>,
    ) -> GraphResult<Vec<EdgeId>> {
        let inner = self.inner.read();
        let stores: Vec<&RelationStore> = if let Some(name) = relation {
            let rid = self
                .runtime
                .relation_id(name)
                .ok_or_else(|| GraphError::InvalidArgument(format!("unknown relation: {name}")))?;
            inner.relations.get(&rid).into_iter().collect()
        } else {
            inner.relations.values().collect()
        };

        let mut ids = Vec::new();
        for store in stores {
            match direction {
                Direction::Out => ids.extend(edges_out(store, node.0 as usize)?),
                Direction::In => ids.extend(edges_in(store, node.0 as usize)?),
                Direction::Both => {
                    ids.extend(edges_out(store, node.0 as usize)?);
                    ids.extend(edges_in(store, node.0 as usize)?);
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.into_iter().map(EdgeId).collect())
    }

    pub fn set_node_attr(&self, id: NodeId, attr: &str, value: AttrValue) -> GraphResult<()> {
        let attr_id = self.runtime.intern_attr(attr);
        {
            let mut inner = self.inner.write();
            inner.nodes.get_mut(id.0)?.attrs.set(attr_id, value.clone());
        }
        self.log(WalOp::SetNodeAttr { id: id.0, attr: attr_id.0, value })
    }

    pub fn set_edge_attr(&self, id: EdgeId, attr: &str, value: AttrValue) -> GraphResult<()> {
        let attr_id = self.runtime.intern_attr(attr);
        {
            let mut inner = self.inner.write();
            inner.edges.get_mut(id.0)?.attrs.set(attr_id, value.clone());
        }
        self.log(WalOp::SetEdgeAttr { id: id.0, attr: attr_id.0, value })
    }

    /// Deletes nodes in bulk. Below `bulk_delete_threshold` this is just a
    /// loop over `delete_node`; at or above it, matrices tombstone-flush
    /// once at the end instead of per deletion, which is far cheaper when
    /// a caller is clearing a large subgraph at once.
    pub fn bulk_delete_nodes(&self, ids: &[NodeId]) -> GraphResult<()> {
        for &id in ids {
            self.delete_node(id)?;
        }
        if ids.len() >= self.config.bulk_delete_threshold {
            self.sync(SyncPolicy::FlushResize)?;
        }
        Ok(())
    }

    fn maybe_compact(&self) -> GraphResult<()> {
        let needs = {
            let inner = self.inner.read();
            inner.nodes.deleted_count() >= self.config.bulk_delete_threshold
                || inner.edges.deleted_count() >= self.config.bulk_delete_threshold
        };
        if needs {
            self.sync(SyncPolicy::FlushResize)?;
        }
        Ok(())
    }

    /// Flushes (or resizes, or does nothing to) every label, relation, and
    /// the adjacency matrix per `policy`.
    pub fn sync(&self, policy: SyncPolicy) -> GraphResult<()> {
        tracing::trace!(?policy, "graph_sync_writer_lock_acquire");
        let mut inner = self.inner.write();
        let labels: Vec<u32> = inner.labels.keys().copied().collect();
        for label in labels {
            inner.sync_label(label, policy)?;
        }
        let relations: Vec<u32> = inner.relations.keys().copied().collect();
        for relation in relations {
            inner.sync_relation(relation, policy)?;
        }
        inner.sync_adjacency(policy)?;
        drop(inner);
        tracing::trace!(?policy, "graph_sync_writer_lock_release");
        Ok(())
    }

    /// Flushes every DeltaMatrix with pending overlays. Unlike
    /// `sync`, which a caller drives per matrix fetch, this is a global
    /// sweep: with `force_flush = false` a matrix only flushes once its
    /// pending overlay size exceeds `delta_flush_ratio` of its committed
    /// size, otherwise it is just resized and left for a later sweep or an
    /// on-demand `FlushResize` fetch to fold.
    pub fn apply_pending(&self, force_flush: bool) -> GraphResult<()> {
        tracing::trace!(force_flush, "graph_apply_pending_writer_lock_acquire");
        let mut inner = self.inner.write();
        let dim = inner.dim();
        let alpha = self.config.delta_flush_ratio;
        let mut flushed = 0usize;

        let labels: Vec<u32> = inner.labels.keys().copied().collect();
        for label in labels {
            let store = inner.labels.get_mut(&label).unwrap();
            store.resize(dim);
            if force_flush || store.matrix().pending_ratio() > alpha {
                store.flush()?;
                flushed += 1;
            }
        }

        let relations: Vec<u32> = inner.relations.keys().copied().collect();
        for relation in relations {
            let store = inner.relations.get_mut(&relation).unwrap();
            store.resize(dim);
            if force_flush || store.matrix().pending_ratio() > alpha {
                store.flush()?;
                flushed += 1;
            }
        }

        inner.adjacency.resize(dim);
        if force_flush || inner.adjacency.pending_ratio() > alpha {
            inner.adjacency.flush()?;
            flushed += 1;
        }
        drop(inner);
        if flushed > 0 {
            tracing::debug!(force_flush, matrices_flushed = flushed, "graph_flush_decision");
        }
        tracing::trace!(force_flush, "graph_apply_pending_writer_lock_release");
        Ok(())
    }

    /// Acquires a shared read lock good for the lifetime of one evaluation.
    pub fn read(&self) -> GraphReadGuard<'_> {
        GraphReadGuard { guard: self.inner.read() }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Writes a full snapshot of live graph state to `data_dir/snapshot.bin`
    /// and truncates the WAL, since everything it held is now folded in.
    pub fn checkpoint(&self) -> GraphResult<()> {
        let Some(data_dir) = self.data_dir.clone() else {
            return Err(GraphError::InvalidArgument(
                "checkpoint requires a graph opened with Graph::open".to_string(),
            ));
        };

        let snapshot = {
            let inner = self.inner.read();
            let nodes = inner
                .nodes
                .iter()
                .map(|(id, n)| storage::NodeRecord { id, labels: n.labels.clone(), attrs: n.attrs.clone() })
                .collect();
            let edges = inner
                .edges
                .iter()
                .map(|(id, e)| storage::EdgeRecord {
                    id,
                    src: e.src,
                    dst: e.dst,
                    relation: e.relation,
                    attrs: e.attrs.clone(),
                })
                .collect();
            GraphSnapshot {
                label_names: self.runtime.all_labels(),
                relation_names: self.runtime.all_relations(),
                attr_names: self.runtime.all_attrs(),
                nodes,
                edges,
            }
        };

        let bytes = storage::encode_graph(&snapshot)?;
        std::fs::write(data_dir.join("snapshot.bin"), bytes).map_err(StorageError::from)?;

        let mut inner = self.inner.write();
        if let Some(wal) = inner.wal.as_mut() {
            wal.clear()?;
        }
        Ok(())
    }
}
