//! Per-label and per-relation matrix stores.
//!
//! A `Graph` keeps one [`LabelStore`] entry per interned label (a diagonal
//! `DeltaMatrix` marking which nodes carry it) and one [`RelationStore`]
//! entry per interned relation type (an adjacency `DeltaMatrix`, plus an
//! optional transposed companion for fast reverse traversal). Both stores
//! also track a live cardinality counter, which the algebraic optimizer's
//! cardinality heuristics (see `crate::optimizer`) read without having to
//! recount matrix non-zeros on every planning decision.

use crate::delta::{DeltaError, DeltaMatrix};

pub type StoreResult<T> = Result<T, DeltaError>;

/// Diagonal matrix tracking which nodes carry a given label.
pub struct LabelStore {
    matrix: DeltaMatrix,
    cardinality: usize,
}

impl LabelStore {
    pub fn new(dim: usize) -> Self {
        LabelStore { matrix: DeltaMatrix::new(dim), cardinality: 0 }
    }

    pub fn resize(&mut self, dim: usize) {
        self.matrix.resize(dim);
    }

    pub fn has(&self, node: usize) -> StoreResult<bool> {
        self.matrix.contains(node, node)
    }

    pub fn mark(&mut self, node: usize) -> StoreResult<()> {
        if !self.matrix.contains(node, node)? {
            self.matrix.set(node, node, node as u64)?;
            self.cardinality += 1;
        }
        Ok(())
    }

    pub fn unmark(&mut self, node: usize) -> StoreResult<()> {
        if self.matrix.contains(node, node)? {
            self.matrix.unset(node, node, node as u64)?;
            self.cardinality -= 1;
        }
        Ok(())
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn matrix(&self) -> &DeltaMatrix {
        &self.matrix
    }

    pub fn flush(&mut self) -> StoreResult<()> {
        self.matrix.flush()
    }
}

/// Adjacency matrix for one relation type, optionally mirrored by a
/// transposed companion (`GraphConfig::maintain_transposed_relations`).
pub struct RelationStore {
    matrix: DeltaMatrix,
    transposed: Option<DeltaMatrix>,
    cardinality: usize,
}

impl RelationStore {
    pub fn new(dim: usize, maintain_transposed: bool) -> Self {
        RelationStore {
            matrix: DeltaMatrix::new(dim),
            transposed: maintain_transposed.then(|| DeltaMatrix::new(dim)),
            cardinality: 0,
        }
    }

    pub fn resize(&mut self, dim: usize) {
        self.matrix.resize(dim);
        if let Some(t) = self.transposed.as_mut() {
            t.resize(dim);
        }
    }

    /// Records one more edge in the `(src, dest)` cell. `cardinality`
    /// counts distinct `(src, dest)` pairs, not raw edge count, so a
    /// second parallel edge between an already-connected pair (promoting
    /// the cell from `Single` to `Many`) does not bump it.
    pub fn add_edge(&mut self, src: usize, dst: usize, edge_id: u64) -> StoreResult<()> {
        let was_present = self.matrix.contains(src, dst)?;
        self.matrix.set(src, dst, edge_id)?;
        if let Some(t) = self.transposed.as_mut() {
            t.set(dst, src, edge_id)?;
        }
        if !was_present {
            self.cardinality += 1;
        }
        Ok(())
    }

    /// Removes one edge from the `(src, dest)` cell, decrementing
    /// `cardinality` only once the cell has no remaining edges.
    pub fn remove_edge(&mut self, src: usize, dst: usize, edge_id: u64) -> StoreResult<()> {
        self.matrix.unset(src, dst, edge_id)?;
        if let Some(t) = self.transposed.as_mut() {
            t.unset(dst, src, edge_id)?;
        }
        if !self.matrix.contains(src, dst)? {
            self.cardinality -= 1;
        }
        Ok(())
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn matrix(&self) -> &DeltaMatrix {
        &self.matrix
    }

    /// Transposed companion matrix, if maintained. When absent, callers
    /// that need a reverse view transpose `matrix()` on demand instead
    /// (slower, but correct — see `AlgebraicOperand::transposed`).
    pub fn transposed(&self) -> Option<&DeltaMatrix> {
        self.transposed.as_ref()
    }

    pub fn flush(&mut self) -> StoreResult<()> {
        self.matrix.flush()?;
        if let Some(t) = self.transposed.as_mut() {
            t.flush()?;
        }
        Ok(())
    }
}
