//! Sparse boolean matrices over the node-id domain.
//!
//! A [`SparseBoolMatrix`] backs every label set, relation type, and the
//! union adjacency matrix. Rows and columns are node ids and a present
//! cell marks pair membership — for a relation matrix, cell `(i, j)` present
//! means "some edge of this type connects node `i` to node `j`". Node and
//! relationship ids can be reused across deletes (see
//! [`crate::datablock::DataBlock`]), so matrices are sized to the dense
//! id range, not the live record count.
//!
//! Storage is row-major `Vec<Option<BTreeMap<usize, MatrixCell>>>`: a `None`
//! row costs one pointer-sized slot, a present row only pays for the
//! columns it actually has entries in. `BTreeMap` keeps columns ordered,
//! which `vxm`/`mxm` rely on for the merge-join style row combination.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by matrix operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("row/column domain mismatch: left has {left} rows, right has {right} rows")]
    DomainMismatch { left: usize, right: usize },

    #[error("index {index} out of bounds for dimension {dim}")]
    OutOfBounds { index: usize, dim: usize },

    #[error("capacity overflow: requested {requested}, limit {limit}")]
    OutOfMemory { requested: usize, limit: usize },
}

pub type MatrixResult<T> = Result<T, MatrixError>;

/// A cell value: most node pairs are connected by exactly one edge of a
/// given relation type, so the common case (`Single`) avoids a `Vec`
/// allocation. Multigraphs fall back to `Many` only once a second parallel
/// edge of the same type is added between the same pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixCell {
    Single(u64),
    Many(Vec<u64>),
}

impl MatrixCell {
    pub fn edge_ids(&self) -> &[u64] {
        match self {
            MatrixCell::Single(id) => std::slice::from_ref(id),
            MatrixCell::Many(ids) => ids,
        }
    }

    /// Adds an edge id to the cell, promoting `Single` to `Many` on the
    /// second distinct id.
    fn insert(&mut self, id: u64) {
        match self {
            MatrixCell::Single(existing) if *existing == id => {}
            MatrixCell::Single(existing) => {
                *self = MatrixCell::Many(vec![*existing, id]);
            }
            MatrixCell::Many(ids) => {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }

    /// Removes an edge id, returning `true` if the cell is now empty and
    /// should be dropped from the row.
    fn remove(&mut self, id: u64) -> bool {
        match self {
            MatrixCell::Single(existing) => *existing == id,
            MatrixCell::Many(ids) => {
                ids.retain(|e| *e != id);
                match ids.len() {
                    0 => true,
                    1 => {
                        let last = ids[0];
                        *self = MatrixCell::Single(last);
                        false
                    }
                    _ => false,
                }
            }
        }
    }
}

/// A sparse, square (or rectangular for label-diagonal use) boolean matrix
/// over node ids, backed by per-row ordered maps.
#[derive(Debug, Clone)]
pub struct SparseBoolMatrix {
    rows: Vec<Option<BTreeMap<usize, MatrixCell>>>,
    ncols: usize,
    nnz: usize,
    cap_limit: Option<usize>,
}

impl SparseBoolMatrix {
    pub fn new(dim: usize) -> Self {
        SparseBoolMatrix {
            rows: vec![None; dim],
            ncols: dim,
            nnz: 0,
            cap_limit: None,
        }
    }

    pub fn with_cap_limit(dim: usize, cap_limit: usize) -> Self {
        let mut m = Self::new(dim);
        m.cap_limit = Some(cap_limit);
        m
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Grows the matrix to at least `dim` rows/cols. Matrices only grow
    /// (node/edge ids are monotonically assigned), never shrink — shrinking
    /// would require compacting every matrix referencing the freed ids.
    pub fn resize(&mut self, dim: usize) {
        if dim > self.rows.len() {
            self.rows.resize(dim, None);
        }
        if dim > self.ncols {
            self.ncols = dim;
        }
    }

    /// Empties every row in place, keeping the allocated `Vec` capacity.
    /// Used to recycle a matrix drawn from [`crate::runtime::Runtime`]'s
    /// scratch pool: `take_scratch` hands back whatever a previous caller
    /// left in the buffer, so every consumer must clear it before reading.
    pub fn clear(&mut self) {
        for row in self.rows.iter_mut() {
            *row = None;
        }
        self.nnz = 0;
    }

    fn check_bounds(&self, row: usize, col: usize) -> MatrixResult<()> {
        if row >= self.rows.len() {
            return Err(MatrixError::OutOfBounds { index: row, dim: self.rows.len() });
        }
        if col >= self.ncols {
            return Err(MatrixError::OutOfBounds { index: col, dim: self.ncols });
        }
        Ok(())
    }

    /// Sets a cell, recording `edge_id` as (one of) the edges justifying it.
    pub fn set(&mut self, row: usize, col: usize, edge_id: u64) -> MatrixResult<()> {
        self.check_bounds(row, col)?;
        if let Some(limit) = self.cap_limit {
            if self.nnz >= limit && self.rows[row].as_ref().map_or(true, |r| !r.contains_key(&col))
            {
                return Err(MatrixError::OutOfMemory { requested: self.nnz + 1, limit });
            }
        }

        let row_map = self.rows[row].get_or_insert_with(BTreeMap::new);
        match row_map.get_mut(&col) {
            Some(cell) => cell.insert(edge_id),
            None => {
                row_map.insert(col, MatrixCell::Single(edge_id));
                self.nnz += 1;
            }
        }
        Ok(())
    }

    /// Removes one edge id from a cell, dropping the cell (and decrementing
    /// `nnz`) once its last id is gone.
    pub fn unset(&mut self, row: usize, col: usize, edge_id: u64) -> MatrixResult<()> {
        self.check_bounds(row, col)?;
        let Some(row_map) = self.rows[row].as_mut() else { return Ok(()) };
        let Some(cell) = row_map.get_mut(&col) else { return Ok(()) };

        if cell.remove(edge_id) {
            row_map.remove(&col);
            self.nnz -= 1;
            if row_map.is_empty() {
                self.rows[row] = None;
            }
        }
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&MatrixCell> {
        self.rows.get(row)?.as_ref()?.get(&col)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.get(row, col).is_some()
    }

    /// Iterates the non-zero `(row, col)` pairs of a given row in column
    /// order.
    pub fn row_iter(&self, row: usize) -> impl Iterator<Item = (usize, &MatrixCell)> {
        self.rows
            .get(row)
            .and_then(|r| r.as_ref())
            .into_iter()
            .flat_map(|m| m.iter().map(|(c, cell)| (*c, cell)))
    }

    /// Iterates every non-zero cell in the matrix, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &MatrixCell)> {
        self.rows.iter().enumerate().filter_map(|(r, row)| row.as_ref().map(|m| (r, m))).flat_map(
            |(r, m)| m.iter().map(move |(c, cell)| (r, *c, cell)),
        )
    }

    /// Structural (pattern-only) transpose: swaps row/col roles, dropping
    /// edge-id provenance down to whichever ids were present (transpose
    /// doesn't change *which* edges justify a cell, just its coordinates).
    pub fn transpose(&self) -> SparseBoolMatrix {
        let mut out = SparseBoolMatrix::new(self.rows.len().max(self.ncols));
        out.cap_limit = self.cap_limit;
        for (r, c, cell) in self.iter() {
            for id in cell.edge_ids() {
                out.set(c, r, *id).expect("transpose of valid matrix cannot overflow bounds");
            }
        }
        out
    }

    /// Boolean row-vector-times-matrix multiply used by `vxm`/reachability:
    /// given a frontier of set rows, returns the set of columns reachable
    /// through this matrix in one hop (`frontier * self`, boolean semiring).
    pub fn expand_frontier(&self, frontier: &[bool]) -> Vec<bool> {
        let mut out = vec![false; self.ncols];
        for (r, row) in self.rows.iter().enumerate() {
            if !frontier.get(r).copied().unwrap_or(false) {
                continue;
            }
            let Some(row_map) = row else { continue };
            for col in row_map.keys() {
                out[*col] = true;
            }
        }
        out
    }

    /// Boolean matrix multiply: `(self * other)`, used to fold two operands
    /// of an `AlgebraicExpression` together.
    pub fn mul(&self, other: &SparseBoolMatrix) -> MatrixResult<SparseBoolMatrix> {
        if self.ncols != other.nrows() {
            return Err(MatrixError::DomainMismatch { left: self.ncols, right: other.nrows() });
        }
        let mut out = SparseBoolMatrix::new(self.rows.len().max(other.ncols()));
        for (i, row) in self.rows.iter().enumerate() {
            let Some(row_map) = row else { continue };
            for &k in row_map.keys() {
                for (j, cell) in other.row_iter(k) {
                    for id in cell.edge_ids() {
                        out.set(i, j, *id)?;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Boolean matrix add: structural union of cells, merging edge id lists
    /// where both operands have an entry.
    pub fn add(&self, other: &SparseBoolMatrix) -> SparseBoolMatrix {
        let dim = self.rows.len().max(other.rows.len());
        let mut out = self.clone();
        out.resize(dim);
        for (r, c, cell) in other.iter() {
            for id in cell.edge_ids() {
                out.set(r, c, *id).expect("add of valid matrices cannot overflow bounds");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_unset_roundtrip() {
        let mut m = SparseBoolMatrix::new(4);
        m.set(0, 1, 100).unwrap();
        assert!(m.contains(0, 1));
        assert_eq!(m.nnz(), 1);

        m.unset(0, 1, 100).unwrap();
        assert!(!m.contains(0, 1));
        assert_eq!(m.nnz(), 0);
    }

    #[test]
    fn parallel_edges_promote_to_many() {
        let mut m = SparseBoolMatrix::new(2);
        m.set(0, 1, 1).unwrap();
        m.set(0, 1, 2).unwrap();
        assert_eq!(m.nnz(), 1); // still one cell
        match m.get(0, 1).unwrap() {
            MatrixCell::Many(ids) => assert_eq!(ids.as_slice(), &[1, 2]),
            MatrixCell::Single(_) => panic!("expected Many after second parallel edge"),
        }
    }

    #[test]
    fn removing_one_of_many_demotes_to_single() {
        let mut m = SparseBoolMatrix::new(2);
        m.set(0, 1, 1).unwrap();
        m.set(0, 1, 2).unwrap();
        m.unset(0, 1, 1).unwrap();
        assert_eq!(m.get(0, 1), Some(&MatrixCell::Single(2)));
    }

    #[test]
    fn transpose_swaps_coordinates() {
        let mut m = SparseBoolMatrix::new(3);
        m.set(0, 2, 1).unwrap();
        let t = m.transpose();
        assert!(t.contains(2, 0));
        assert!(!t.contains(0, 2));
    }

    #[test]
    fn mul_composes_two_hops() {
        let mut a = SparseBoolMatrix::new(3);
        a.set(0, 1, 1).unwrap();
        let mut b = SparseBoolMatrix::new(3);
        b.set(1, 2, 2).unwrap();

        let c = a.mul(&b).unwrap();
        assert!(c.contains(0, 2));
        assert!(!c.contains(0, 1));
    }

    #[test]
    fn mul_rejects_domain_mismatch() {
        let a = SparseBoolMatrix::new(2);
        let b = SparseBoolMatrix::new(3);
        // a has 2 cols, b has 3 rows -> mismatch
        assert!(a.mul(&b).is_err());
    }

    #[test]
    fn add_unions_structurally() {
        let mut a = SparseBoolMatrix::new(2);
        a.set(0, 1, 1).unwrap();
        let mut b = SparseBoolMatrix::new(2);
        b.set(1, 0, 2).unwrap();

        let c = a.add(&b);
        assert!(c.contains(0, 1));
        assert!(c.contains(1, 0));
    }

    #[test]
    fn resize_only_grows() {
        let mut m = SparseBoolMatrix::new(2);
        m.resize(5);
        assert_eq!(m.nrows(), 5);
        m.resize(1);
        assert_eq!(m.nrows(), 5); // never shrinks
    }

    #[test]
    fn cap_limit_rejects_new_cells_past_limit() {
        let mut m = SparseBoolMatrix::with_cap_limit(4, 1);
        m.set(0, 1, 1).unwrap();
        assert!(m.set(0, 2, 2).is_err());
        // Existing cell can still absorb a parallel edge without tripping the limit
        assert!(m.set(0, 1, 3).is_ok());
    }

    #[test]
    fn clear_empties_rows_but_keeps_capacity() {
        let mut m = SparseBoolMatrix::new(3);
        m.set(0, 1, 1).unwrap();
        m.set(2, 2, 2).unwrap();
        m.clear();
        assert_eq!(m.nnz(), 0);
        assert!(!m.contains(0, 1));
        assert_eq!(m.nrows(), 3); // capacity (row count) is retained
    }

    #[test]
    fn expand_frontier_follows_one_hop() {
        let mut m = SparseBoolMatrix::new(3);
        m.set(0, 1, 1).unwrap(); // row 0 has a column-1 entry: row 0 reaches col 1
        let frontier = vec![true, false, false];
        let next = m.expand_frontier(&frontier);
        assert_eq!(next, vec![false, true, false]);
    }
}
