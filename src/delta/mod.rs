//! Delta-overlay matrices.
//!
//! A [`DeltaMatrix`] pairs a base matrix with two pending overlays so reads
//! never have to choose between "fast but stale" and "correct but locked
//! for every write": logical membership is `(M ∨ plus) ∧ ¬minus`. Writes
//! land in `plus`/`minus`; `flush` folds them into `M` and clears both,
//! which is the only operation that needs to briefly exclude readers.

use crate::matrix::{MatrixCell, MatrixError, SparseBoolMatrix};
use std::sync::atomic::{AtomicBool, Ordering};

/// A base matrix plus pending insert/delete overlays.
///
/// `dirty_poisoned` is set if a flush is ever interrupted partway (e.g. a
/// panic inside the fold); once poisoned, reads through this matrix return
/// `Err` rather than risk silently observing a half-folded base — this is
/// the mechanism behind the "no partial mutation visible" invariant.
pub struct DeltaMatrix {
    base: SparseBoolMatrix,
    plus: SparseBoolMatrix,
    minus: SparseBoolMatrix,
    dirty_poisoned: AtomicBool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeltaError {
    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("delta matrix poisoned by an interrupted flush")]
    Poisoned,
}

pub type DeltaResult<T> = Result<T, DeltaError>;

impl DeltaMatrix {
    pub fn new(dim: usize) -> Self {
        DeltaMatrix {
            base: SparseBoolMatrix::new(dim),
            plus: SparseBoolMatrix::new(dim),
            minus: SparseBoolMatrix::new(dim),
            dirty_poisoned: AtomicBool::new(false),
        }
    }

    fn check_alive(&self) -> DeltaResult<()> {
        if self.dirty_poisoned.load(Ordering::Acquire) {
            return Err(DeltaError::Poisoned);
        }
        Ok(())
    }

    pub fn resize(&mut self, dim: usize) {
        self.base.resize(dim);
        self.plus.resize(dim);
        self.minus.resize(dim);
    }

    /// Logical membership test: present in `base ∨ plus`, absent from `minus`.
    pub fn contains(&self, row: usize, col: usize) -> DeltaResult<bool> {
        self.check_alive()?;
        if self.minus.contains(row, col) {
            return Ok(false);
        }
        Ok(self.base.contains(row, col) || self.plus.contains(row, col))
    }

    pub fn get(&self, row: usize, col: usize) -> DeltaResult<Option<&MatrixCell>> {
        self.check_alive()?;
        if self.minus.contains(row, col) {
            return Ok(None);
        }
        if let Some(cell) = self.plus.get(row, col) {
            return Ok(Some(cell));
        }
        Ok(self.base.get(row, col))
    }

    /// Records an edge as present. If a prior `minus` entry shadowed this
    /// exact cell, clearing it here keeps `plus`/`minus` from both holding
    /// entries for the same coordinate (which would make flush order matter).
    pub fn set(&mut self, row: usize, col: usize, edge_id: u64) -> DeltaResult<()> {
        self.check_alive()?;
        self.minus.unset(row, col, edge_id)?;
        self.plus.set(row, col, edge_id)?;
        Ok(())
    }

    /// Records an edge as absent. Symmetric to `set`: clears any shadowing
    /// `plus` entry for the same coordinate first.
    pub fn unset(&mut self, row: usize, col: usize, edge_id: u64) -> DeltaResult<()> {
        self.check_alive()?;
        self.plus.unset(row, col, edge_id)?;
        if self.base.contains(row, col) {
            self.minus.set(row, col, edge_id)?;
        }
        Ok(())
    }

    /// Folds `plus`/`minus` into `base` via copy-and-swap: a fresh matrix is
    /// built from scratch and only swapped in once complete, so a reader
    /// racing a flush under the graph's read lock sees either the fully
    /// pre-flush or fully post-flush state, never a partial fold. Callers
    /// still take Graph's writer lock around this (matrices are not
    /// independently synchronized), copy-and-swap just narrows the window
    /// where an interrupted flush would otherwise leave `base` inconsistent.
    pub fn flush(&mut self) -> DeltaResult<()> {
        self.check_alive()?;
        self.dirty_poisoned.store(true, Ordering::Release);

        let dim = self.base.nrows().max(self.base.ncols());
        let mut folded = SparseBoolMatrix::new(dim);
        for (r, c, cell) in self.base.iter() {
            if self.minus.contains(r, c) {
                continue;
            }
            for id in cell.edge_ids() {
                folded.set(r, c, *id)?;
            }
        }
        for (r, c, cell) in self.plus.iter() {
            for id in cell.edge_ids() {
                folded.set(r, c, *id)?;
            }
        }

        self.base = folded;
        self.plus = SparseBoolMatrix::new(dim);
        self.minus = SparseBoolMatrix::new(dim);
        self.dirty_poisoned.store(false, Ordering::Release);
        Ok(())
    }

    /// Materializes the current logical view (`base ∨ plus, minus removed`)
    /// as a plain [`SparseBoolMatrix`], without mutating `self`. Unlike
    /// `flush`, this never touches `base`/`plus`/`minus` or the poison flag
    /// — it is what the algebra evaluator calls to get a matrix it can run
    /// `mul`/`add`/`transpose` against when the active sync policy left
    /// overlays pending (`ResizeOnly`/`Nop`). After a `FlushResize` fetch
    /// the overlays are already empty, so this degenerates to cloning `base`.
    pub fn snapshot(&self) -> DeltaResult<SparseBoolMatrix> {
        self.check_alive()?;
        if self.plus.nnz() == 0 && self.minus.nnz() == 0 {
            return Ok(self.base.clone());
        }

        let dim = self.base.nrows().max(self.base.ncols());
        let mut out = SparseBoolMatrix::new(dim);
        for (r, c, cell) in self.base.iter() {
            if self.minus.contains(r, c) {
                continue;
            }
            for id in cell.edge_ids() {
                out.set(r, c, *id)?;
            }
        }
        for (r, c, cell) in self.plus.iter() {
            for id in cell.edge_ids() {
                out.set(r, c, *id)?;
            }
        }
        Ok(out)
    }

    /// Ratio of pending (plus + minus) non-zeros to base non-zeros, used by
    /// `GraphConfig::delta_flush_ratio` to decide on an eager flush.
    pub fn pending_ratio(&self) -> f64 {
        let pending = (self.plus.nnz() + self.minus.nnz()) as f64;
        let base = self.base.nnz().max(1) as f64;
        pending / base
    }

    pub fn is_poisoned(&self) -> bool {
        self.dirty_poisoned.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_overlay_is_visible_before_flush() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        assert!(d.contains(0, 1).unwrap());
    }

    #[test]
    fn minus_overlay_hides_base_entry() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        d.flush().unwrap();
        assert!(d.contains(0, 1).unwrap());

        d.unset(0, 1, 1).unwrap();
        assert!(!d.contains(0, 1).unwrap());
    }

    #[test]
    fn flush_folds_and_clears_overlays() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        d.flush().unwrap();

        assert!(d.contains(0, 1).unwrap());
        assert_eq!(d.pending_ratio(), 0.0);
    }

    #[test]
    fn set_then_unset_same_edge_before_flush_cancels_out() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        d.unset(0, 1, 1).unwrap();
        assert!(!d.contains(0, 1).unwrap());
    }

    #[test]
    fn re_adding_after_minus_clears_the_minus_entry() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        d.flush().unwrap();
        d.unset(0, 1, 1).unwrap();
        d.set(0, 1, 1).unwrap();
        assert!(d.contains(0, 1).unwrap());
    }

    #[test]
    fn snapshot_reflects_pending_overlays_without_mutating() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        d.flush().unwrap();
        d.set(1, 2, 2).unwrap();
        d.unset(0, 1, 1).unwrap();

        let snap = d.snapshot().unwrap();
        assert!(snap.contains(1, 2));
        assert!(!snap.contains(0, 1));
        // self is untouched: overlays still pending
        assert!(d.pending_ratio() > 0.0);
    }

    #[test]
    fn pending_ratio_reflects_overlay_size() {
        let mut d = DeltaMatrix::new(4);
        d.set(0, 1, 1).unwrap();
        d.flush().unwrap();
        d.set(1, 2, 2).unwrap();
        assert!(d.pending_ratio() > 0.0);
    }
}
