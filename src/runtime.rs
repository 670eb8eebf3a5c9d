//! Process-wide interning and scratch-matrix pooling.
//!
//! A [`Runtime`] holds the dictionaries that give labels, relation types,
//! and attribute names stable small integer ids (mirrors `Catalog`'s
//! name-to-schema bookkeeping, generalized from relation schemas to the
//! three graph-domain dictionaries). A single `Runtime` is normally shared
//! by every `Graph` in a process, since attribute names in particular tend
//! to repeat across graphs and interning them once avoids redundant ids.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::matrix::SparseBoolMatrix;
use crate::value::AttrId;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("label cap exceeded: {cap} labels already interned")]
    LabelCapExceeded { cap: usize },

    #[error("relation cap exceeded: {cap} relation types already interned")]
    RelationCapExceeded { cap: usize },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Bidirectional name <-> small-integer-id table.
#[derive(Debug, Default)]
struct Interner {
    name_to_id: HashMap<String, u32>,
    names: Vec<String>,
}

impl Interner {
    fn intern(&mut self, name: &str, cap: usize) -> Result<u32, ()> {
        if let Some(&id) = self.name_to_id.get(name) {
            return Ok(id);
        }
        if self.names.len() >= cap {
            return Err(());
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.name_to_id.get(name).copied()
    }

    fn name_of(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i as u32, n.as_str()))
    }
}

/// Process-wide interning tables and a reusable scratch-matrix pool.
pub struct Runtime {
    labels: Mutex<Interner>,
    relations: Mutex<Interner>,
    attrs: Mutex<Interner>,
    label_cap: usize,
    relation_cap: usize,
    scratch: Mutex<Vec<SparseBoolMatrix>>,
}

impl Runtime {
    pub fn new(label_cap: usize, relation_cap: usize) -> Self {
        Runtime {
            labels: Mutex::new(Interner::default()),
            relations: Mutex::new(Interner::default()),
            attrs: Mutex::new(Interner::default()),
            label_cap,
            relation_cap,
            scratch: Mutex::new(Vec::new()),
        }
    }

    pub fn intern_label(&self, name: &str) -> RuntimeResult<u32> {
        self.labels
            .lock()
            .unwrap()
            .intern(name, self.label_cap)
            .map_err(|()| RuntimeError::LabelCapExceeded { cap: self.label_cap })
    }

    pub fn intern_relation(&self, name: &str) -> RuntimeResult<u32> {
        self.relations
            .lock()
            .unwrap()
            .intern(name, self.relation_cap)
            .map_err(|()| RuntimeError::RelationCapExceeded { cap: self.relation_cap })
    }

    /// Attribute names have no configured cap: property keys are expected
    /// to be a small, roughly fixed vocabulary, unlike labels/relations
    /// which a misbehaving bulk loader could runaway-generate.
    pub fn intern_attr(&self, name: &str) -> AttrId {
        AttrId(self.attrs.lock().unwrap().intern(name, usize::MAX).expect("attr cap is usize::MAX"))
    }

    pub fn label_id(&self, name: &str) -> Option<u32> {
        self.labels.lock().unwrap().lookup(name)
    }

    pub fn relation_id(&self, name: &str) -> Option<u32> {
        self.relations.lock().unwrap().lookup(name)
    }

    pub fn attr_id(&self, name: &str) -> Option<AttrId> {
        self.attrs.lock().unwrap().lookup(name).map(AttrId)
    }

    pub fn label_name(&self, id: u32) -> Option<String> {
        self.labels.lock().unwrap().name_of(id).map(String::from)
    }

    pub fn relation_name(&self, id: u32) -> Option<String> {
        self.relations.lock().unwrap().name_of(id).map(String::from)
    }

    pub fn attr_name(&self, id: AttrId) -> Option<String> {
        self.attrs.lock().unwrap().name_of(id.0).map(String::from)
    }

    pub fn label_count(&self) -> usize {
        self.labels.lock().unwrap().len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.lock().unwrap().len()
    }

    pub fn all_labels(&self) -> Vec<(u32, String)> {
        self.labels.lock().unwrap().entries().map(|(i, n)| (i, n.to_string())).collect()
    }

    pub fn all_relations(&self) -> Vec<(u32, String)> {
        self.relations.lock().unwrap().entries().map(|(i, n)| (i, n.to_string())).collect()
    }

    pub fn all_attrs(&self) -> Vec<(u32, String)> {
        self.attrs.lock().unwrap().entries().map(|(i, n)| (i, n.to_string())).collect()
    }

    /// Borrows a scratch matrix sized to at least `dim`, from the pool if
    /// one is available, otherwise allocating fresh. The evaluator uses
    /// this to fold `AlgebraicExpression` operands without allocating a
    /// new matrix at every step of a long expression chain.
    pub fn take_scratch(&self, dim: usize) -> SparseBoolMatrix {
        let mut pool = self.scratch.lock().unwrap();
        if let Some(pos) = pool.iter().position(|m| m.nrows() >= dim) {
            let mut m = pool.swap_remove(pos);
            m.resize(dim);
            return m;
        }
        SparseBoolMatrix::new(dim)
    }

    /// Returns a scratch matrix to the pool for reuse. The matrix's
    /// contents are irrelevant to the caller afterward — the next
    /// `take_scratch` may hand back a matrix with stale data, so callers
    /// must always `resize`/overwrite before reading, never assume it is
    /// pre-zeroed logically (it is zeroed in the sense of having no
    /// guaranteed cells, but the pool does not clear data eagerly since
    /// the common case is the caller is about to write a full fresh result
    /// into it anyway).
    pub fn return_scratch(&self, matrix: SparseBoolMatrix) {
        const MAX_POOL_SIZE: usize = 64;
        let mut pool = self.scratch.lock().unwrap();
        if pool.len() < MAX_POOL_SIZE {
            pool.push(matrix);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(10_000, 10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_name_returns_same_id() {
        let rt = Runtime::default();
        let a = rt.intern_label("Person").unwrap();
        let b = rt.intern_label("Person").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_get_different_ids() {
        let rt = Runtime::default();
        let a = rt.intern_label("Person").unwrap();
        let b = rt.intern_label("Company").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn label_and_relation_namespaces_are_independent() {
        let rt = Runtime::default();
        let label = rt.intern_label("KNOWS").unwrap();
        let relation = rt.intern_relation("KNOWS").unwrap();
        assert_eq!(label, 0);
        assert_eq!(relation, 0);
    }

    #[test]
    fn cap_exceeded_errors() {
        let rt = Runtime::new(1, 10);
        rt.intern_label("A").unwrap();
        let err = rt.intern_label("B").unwrap_err();
        assert_eq!(err, RuntimeError::LabelCapExceeded { cap: 1 });
    }

    #[test]
    fn name_lookup_round_trips() {
        let rt = Runtime::default();
        let id = rt.intern_label("Person").unwrap();
        assert_eq!(rt.label_name(id).as_deref(), Some("Person"));
        assert_eq!(rt.label_id("Person"), Some(id));
        assert_eq!(rt.label_id("Nonexistent"), None);
    }

    #[test]
    fn scratch_pool_reuses_matrices() {
        let rt = Runtime::default();
        let m = rt.take_scratch(8);
        assert_eq!(m.nrows(), 8);
        rt.return_scratch(m);

        let reused = rt.take_scratch(4);
        assert!(reused.nrows() >= 4);
    }
}
