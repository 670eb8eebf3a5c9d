//! Folds an [`AlgebraicExpression`] tree into a concrete matrix, and a whole
//! expression list into a stream of matched variable bindings.
//!
//! Follows `reachability.rs`'s established shape for talking to a [`Graph`]
//! — `graph.sync(policy)` once, then one `graph.read()` guard held for the
//! whole evaluation — generalized from a single frontier walk to an
//! arbitrary MUL/ADD/TRANSPOSE tree. `MUL` and `ADD` fold left-associated
//! into a rolling accumulator drawn from [`Runtime`]'s scratch pool; a
//! variable-length operand is expanded by repeated `mul` against itself
//! (matrix-power union of `R^a..R^b`) rather than the BFS-frontier strategy
//! `reachability::reachable` uses, since the evaluator needs a full result
//! matrix rather than a single-source frontier.

use thiserror::Error;

use crate::algebra::{AlgebraicExpression, MatrixRef, Op, Operand};
use crate::delta::DeltaError;
use crate::execution::{QueryTimeout, ResourceError, ResourceLimits};
use crate::graph::{Graph, GraphError, GraphReadGuard, NodeId, SyncPolicy};
use crate::matrix::{MatrixError, SparseBoolMatrix};
use crate::optimizer::StoreCardinality;

/// Errors raised while folding an expression tree or joining a result
/// stream. Subsystem errors are folded in here the same way `GraphError`
/// folds in `MatrixError`/`DeltaError`, so a caller driving `evaluate()`
/// only matches one error type.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("expression references unknown {kind} id {id}")]
    UnknownOperand { kind: &'static str, id: u32 },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("evaluation cancelled")]
    Cancelled,
}

pub type EvalResult<T> = Result<T, EvalError>;

/// One row of a result stream: a binding from each pattern variable
/// (a domain name from the originating `Pattern`) touched by the evaluated
/// expression list to a concrete node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTuple {
    bindings: Vec<(String, NodeId)>,
}

impl ResultTuple {
    /// The node bound to `var`, if this tuple touches that variable.
    pub fn get(&self, var: &str) -> Option<NodeId> {
        self.bindings.iter().find(|(name, _)| name == var).map(|(_, id)| *id)
    }

    /// Every variable name bound by this tuple, in binding order.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }
}

/// Folds `AlgebraicExpression` trees into result matrices and expression
/// lists into joined result streams, against one `Graph`.
pub struct ExpressionEvaluator<'g> {
    graph: &'g Graph,
    limits: ResourceLimits,
}

impl<'g> ExpressionEvaluator<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        ExpressionEvaluator { graph, limits: ResourceLimits::unlimited() }
    }

    /// Attaches `limits` so every intermediate product, variable-length
    /// expansion hop, result row width, and final result size is checked
    /// against `crate::execution::ResourceLimits`; this is the enforcement
    /// point a query dispatcher plugs into. `new()` leaves every limit
    /// unbounded, matching today's behavior for callers that don't opt in.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// A [`Cardinality`] source reading the graph's live label/relation
    /// counters, for `ExpressionOptimizer::optimize` to consult before
    /// evaluating. Takes the read lock for as long as the borrow lives —
    /// callers that also want to evaluate afterward should drop this (or
    /// the whole optimize-then-evaluate pass should share one guard).
    pub fn cardinality_source<'r>(&self, guard: &'r GraphReadGuard<'g>) -> StoreCardinality<'r>
    where
        'g: 'r,
    {
        StoreCardinality { labels: guard.labels(), relations: guard.relations() }
    }

    /// Evaluates one expression tree to its result matrix under `policy`.
    pub fn evaluate_expression(
        &self,
        expr: &AlgebraicExpression,
        policy: SyncPolicy,
        timeout: &QueryTimeout,
    ) -> EvalResult<SparseBoolMatrix> {
        self.graph.sync(policy)?;
        let guard = self.graph.read();
        self.eval_node(expr, &guard, timeout)
    }

    /// Evaluates a whole expression list, as produced by
    /// [`crate::builder::ExpressionBuilder::build`], and joins the
    /// per-expression result matrices into one stream of matched tuples.
    ///
    /// The builder only ever splits a pattern at a shared node (branch,
    /// forced return, variable-length edge, or a cycle closing back on
    /// itself — builder.rs's five rules), so expression `i`'s destination
    /// domain is always expression `i+1`'s source domain. Joining
    /// sequentially on that shared domain reconstructs exactly the bindings
    /// a single, unsplit evaluation would have produced.
    pub fn evaluate(
        &self,
        expressions: &[AlgebraicExpression],
        policy: SyncPolicy,
        timeout: &QueryTimeout,
    ) -> EvalResult<Vec<ResultTuple>> {
        let Some((first, rest)) = expressions.split_first() else {
            return Ok(Vec::new());
        };

        let src_domain = first.source().to_string();
        let dst_domain = first.destination().to_string();
        let matrix = self.evaluate_expression(first, policy, timeout)?;
        self.limits.check_intermediate_size("expression[0]", matrix.nnz())?;
        let mut rows: Vec<ResultTuple> = matrix
            .iter()
            .map(|(r, c, _)| ResultTuple {
                bindings: vec![(src_domain.clone(), NodeId(r as u64)), (dst_domain.clone(), NodeId(c as u64))],
            })
            .collect();

        for (i, expr) in rest.iter().enumerate() {
            if timeout.check().is_err() {
                tracing::debug!(stage = "join", expression = i + 1, "evaluator_cancelled");
                return Err(EvalError::Cancelled);
            }
            if rows.is_empty() {
                break;
            }

            let join_domain = expr.source().to_string();
            let dst_domain = expr.destination().to_string();
            let matrix = self.evaluate_expression(expr, policy, timeout)?;
            self.limits.check_intermediate_size(&format!("expression[{}]", i + 1), matrix.nnz())?;

            let mut joined = Vec::with_capacity(rows.len());
            for row in &rows {
                let Some(join_val) = row.get(&join_domain) else { continue };
                for (c, _cell) in matrix.row_iter(join_val.0 as usize) {
                    let mut bindings = row.bindings.clone();
                    bindings.push((dst_domain.clone(), NodeId(c as u64)));
                    joined.push(ResultTuple { bindings });
                }
            }
            self.limits.check_intermediate_size("join", joined.len())?;
            rows = joined;
        }

        if let Some(row) = rows.first() {
            self.limits.check_row_width(row.bindings.len())?;
        }
        self.limits.check_result_size(rows.len())?;

        Ok(rows)
    }

    fn eval_node(
        &self,
        expr: &AlgebraicExpression,
        guard: &GraphReadGuard<'_>,
        timeout: &QueryTimeout,
    ) -> EvalResult<SparseBoolMatrix> {
        if timeout.check().is_err() {
            tracing::debug!("evaluator_cancelled");
            return Err(EvalError::Cancelled);
        }
        match expr {
            AlgebraicExpression::Operand(o) => self.fetch_operand(o, guard),
            AlgebraicExpression::Operation { op: Op::Transpose, children } => {
                Ok(self.eval_node(&children[0], guard, timeout)?.transpose())
            }
            AlgebraicExpression::Operation { op: Op::Mul, children } => self.fold_mul(children, guard, timeout),
            AlgebraicExpression::Operation { op: Op::Add, children } => self.fold_add(children, guard, timeout),
        }
    }

    /// Left-associated `MUL` fold: each step's left-hand accumulator and
    /// right-hand operand are returned to the scratch pool the moment the
    /// product is computed, so the pool never has to hold more than the
    /// in-flight product plus whatever `fetch_operand` is about to hand back
    /// — typically 2 scratch matrices suffice.
    fn fold_mul(
        &self,
        children: &[AlgebraicExpression],
        guard: &GraphReadGuard<'_>,
        timeout: &QueryTimeout,
    ) -> EvalResult<SparseBoolMatrix> {
        let mut acc = self.eval_node(&children[0], guard, timeout)?;
        for child in &children[1..] {
            timeout.check().map_err(|_| EvalError::Cancelled)?;
            let rhs = self.eval_node(child, guard, timeout)?;
            let next = acc.mul(&rhs)?;
            self.limits.check_intermediate_size("mul", next.nnz())?;
            self.graph.runtime().return_scratch(acc);
            self.graph.runtime().return_scratch(rhs);
            acc = next;
        }
        Ok(acc)
    }

    fn fold_add(
        &self,
        children: &[AlgebraicExpression],
        guard: &GraphReadGuard<'_>,
        timeout: &QueryTimeout,
    ) -> EvalResult<SparseBoolMatrix> {
        let mut acc = self.eval_node(&children[0], guard, timeout)?;
        for child in &children[1..] {
            timeout.check().map_err(|_| EvalError::Cancelled)?;
            let rhs = self.eval_node(child, guard, timeout)?;
            let next = acc.add(&rhs);
            self.limits.check_intermediate_size("add", next.nnz())?;
            self.graph.runtime().return_scratch(acc);
            self.graph.runtime().return_scratch(rhs);
            acc = next;
        }
        Ok(acc)
    }

    /// Fetches one leaf operand's matrix under the active sync policy,
    /// applying its `transposed` flag and, for a variable-length relation
    /// operand, expanding it to the union of `R^a..R^b`.
    fn fetch_operand(&self, o: &Operand, guard: &GraphReadGuard<'_>) -> EvalResult<SparseBoolMatrix> {
        let base = match o.matrix_ref {
            MatrixRef::Label(id) => {
                let delta = guard.label_matrix(id).ok_or(EvalError::UnknownOperand { kind: "label", id })?;
                let m = delta.snapshot()?;
                if o.transposed { m.transpose() } else { m }
            }
            MatrixRef::Relation(id) => self.fetch_relation_operand(id, o.transposed, guard)?,
            MatrixRef::Adjacency => {
                let m = guard.adjacency().snapshot()?;
                if o.transposed { m.transpose() } else { m }
            }
        };

        match o.var_length {
            Some((lo, hi)) => self.expand_variable_length(&base, lo, hi),
            None => Ok(self.into_scratch(base)),
        }
    }

    /// A relation operand prefers a maintained transposed companion over
    /// transposing on demand, mirroring `graph::edges_in`'s identical
    /// choice for the same tradeoff.
    fn fetch_relation_operand(
        &self,
        relation_id: u32,
        transposed: bool,
        guard: &GraphReadGuard<'_>,
    ) -> EvalResult<SparseBoolMatrix> {
        let store = guard
            .relations()
            .get(&relation_id)
            .ok_or(EvalError::UnknownOperand { kind: "relation", id: relation_id })?;

        if !transposed {
            return Ok(store.matrix().snapshot()?);
        }
        match store.transposed() {
            Some(t) => Ok(t.snapshot()?),
            None => Ok(store.matrix().snapshot()?.transpose()),
        }
    }

    /// Copies `raw` into a buffer drawn from the runtime's scratch pool and
    /// returns `raw`'s own allocation to the pool, so a long MUL/ADD chain
    /// draws its operands from the same small set of recycled buffers
    /// instead of allocating fresh on every leaf.
    fn into_scratch(&self, raw: SparseBoolMatrix) -> SparseBoolMatrix {
        let dim = raw.nrows().max(raw.ncols());
        let mut scratch = self.graph.runtime().take_scratch(dim);
        scratch.clear();
        scratch.resize(dim);
        for (r, c, cell) in raw.iter() {
            for id in cell.edge_ids() {
                scratch.set(r, c, *id).expect("scratch resized to raw's own dimension cannot overflow bounds");
            }
        }
        self.graph.runtime().return_scratch(raw);
        scratch
    }

    /// Matrix-power expansion of a variable-length operand: the union of
    /// `base^a..base^b`, computed by repeated `mul` against `base`. This is
    /// the "whole result matrix" strategy; the complementary BFS-frontier
    /// strategy is what `reachability::reachable` already uses when only a
    /// single-source frontier, not a full result matrix, is wanted.
    fn expand_variable_length(&self, base: &SparseBoolMatrix, lo: usize, hi: usize) -> EvalResult<SparseBoolMatrix> {
        self.limits.check_recursion_depth(hi)?;
        let dim = base.nrows().max(base.ncols());
        let mut power = base.clone();
        let mut acc: Option<SparseBoolMatrix> = None;

        for hop in 1..=hi {
            if hop > 1 {
                power = power.mul(base)?;
            }
            if hop >= lo {
                acc = Some(match acc {
                    Some(a) => a.add(&power),
                    None => power.clone(),
                });
            }
        }

        Ok(acc.unwrap_or_else(|| SparseBoolMatrix::new(dim)))
    }
}
