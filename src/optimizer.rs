//! Fixed-point term rewriting over an [`AlgebraicExpression`] tree.
//!
//! The optimizer applies a fixed battery of semantics-preserving rewrites —
//! transpose push-down, multiplication-over-addition distribution, and
//! redundant diagonal-operand elimination — repeatedly until none apply.
//! Every rewrite either removes a `TRANSPOSE` node, removes an operand, or
//! shrinks the tree, so the system is strongly normalizing; the driver
//! below just iterates `rewrite_once` until it reports no change.

use std::collections::HashMap;

use crate::algebra::{AlgebraicExpression, MatrixRef, Op, Operand};
use crate::store::{LabelStore, RelationStore};

/// Per-type cardinality the distributivity heuristic reads `nvals` from:
/// it compares `nvals(B+C)` against `nvals(A)*nvals(D)` using the
/// cardinality counters that already live on [`LabelStore`]/[`RelationStore`];
/// this trait lets the optimizer consult them without depending on `Graph`
/// directly.
pub trait Cardinality {
    fn label_nvals(&self, label_id: u32) -> usize;
    fn relation_nvals(&self, relation_id: u32) -> usize;
}

/// A do-nothing cardinality source: every distributivity rewrite is skipped
/// since no `nvals(B+C) < nvals(A)*nvals(D)` estimate can beat unknown
/// data. Useful for tests exercising the transpose/redundant-operand
/// rewrites in isolation.
pub struct NoCardinality;

impl Cardinality for NoCardinality {
    fn label_nvals(&self, _label_id: u32) -> usize {
        usize::MAX
    }
    fn relation_nvals(&self, _relation_id: u32) -> usize {
        usize::MAX
    }
}

/// Live cardinality counters backed by a graph's actual label/relation
/// stores, for the distributivity heuristic to consult at evaluation time.
/// Keyed by the same interned ids `Graph` itself uses
/// (`HashMap<u32, LabelStore>`/`HashMap<u32, RelationStore>` — label and
/// relation ids are dense but not contiguous once the id caps grow past
/// what was ever actually interned, so a `Vec` indexed by id would need
/// resizing logic this already-owned map makes unnecessary).
pub struct StoreCardinality<'a> {
    pub labels: &'a HashMap<u32, LabelStore>,
    pub relations: &'a HashMap<u32, RelationStore>,
}

impl Cardinality for StoreCardinality<'_> {
    fn label_nvals(&self, label_id: u32) -> usize {
        self.labels.get(&label_id).map_or(0, LabelStore::cardinality)
    }

    fn relation_nvals(&self, relation_id: u32) -> usize {
        self.relations.get(&relation_id).map_or(0, RelationStore::cardinality)
    }
}

fn operand_nvals(op: &Operand, card: &dyn Cardinality) -> usize {
    match op.matrix_ref {
        MatrixRef::Label(id) => card.label_nvals(id),
        MatrixRef::Relation(id) => card.relation_nvals(id),
        MatrixRef::Adjacency => usize::MAX,
    }
}

/// Rough `nvals` estimate for an arbitrary subexpression: the product of
/// operand estimates along a MUL chain is an upper bound (true `nvals` is
/// never larger than the smallest factor, but this heuristic only needs a
/// comparison, not an exact count), and ADD takes the sum.
fn estimate_nvals(expr: &AlgebraicExpression, card: &dyn Cardinality) -> usize {
    match expr {
        AlgebraicExpression::Operand(o) => operand_nvals(o, card),
        AlgebraicExpression::Operation { op: Op::Transpose, children } => estimate_nvals(&children[0], card),
        AlgebraicExpression::Operation { op: Op::Mul, children } => {
            children.iter().map(|c| estimate_nvals(c, card)).fold(1usize, |acc, n| acc.saturating_mul(n))
        }
        AlgebraicExpression::Operation { op: Op::Add, children } => {
            children.iter().map(|c| estimate_nvals(c, card)).fold(0usize, |acc, n| acc.saturating_add(n))
        }
    }
}

#[derive(Debug, Default)]
pub struct ExpressionOptimizer;

impl ExpressionOptimizer {
    pub fn new() -> Self {
        ExpressionOptimizer
    }

    /// Rewrites `expr` to a fixed point using `card` for the distributivity
    /// heuristic. Pass [`NoCardinality`] to disable distribution entirely.
    pub fn optimize(&self, expr: AlgebraicExpression, card: &dyn Cardinality) -> AlgebraicExpression {
        let mut current = expr;
        let mut rewrites = 0usize;
        loop {
            let (next, changed) = rewrite_once(current, card);
            current = next;
            if !changed {
                if rewrites > 0 {
                    tracing::debug!(rewrites, "optimizer_rewrites_applied");
                }
                return current;
            }
            rewrites += 1;
        }
    }
}

/// Applies the first matching rewrite found pre-order, depth-first, and
/// reports whether anything changed. The driver above loops this to a
/// fixed point rather than trying to find a single confluent single-pass
/// rewrite, which keeps the individual rules simple and locally checkable.
fn rewrite_once(expr: AlgebraicExpression, card: &dyn Cardinality) -> (AlgebraicExpression, bool) {
    // Rewrite children first so pushed-down transposes and fused operands
    // are visible to the rules examining this node.
    let (expr, children_changed) = rewrite_children(expr, card);
    if children_changed {
        return (expr, true);
    }

    if let Some(rewritten) = try_transpose_push(&expr) {
        return (rewritten, true);
    }
    if let Some(rewritten) = try_redundant_operand_elimination(&expr) {
        return (rewritten, true);
    }
    if let Some(rewritten) = try_distribute(&expr, card) {
        return (rewritten, true);
    }

    (expr, false)
}

fn rewrite_children(expr: AlgebraicExpression, card: &dyn Cardinality) -> (AlgebraicExpression, bool) {
    match expr {
        AlgebraicExpression::Operand(_) => (expr, false),
        AlgebraicExpression::Operation { op, children } => {
            let mut changed = false;
            let mut new_children = Vec::with_capacity(children.len());
            for child in children {
                let (rewritten, child_changed) = rewrite_once(child, card);
                changed |= child_changed;
                new_children.push(rewritten);
            }
            (AlgebraicExpression::Operation { op, children: new_children }, changed)
        }
    }
}

/// `T(T(X)) -> X`, `T(A*B) -> T(B)*T(A)`, `T(A+B) -> T(A)+T(B)`,
/// `T(L) -> L` for a diagonal label operand.
fn try_transpose_push(expr: &AlgebraicExpression) -> Option<AlgebraicExpression> {
    let AlgebraicExpression::Operation { op: Op::Transpose, children } = expr else {
        return None;
    };
    let inner = &children[0];

    match inner {
        AlgebraicExpression::Operand(o) if o.diagonal => Some(inner.clone()),
        AlgebraicExpression::Operand(_) => None,
        AlgebraicExpression::Operation { op: Op::Transpose, children: grandchildren } => Some(grandchildren[0].clone()),
        AlgebraicExpression::Operation { op: inner_op @ (Op::Mul | Op::Add), children: inner_children } => {
            let transposed_children: Vec<AlgebraicExpression> = match inner_op {
                Op::Mul => inner_children.iter().rev().cloned().map(AlgebraicExpression::transpose).collect(),
                _ => inner_children.iter().cloned().map(AlgebraicExpression::transpose).collect(),
            };
            Some(AlgebraicExpression::Operation { op: *inner_op, children: transposed_children })
        }
        AlgebraicExpression::Operation { op: Op::Transpose, .. } => unreachable!(),
    }
}

/// `L . R . L -> L . R` when `R`'s far endpoint already implies label `L`
/// (the relation operand's own domain metadata is the only signal the
/// optimizer has for this without consulting the graph, so this fires
/// whenever the redundant `L` operand's domain matches the adjacent
/// relation operand's domain on that side — the domains only coincide this
/// way when the builder fused them from the same typed-edge endpoint).
/// Also folds an adjacent `T(L) . L -> L` pair (diagonal `L`).
fn try_redundant_operand_elimination(expr: &AlgebraicExpression) -> Option<AlgebraicExpression> {
    let AlgebraicExpression::Operation { op: Op::Mul, children } = expr else {
        return None;
    };
    if children.len() < 2 {
        return None;
    }

    for i in 0..children.len() - 1 {
        let a = &children[i];
        let b = &children[i + 1];
        if same_diagonal_label(a, b) {
            let mut new_children = children.clone();
            new_children.remove(i + 1);
            return Some(rebuild_mul(new_children));
        }
    }

    // L . R . L: a diagonal label bookending a single relation operand
    // where the relation's opposite endpoint already carries that label.
    if children.len() >= 3 {
        for i in 0..children.len() - 2 {
            let (first, mid, last) = (&children[i], &children[i + 1], &children[i + 2]);
            if let (AlgebraicExpression::Operand(f), AlgebraicExpression::Operand(m), AlgebraicExpression::Operand(l)) =
                (first, mid, last)
            {
                if f.diagonal
                    && l.diagonal
                    && f.label == l.label
                    && matches!(m.matrix_ref, MatrixRef::Relation(_))
                    && f.dest_domain == m.src_domain
                    && l.src_domain == m.dest_domain
                {
                    let mut new_children = children.clone();
                    new_children.remove(i + 2);
                    return Some(rebuild_mul(new_children));
                }
            }
        }
    }

    None
}

/// `true` for two adjacent operands that cancel as `T(L) . L` or `L . T(L)`
/// for the same diagonal label `L` (transposing a diagonal is a no-op, so
/// the pair is just `L . L`, which for a boolean diagonal idempotently
/// equals `L`).
fn same_diagonal_label(a: &AlgebraicExpression, b: &AlgebraicExpression) -> bool {
    let (AlgebraicExpression::Operand(a), AlgebraicExpression::Operand(b)) = (a, b) else {
        return false;
    };
    a.diagonal && b.diagonal && a.matrix_ref == b.matrix_ref
}

fn rebuild_mul(mut children: Vec<AlgebraicExpression>) -> AlgebraicExpression {
    if children.len() == 1 {
        return children.remove(0);
    }
    AlgebraicExpression::Operation { op: Op::Mul, children }
}

/// `A . (B + C) . D -> A.B.D + A.C.D` when the heuristic predicts the sums
/// sparser than the shared factor: `nvals(B+C) < nvals(A) * nvals(D)`.
fn try_distribute(expr: &AlgebraicExpression, card: &dyn Cardinality) -> Option<AlgebraicExpression> {
    let AlgebraicExpression::Operation { op: Op::Mul, children } = expr else {
        return None;
    };
    let add_pos = children
        .iter()
        .position(|c| matches!(c, AlgebraicExpression::Operation { op: Op::Add, .. }))?;

    let AlgebraicExpression::Operation { children: sum_children, .. } = &children[add_pos] else {
        unreachable!()
    };

    let left: Vec<AlgebraicExpression> = children[..add_pos].to_vec();
    let right: Vec<AlgebraicExpression> = children[add_pos + 1..].to_vec();

    let left_nvals: usize = left.iter().map(|c| estimate_nvals(c, card)).fold(1, |a, b| a.saturating_mul(b));
    let right_nvals: usize = right.iter().map(|c| estimate_nvals(c, card)).fold(1, |a, b| a.saturating_mul(b));
    let factor_cost = left_nvals.saturating_mul(right_nvals);
    let sum_cost = estimate_nvals(&children[add_pos], card);

    if sum_cost >= factor_cost {
        return None;
    }

    let mut distributed = Vec::with_capacity(sum_children.len());
    for term in sum_children {
        let mut parts = left.clone();
        parts.push(term.clone());
        parts.extend(right.clone());
        distributed.push(rebuild_mul(parts));
    }
    Some(AlgebraicExpression::Operation { op: Op::Add, children: distributed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Operand;

    fn label(name: &str, id: u32, domain: &str) -> AlgebraicExpression {
        AlgebraicExpression::operand(Operand::label(name, id, domain))
    }

    fn relation(name: &str, id: u32, src: &str, dest: &str) -> AlgebraicExpression {
        AlgebraicExpression::operand(Operand::relation(name, id, src, dest, None))
    }

    #[test]
    fn double_transpose_cancels() {
        let opt = ExpressionOptimizer::new();
        let inner = relation("friend", 0, "p", "f");
        let expr = AlgebraicExpression::transpose(AlgebraicExpression::transpose(inner.clone()));
        assert_eq!(opt.optimize(expr, &NoCardinality), inner);
    }

    #[test]
    fn transpose_of_diagonal_label_is_a_no_op() {
        let opt = ExpressionOptimizer::new();
        let l = label("Person", 0, "p");
        let expr = AlgebraicExpression::transpose(l.clone());
        assert_eq!(opt.optimize(expr, &NoCardinality), l);
    }

    #[test]
    fn transpose_of_product_reverses_and_transposes_each_factor() {
        let opt = ExpressionOptimizer::new();
        let a = relation("friend", 0, "p", "f");
        let b = relation("visit", 1, "f", "c");
        let expr = AlgebraicExpression::transpose(AlgebraicExpression::multiply_right(a.clone(), b.clone()));

        let result = opt.optimize(expr, &NoCardinality);
        assert_eq!(result.source(), "c");
        assert_eq!(result.destination(), "p");
        assert_eq!(result.operand_count(), 2);
    }

    #[test]
    fn transpose_of_sum_distributes_over_each_term() {
        let opt = ExpressionOptimizer::new();
        let a = relation("friend", 0, "p", "f");
        let b = relation("rival", 1, "p", "f");
        let expr = AlgebraicExpression::transpose(AlgebraicExpression::add_right(a, b));
        let result = opt.optimize(expr, &NoCardinality);
        assert!(matches!(result, AlgebraicExpression::Operation { op: Op::Add, .. }));
        assert_eq!(result.source(), "f");
        assert_eq!(result.destination(), "p");
    }

    #[test]
    fn adjacent_diagonal_labels_collapse_to_one() {
        let opt = ExpressionOptimizer::new();
        let l1 = label("Person", 0, "p");
        let l2 = label("Person", 0, "p");
        let r = relation("friend", 0, "p", "f");
        let expr = AlgebraicExpression::multiply_right(AlgebraicExpression::multiply_right(l1, l2), r.clone());

        let result = opt.optimize(expr, &NoCardinality);
        assert_eq!(result.operand_count(), 2);
    }

    #[test]
    fn l_r_l_eliminates_redundant_trailing_label() {
        let opt = ExpressionOptimizer::new();
        // Person(p) . friend(p,f) . Person(f): the relation's own dest
        // domain "f" already implies the trailing label, so it collapses.
        let l1 = label("Person", 0, "p");
        let r = relation("friend", 0, "p", "f");
        let l2 = label("Person", 0, "f");
        let expr = AlgebraicExpression::multiply_right(AlgebraicExpression::multiply_right(l1.clone(), r.clone()), l2);

        let result = opt.optimize(expr, &NoCardinality);
        assert_eq!(result.operand_count(), 2);
        assert_eq!(result.source(), "p");
        assert_eq!(result.destination(), "f");
    }

    #[test]
    fn distribution_is_skipped_without_a_favorable_cardinality_estimate() {
        let opt = ExpressionOptimizer::new();
        let a = relation("friend", 0, "p", "f");
        let b = relation("visit", 1, "f", "c");
        let c = relation("rival", 2, "f", "c");
        let sum = AlgebraicExpression::add_right(b, c);
        let expr = AlgebraicExpression::multiply_right(a, sum);

        // NoCardinality reports usize::MAX for every operand, so the sum
        // never looks cheaper than the product and distribution is skipped.
        let result = opt.optimize(expr.clone(), &NoCardinality);
        assert_eq!(result, expr);
    }

    struct FixedCardinality {
        small: u32,
    }
    impl Cardinality for FixedCardinality {
        fn label_nvals(&self, _label_id: u32) -> usize {
            1
        }
        fn relation_nvals(&self, relation_id: u32) -> usize {
            if relation_id == self.small {
                1
            } else {
                1_000
            }
        }
    }

    #[test]
    fn distribution_applies_when_the_sum_is_cheaper_than_the_factor() {
        let opt = ExpressionOptimizer::new();
        let a = relation("friend", 0, "p", "f");
        let b = relation("visit", 1, "f", "c");
        let c = relation("rival", 2, "f", "c");
        let sum = AlgebraicExpression::add_right(b, c);
        let expr = AlgebraicExpression::multiply_right(a, sum);

        let card = FixedCardinality { small: 0 };
        let result = opt.optimize(expr, &card);
        assert!(matches!(result, AlgebraicExpression::Operation { op: Op::Add, .. }));
        assert_eq!(result.child_count(), 2);
    }
}
