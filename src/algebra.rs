//! The algebraic expression tree: the IR that sits between a pattern match
//! and the matrices a [`crate::graph::Graph`] owns.
//!
//! A leaf [`Operand`] names one matrix (a label's diagonal, a relation's
//! adjacency, or the global adjacency matrix) together with the symbolic
//! domain names its two axes are bound to. An internal [`AlgebraicExpression::Operation`]
//! node composes children with `MUL` (n-ary matrix multiply, left to right),
//! `ADD` (n-ary union), or `TRANSPOSE` (unary). [`crate::builder::ExpressionBuilder`]
//! produces these trees from a pattern graph; [`crate::optimizer::ExpressionOptimizer`]
//! rewrites them; [`crate::evaluator::ExpressionEvaluator`] folds them into a
//! result matrix.

use std::fmt;

/// Which concrete matrix an [`Operand`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixRef {
    /// A label's diagonal matrix.
    Label(u32),
    /// A relation type's adjacency matrix.
    Relation(u32),
    /// The graph-wide union adjacency matrix.
    Adjacency,
}

/// A leaf of the expression tree: a named reference to one matrix plus the
/// domain metadata the tree's composition rules check multiply/add
/// legality against.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub matrix_ref: MatrixRef,
    /// True for a label operand: its nonzero entries lie only on the diagonal.
    pub diagonal: bool,
    /// True if this leaf should be read through its transposed view.
    pub transposed: bool,
    pub src_domain: String,
    pub dest_domain: String,
    /// The edge pattern variable this operand was built from, if any.
    pub edge_name: Option<String>,
    /// The label/relation name this operand was built from, for diagnostics.
    pub label: Option<String>,
    /// `Some((a,b))` for a variable-length edge operand `[:r*a..b]`.
    pub var_length: Option<(usize, usize)>,
}

impl Operand {
    /// A diagonal label operand bound to one domain (source and destination
    /// coincide — see the GLOSSARY's "diagonal operand").
    pub fn label(name: &str, label_id: u32, domain: &str) -> Self {
        Operand {
            matrix_ref: MatrixRef::Label(label_id),
            diagonal: true,
            transposed: false,
            src_domain: domain.to_string(),
            dest_domain: domain.to_string(),
            edge_name: None,
            label: Some(name.to_string()),
            var_length: None,
        }
    }

    /// A relation operand bound between two distinct domains.
    pub fn relation(
        name: &str,
        relation_id: u32,
        src_domain: &str,
        dest_domain: &str,
        edge_name: Option<&str>,
    ) -> Self {
        Operand {
            matrix_ref: MatrixRef::Relation(relation_id),
            diagonal: false,
            transposed: false,
            src_domain: src_domain.to_string(),
            dest_domain: dest_domain.to_string(),
            edge_name: edge_name.map(str::to_string),
            label: Some(name.to_string()),
            var_length: None,
        }
    }

    /// A variable-length relation operand `[:r*a..b]`.
    pub fn variable_length(
        name: &str,
        relation_id: u32,
        src_domain: &str,
        dest_domain: &str,
        edge_name: Option<&str>,
        range: (usize, usize),
    ) -> Self {
        let mut op = Operand::relation(name, relation_id, src_domain, dest_domain, edge_name);
        op.var_length = Some(range);
        op
    }

    pub fn transposed(mut self) -> Self {
        self.transposed = !self.transposed;
        std::mem::swap(&mut self.src_domain, &mut self.dest_domain);
        self
    }
}

/// The three composition operators. `Mul`/`Add` are n-ary; `Transpose` is
/// always unary (its `children` list has exactly one entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Mul,
    Add,
    Transpose,
}

/// Which side of an n-ary chain a query or mutator addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn flip(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// The expression tree itself: either a leaf [`Operand`] or an n-ary
/// [`Op`] composing an ordered list of children.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraicExpression {
    Operand(Operand),
    Operation { op: Op, children: Vec<AlgebraicExpression> },
}

impl fmt::Display for AlgebraicExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgebraicExpression::Operand(o) => {
                write!(f, "{}({}->{})", o.label.as_deref().unwrap_or("?"), o.src_domain, o.dest_domain)
            }
            AlgebraicExpression::Operation { op: Op::Transpose, children } => {
                write!(f, "T({})", children[0])
            }
            AlgebraicExpression::Operation { op, children } => {
                let sep = match op {
                    Op::Mul => " * ",
                    Op::Add => " + ",
                    Op::Transpose => unreachable!(),
                };
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(sep))
            }
        }
    }
}

impl AlgebraicExpression {
    pub fn operand(op: Operand) -> Self {
        AlgebraicExpression::Operand(op)
    }

    /// The symbolic source domain, propagated from the leftmost leaf.
    pub fn source(&self) -> &str {
        match self {
            AlgebraicExpression::Operand(o) => &o.src_domain,
            AlgebraicExpression::Operation { op: Op::Transpose, children } => children[0].destination(),
            AlgebraicExpression::Operation { children, .. } => children.first().expect("non-empty children").source(),
        }
    }

    /// The symbolic destination domain, propagated from the rightmost leaf.
    pub fn destination(&self) -> &str {
        match self {
            AlgebraicExpression::Operand(o) => &o.dest_domain,
            AlgebraicExpression::Operation { op: Op::Transpose, children } => children[0].source(),
            AlgebraicExpression::Operation { children, .. } => children.last().expect("non-empty children").destination(),
        }
    }

    /// The edge pattern variable this expression is "currently" bound to:
    /// the rightmost operand's for `MUL` (mirrors `destination()`), the
    /// common one for `ADD` (mirrors `source()`), unaffected by `TRANSPOSE`.
    pub fn edge(&self) -> Option<&str> {
        match self {
            AlgebraicExpression::Operand(o) => o.edge_name.as_deref(),
            AlgebraicExpression::Operation { op: Op::Transpose, children } => children[0].edge(),
            AlgebraicExpression::Operation { op: Op::Mul, children } => {
                children.last().expect("non-empty children").edge()
            }
            AlgebraicExpression::Operation { op: Op::Add, children } => {
                children.first().expect("non-empty children").edge()
            }
        }
    }

    /// True iff every root-to-leaf path carries an odd number of `TRANSPOSE`
    /// nodes (the "effective" transpose at this expression's boundary).
    /// Inconsistent parity across children (mixed, pre-optimization trees)
    /// reports `false` — only a uniformly-transposed expression is `true`.
    pub fn transposed(&self) -> bool {
        self.transpose_parity().unwrap_or(false)
    }

    fn transpose_parity(&self) -> Option<bool> {
        match self {
            AlgebraicExpression::Operand(o) => Some(o.transposed),
            AlgebraicExpression::Operation { op: Op::Transpose, children } => {
                children[0].transpose_parity().map(|p| !p)
            }
            AlgebraicExpression::Operation { children, .. } => {
                let first = children[0].transpose_parity()?;
                children[1..]
                    .iter()
                    .all(|c| c.transpose_parity() == Some(first))
                    .then_some(first)
            }
        }
    }

    /// Number of `Operand` leaves in this tree.
    pub fn operand_count(&self) -> usize {
        match self {
            AlgebraicExpression::Operand(_) => 1,
            AlgebraicExpression::Operation { children, .. } => children.iter().map(Self::operand_count).sum(),
        }
    }

    /// Number of direct children (0 for an operand, the arity of the
    /// operation otherwise).
    pub fn child_count(&self) -> usize {
        match self {
            AlgebraicExpression::Operand(_) => 0,
            AlgebraicExpression::Operation { children, .. } => children.len(),
        }
    }

    /// True iff some leaf matches every `Some` criterion given (a `None`
    /// criterion matches anything).
    pub fn contains_operand(
        &self,
        src: Option<&str>,
        dest: Option<&str>,
        edge: Option<&str>,
        label: Option<&str>,
    ) -> bool {
        self.locate_operand(src, dest, edge, label).is_some()
    }

    /// Returns the first leaf (pre-order) matching every `Some` criterion.
    pub fn locate_operand(
        &self,
        src: Option<&str>,
        dest: Option<&str>,
        edge: Option<&str>,
        label: Option<&str>,
    ) -> Option<&Operand> {
        match self {
            AlgebraicExpression::Operand(o) => {
                let matches = src.map_or(true, |s| o.src_domain == s)
                    && dest.map_or(true, |d| o.dest_domain == d)
                    && edge.map_or(true, |e| o.edge_name.as_deref() == Some(e))
                    && label.map_or(true, |l| o.label.as_deref() == Some(l));
                matches.then_some(o)
            }
            AlgebraicExpression::Operation { children, .. } => {
                children.iter().find_map(|c| c.locate_operand(src, dest, edge, label))
            }
        }
    }

    /// Merges `op` over `parts`, flattening any part that is already an
    /// `Operation` of the same `op` so the tree stays n-ary rather than
    /// growing artificially deep nested binary chains.
    fn flatten(op: Op, parts: Vec<AlgebraicExpression>) -> AlgebraicExpression {
        let mut children = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                AlgebraicExpression::Operation { op: inner_op, children: inner } if inner_op == op => {
                    children.extend(inner);
                }
                other => children.push(other),
            }
        }
        AlgebraicExpression::Operation { op, children }
    }

    pub fn multiply_left(a: AlgebraicExpression, root: AlgebraicExpression) -> AlgebraicExpression {
        Self::flatten(Op::Mul, vec![a, root])
    }

    pub fn multiply_right(root: AlgebraicExpression, a: AlgebraicExpression) -> AlgebraicExpression {
        Self::flatten(Op::Mul, vec![root, a])
    }

    pub fn add_left(a: AlgebraicExpression, root: AlgebraicExpression) -> AlgebraicExpression {
        Self::flatten(Op::Add, vec![a, root])
    }

    pub fn add_right(root: AlgebraicExpression, a: AlgebraicExpression) -> AlgebraicExpression {
        Self::flatten(Op::Add, vec![root, a])
    }

    pub fn transpose(root: AlgebraicExpression) -> AlgebraicExpression {
        AlgebraicExpression::Operation { op: Op::Transpose, children: vec![root] }
    }

    /// Removes the leftmost leaf operand, returning `(removed, remaining)`.
    /// `remaining` is `None` when the whole tree was just that one operand.
    pub fn remove_source(self) -> (AlgebraicExpression, Option<AlgebraicExpression>) {
        Self::remove_side(self, Side::Left)
    }

    /// Removes the rightmost leaf operand, returning `(removed, remaining)`.
    pub fn remove_dest(self) -> (AlgebraicExpression, Option<AlgebraicExpression>) {
        Self::remove_side(self, Side::Right)
    }

    /// Descends into the leftmost/rightmost child, recursing through
    /// `TRANSPOSE` (which flips the side) and unwrapping a trivial
    /// single-child `MUL`/`ADD` left behind by the removal.
    fn remove_side(self, side: Side) -> (AlgebraicExpression, Option<AlgebraicExpression>) {
        match self {
            AlgebraicExpression::Operand(_) => (self, None),
            AlgebraicExpression::Operation { op: Op::Transpose, mut children } => {
                let child = children.remove(0);
                let (removed, remaining) = Self::remove_side(child, side.flip());
                let remaining =
                    remaining.map(|r| AlgebraicExpression::Operation { op: Op::Transpose, children: vec![r] });
                (removed, remaining)
            }
            AlgebraicExpression::Operation { op, mut children } => {
                let idx = match side {
                    Side::Left => 0,
                    Side::Right => children.len() - 1,
                };
                let target = children.remove(idx);
                let (removed, remaining_target) = Self::remove_side(target, side);
                if let Some(r) = remaining_target {
                    match side {
                        Side::Left => children.insert(0, r),
                        Side::Right => children.push(r),
                    }
                }
                let remaining = match children.len() {
                    0 => None,
                    1 => Some(children.into_iter().next().unwrap()),
                    _ => Some(AlgebraicExpression::Operation { op, children }),
                };
                (removed, remaining)
            }
        }
    }
}
