//! Translates a query-graph pattern into an ordered list of
//! [`AlgebraicExpression`]s.
//!
//! A pattern is a small graph of its own: named node variables (each with
//! an optional label) joined by named edge variables (each with a
//! direction, optional relation type, and optional variable-length range).
//! The builder walks the pattern's edges in the order they were declared —
//! callers are expected to declare them in the same left-to-right order the
//! originating pattern text reads in, which is what gives the "deterministic
//! traversal order" the rewrite rules assume — and closes the current
//! expression whenever it hits a named return, a branch (a node touched by
//! more than one edge), a variable-length edge, or a cycle.

use std::collections::{HashMap, HashSet};

use crate::algebra::{AlgebraicExpression, Operand};
use crate::runtime::{Runtime, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// The pattern edge follows the underlying relation's stored direction.
    Out,
    /// The pattern edge runs against the underlying relation's stored
    /// direction (`(u)<-[r]-(v)` where `r` is stored `v -> u`).
    In,
    /// `(u)-[r]-(v)`, matching the relation in either direction.
    Undirected,
}

#[derive(Debug, Clone)]
pub struct PatternNode {
    pub var: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PatternEdge {
    pub var: Option<String>,
    pub src: String,
    pub dest: String,
    pub relation: Option<String>,
    pub direction: EdgeDirection,
    /// `Some((a, b))` for a variable-length edge `[:r*a..b]`.
    pub var_length: Option<(usize, usize)>,
}

/// A query graph: the builder's sole input.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub nodes: Vec<PatternNode>,
    pub edges: Vec<PatternEdge>,
    /// Variables (node or edge) whose value must survive past the
    /// expression boundary they fall on, forcing a split there.
    pub returns: HashSet<String>,
}

impl Pattern {
    pub fn new() -> Self {
        Pattern::default()
    }

    pub fn node(mut self, var: &str, label: Option<&str>) -> Self {
        self.nodes.push(PatternNode { var: var.to_string(), label: label.map(str::to_string) });
        self
    }

    pub fn edge(mut self, var: Option<&str>, src: &str, relation: Option<&str>, dest: &str, direction: EdgeDirection) -> Self {
        self.edges.push(PatternEdge {
            var: var.map(str::to_string),
            src: src.to_string(),
            dest: dest.to_string(),
            relation: relation.map(str::to_string),
            direction,
            var_length: None,
        });
        self
    }

    pub fn variable_length_edge(
        mut self,
        var: Option<&str>,
        src: &str,
        relation: Option<&str>,
        dest: &str,
        direction: EdgeDirection,
        range: (usize, usize),
    ) -> Self {
        self.edges.push(PatternEdge {
            var: var.map(str::to_string),
            src: src.to_string(),
            dest: dest.to_string(),
            relation: relation.map(str::to_string),
            direction,
            var_length: Some(range),
        });
        self
    }

    pub fn returning(mut self, vars: &[&str]) -> Self {
        self.returns.extend(vars.iter().map(|v| v.to_string()));
        self
    }

    fn node_by_var(&self, var: &str) -> Option<&PatternNode> {
        self.nodes.iter().find(|n| n.var == var)
    }

    /// Number of pattern edges touching each node variable, counting both
    /// endpoints. Used to detect branch points (degree ≥ 2).
    fn degree_map(&self) -> HashMap<&str, usize> {
        let mut degree = HashMap::new();
        for edge in &self.edges {
            *degree.entry(edge.src.as_str()).or_insert(0) += 1;
            *degree.entry(edge.dest.as_str()).or_insert(0) += 1;
        }
        degree
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AlgebraError {
    #[error("pattern edge {edge:?} has no relation type")]
    MissingRelation { edge: Option<String> },

    #[error("pattern references unknown node variable: {0}")]
    UnknownNode(String),

    #[error("interning error: {0}")]
    Runtime(#[from] RuntimeError),
}

pub type AlgebraResult<T> = Result<T, AlgebraError>;

/// Stateless: all the state it needs (label/relation ids) lives in the
/// shared [`Runtime`] passed to `build`.
#[derive(Debug, Default)]
pub struct ExpressionBuilder;

impl ExpressionBuilder {
    pub fn new() -> Self {
        ExpressionBuilder
    }

    /// Lowers `pattern` into an ordered list of algebraic expressions,
    /// splitting at branch points, variable-length edges, and closed cycles.
    pub fn build(&self, pattern: &Pattern, runtime: &Runtime) -> AlgebraResult<Vec<AlgebraicExpression>> {
        if pattern.edges.is_empty() {
            return match pattern.nodes.first() {
                Some(node) => Ok(vec![self.node_operand(node, runtime)?]),
                None => Ok(Vec::new()),
            };
        }

        let degree = pattern.degree_map();
        let mut expressions = Vec::new();
        let mut current: Option<AlgebraicExpression> = None;
        let mut seen_nodes: HashSet<&str> = HashSet::new();

        for (i, edge) in pattern.edges.iter().enumerate() {
            // A node with two or more outgoing edges forks the traversal:
            // finish whichever branch `current` was building before
            // starting the one this edge belongs to. Plain path
            // continuation (`current`'s destination is exactly this
            // edge's source) never trips this.
            if let Some(c) = &current {
                if c.destination() != edge.src {
                    expressions.push(current.take().unwrap());
                }
            }

            let is_cycle_close = seen_nodes.contains(edge.dest.as_str());
            let is_var_length = edge.var_length.is_some();

            let mut piece = self.edge_operand(edge, runtime)?;

            if current.is_none() {
                if let Some(node) = pattern.node_by_var(&edge.src) {
                    if let Some(label) = &node.label {
                        let label_op = self.label_operand(label, &edge.src, runtime)?;
                        piece = AlgebraicExpression::multiply_right(label_op, piece);
                    }
                }
            }
            seen_nodes.insert(edge.src.as_str());

            // A diagonal label operand for `dest` is only worth emitting
            // when this chain keeps extending through it (rule 4: elide
            // the shared diagonal at a fusion point and let the optimizer
            // complete it). Variable-length and cycle-closing edges always
            // split right after, so there is no "next operand" to fuse the
            // label into — emit it here instead.
            if !is_var_length || is_cycle_close {
                if let Some(node) = pattern.node_by_var(&edge.dest) {
                    if let Some(label) = &node.label {
                        let label_op = self.label_operand(label, &edge.dest, runtime)?;
                        piece = AlgebraicExpression::multiply_right(piece, label_op);
                    }
                }
            }
            seen_nodes.insert(edge.dest.as_str());

            if is_var_length {
                // Rule 3: flush whatever came before, the variable-length
                // operand stands alone, and the next edge starts fresh.
                if let Some(c) = current.take() {
                    expressions.push(c);
                }
                expressions.push(piece);
                continue;
            }

            current = Some(match current.take() {
                Some(c) => AlgebraicExpression::multiply_right(c, piece),
                None => piece,
            });

            // Degree 2 is the ordinary "one edge in, one edge out" shape of
            // an interior path node and is not a branch by itself — only a
            // node with a third incident edge genuinely forks the pattern
            // (the discontinuity check above handles forks the degree
            // threshold can't see: two outgoing edges sharing a source
            // that appear consecutively in the edge list).
            let dest_degree = degree.get(edge.dest.as_str()).copied().unwrap_or(0);
            let more_edges_follow = i + 1 < pattern.edges.len();
            let dest_is_branch = dest_degree >= 3 && more_edges_follow;
            let dest_is_return = pattern.returns.contains(&edge.dest)
                || edge.var.as_ref().is_some_and(|v| pattern.returns.contains(v));

            if dest_is_branch || dest_is_return || is_cycle_close {
                expressions.push(current.take().unwrap());
            }
        }

        if let Some(c) = current {
            expressions.push(c);
        }

        Ok(expressions)
    }

    fn label_operand(&self, label: &str, domain: &str, runtime: &Runtime) -> AlgebraResult<AlgebraicExpression> {
        let label_id = runtime.intern_label(label)?;
        Ok(AlgebraicExpression::operand(Operand::label(label, label_id, domain)))
    }

    fn node_operand(&self, node: &PatternNode, runtime: &Runtime) -> AlgebraResult<AlgebraicExpression> {
        match &node.label {
            Some(label) => self.label_operand(label, &node.var, runtime),
            None => Err(AlgebraError::UnknownNode(node.var.clone())),
        }
    }

    fn edge_operand(&self, edge: &PatternEdge, runtime: &Runtime) -> AlgebraResult<AlgebraicExpression> {
        let relation_name = edge
            .relation
            .as_deref()
            .ok_or_else(|| AlgebraError::MissingRelation { edge: edge.var.clone() })?;
        let relation_id = runtime.intern_relation(relation_name)?;

        if let Some(range) = edge.var_length {
            let operand = Operand::variable_length(relation_name, relation_id, &edge.src, &edge.dest, edge.var.as_deref(), range);
            return Ok(AlgebraicExpression::operand(operand));
        }

        let forward = || {
            AlgebraicExpression::operand(Operand::relation(
                relation_name,
                relation_id,
                &edge.src,
                &edge.dest,
                edge.var.as_deref(),
            ))
        };

        Ok(match edge.direction {
            EdgeDirection::Out => forward(),
            EdgeDirection::In => {
                let stored = Operand::relation(relation_name, relation_id, &edge.dest, &edge.src, edge.var.as_deref());
                AlgebraicExpression::transpose(AlgebraicExpression::operand(stored))
            }
            EdgeDirection::Undirected => {
                let backward = AlgebraicExpression::transpose(forward());
                AlgebraicExpression::add_right(forward(), backward)
            }
        })
    }
}
