//! # Declarative Pattern Matching for Optimization Rules
//!
//! Each rule declares a `Pattern` describing the shape of expressions it can transform.
//! The scheduler enumerates [`Binding`]s of that pattern against the memo and calls the
//! rule once per binding, so a rule never walks the memo itself.
//!
//! ## Pattern Language
//!
//! - `Pattern::Operator(matcher, children)`: the operator satisfies `matcher` and each
//!   child group has an expression matching the child pattern.
//! - `Pattern::Guarded(matcher, guard, children)`: as above, and `guard` accepts the
//!   operator's data (e.g. only inner joins).
//! - `Pattern::Any`: any child group. It binds the group id, not an expression.
//! - `Pattern::Leaf`: an expression with no children.
//!
//! ## Binding Enumeration
//!
//! A non-`Any` child pattern is tried against every expression of the child group, and
//! each match yields a separate binding. Bindings for a multi-child pattern are the
//! cartesian product of the per-child matches, in memo order. Enumeration stops at a
//! caller-supplied limit.

use crate::expr::{LogicalOpKind, Operator, PhysicalOpKind};
use crate::memo::{ExprId, GroupId, Memo};
use std::fmt;

/// Predicate on operator data, used by [`Pattern::Guarded`].
#[derive(Clone, Copy)]
pub struct Guard(pub fn(&Operator) -> bool);

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}

/// Pattern for matching expressions in the memo.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Match an operator with child patterns.
    Operator(OpMatcher, Vec<Pattern>),
    /// Match an operator accepted by the guard, with child patterns.
    Guarded(OpMatcher, Guard, Vec<Pattern>),
    /// Match any subtree (group).
    Any,
    /// Match a leaf node (no children).
    Leaf,
}

/// Matcher for operator types (without data).
#[derive(Debug, Clone)]
pub enum OpMatcher {
    LogicalOp(LogicalOpKind),
    PhysicalOp(PhysicalOpKind),
    AnyLogical,
    AnyPhysical,
}

impl OpMatcher {
    pub fn matches(&self, op: &Operator) -> bool {
        match (op, self) {
            (Operator::Logical(l), OpMatcher::LogicalOp(kind)) => l.kind() == *kind,
            (Operator::Physical(p), OpMatcher::PhysicalOp(kind)) => p.kind() == *kind,
            (Operator::Logical(_), OpMatcher::AnyLogical) => true,
            (Operator::Physical(_), OpMatcher::AnyPhysical) => true,
            _ => false,
        }
    }

    fn logical_kinds(&self) -> Vec<LogicalOpKind> {
        match self {
            OpMatcher::LogicalOp(kind) => vec![*kind],
            OpMatcher::AnyLogical => LogicalOpKind::ALL.to_vec(),
            OpMatcher::PhysicalOp(_) | OpMatcher::AnyPhysical => vec![],
        }
    }
}

impl Pattern {
    /// Logical join with two any-children.
    pub fn join() -> Self {
        Self::logical(LogicalOpKind::Join, vec![Pattern::Any, Pattern::Any])
    }

    /// Logical join whose left child is also a join.
    pub fn join_join_left() -> Self {
        Self::logical(LogicalOpKind::Join, vec![Self::join(), Pattern::Any])
    }

    pub fn scan() -> Self {
        Self::logical(LogicalOpKind::Scan, vec![])
    }

    pub fn filter() -> Self {
        Self::logical(LogicalOpKind::Filter, vec![Pattern::Any])
    }

    pub fn aggregate() -> Self {
        Self::logical(LogicalOpKind::Aggregate, vec![Pattern::Any])
    }

    pub fn sort() -> Self {
        Self::logical(LogicalOpKind::Sort, vec![Pattern::Any])
    }

    pub fn limit() -> Self {
        Self::logical(LogicalOpKind::Limit, vec![Pattern::Any])
    }

    /// Filter on top of a join.
    pub fn filter_join() -> Self {
        Self::logical(LogicalOpKind::Filter, vec![Self::join()])
    }

    pub fn project() -> Self {
        Self::logical(LogicalOpKind::Project, vec![Pattern::Any])
    }

    pub fn logical(kind: LogicalOpKind, children: Vec<Pattern>) -> Self {
        Pattern::Operator(OpMatcher::LogicalOp(kind), children)
    }

    /// Restrict the root of this pattern with a guard on the operator's data.
    pub fn guarded(self, guard: fn(&Operator) -> bool) -> Self {
        match self {
            Pattern::Operator(m, children) | Pattern::Guarded(m, _, children) => {
                Pattern::Guarded(m, Guard(guard), children)
            }
            other => other,
        }
    }

    /// Logical operator kinds an expression must have for this pattern to match at the
    /// root. Used to index rules by operator.
    pub fn root_kinds(&self) -> Vec<LogicalOpKind> {
        match self {
            Pattern::Operator(m, _) | Pattern::Guarded(m, _, _) => m.logical_kinds(),
            Pattern::Any | Pattern::Leaf => LogicalOpKind::ALL.to_vec(),
        }
    }

    fn root_accepts(&self, op: &Operator, arity: usize) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Leaf => arity == 0,
            Pattern::Operator(m, _) => m.matches(op),
            Pattern::Guarded(m, guard, _) => m.matches(op) && (guard.0)(op),
        }
    }

    fn child_patterns(&self) -> Option<&[Pattern]> {
        match self {
            Pattern::Operator(_, children) | Pattern::Guarded(_, _, children) => Some(children),
            Pattern::Any | Pattern::Leaf => None,
        }
    }
}

/// A match of a pattern against the memo. Owned, so rules can hold it while the memo
/// is borrowed immutably.
#[derive(Debug, Clone)]
pub struct Binding {
    pub expr_id: ExprId,
    pub group_id: GroupId,
    pub op: Operator,
    pub children: Vec<BoundChild>,
}

#[derive(Debug, Clone)]
pub enum BoundChild {
    /// Matched by `Pattern::Any`: the whole group.
    Group(GroupId),
    /// Matched by a nested pattern: one concrete expression of the group.
    Expr(Box<Binding>),
}

impl BoundChild {
    pub fn group_id(&self) -> GroupId {
        match self {
            BoundChild::Group(g) => *g,
            BoundChild::Expr(b) => b.group_id,
        }
    }
}

impl Binding {
    pub fn child_group(&self, i: usize) -> Option<GroupId> {
        self.children.get(i).map(BoundChild::group_id)
    }

    pub fn child_groups(&self) -> Vec<GroupId> {
        self.children.iter().map(BoundChild::group_id).collect()
    }

    pub fn child_binding(&self, i: usize) -> Option<&Binding> {
        match self.children.get(i)? {
            BoundChild::Expr(b) => Some(b),
            BoundChild::Group(_) => None,
        }
    }
}

/// Check if a memo expression matches a pattern.
pub fn matches(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> bool {
    !bindings(memo, expr_id, pattern, 1).is_empty()
}

/// Every binding of `pattern` rooted at `expr_id`, at most `limit` of them.
pub fn bindings(memo: &Memo, expr_id: ExprId, pattern: &Pattern, limit: usize) -> Vec<Binding> {
    if limit == 0 {
        return vec![];
    }
    let expr = memo.expr(expr_id);
    if !pattern.root_accepts(&expr.op, expr.children.len()) {
        return vec![];
    }
    let group_id = memo.resolve(expr.group_id);
    let children: Vec<GroupId> = expr.children.iter().map(|&c| memo.resolve(c)).collect();

    let Some(child_patterns) = pattern.child_patterns() else {
        return vec![Binding {
            expr_id,
            group_id,
            op: expr.op.clone(),
            children: children.into_iter().map(BoundChild::Group).collect(),
        }];
    };
    if child_patterns.len() != children.len() {
        return vec![];
    }

    let mut partial: Vec<Vec<BoundChild>> = vec![Vec::new()];
    for (&child, child_pattern) in children.iter().zip(child_patterns) {
        let options: Vec<BoundChild> = match child_pattern {
            Pattern::Any => vec![BoundChild::Group(child)],
            _ => {
                let group = memo.group(child);
                group
                    .logical_exprs
                    .iter()
                    .chain(&group.physical_exprs)
                    .flat_map(|&e| bindings(memo, e, child_pattern, limit))
                    .take(limit)
                    .map(|b| BoundChild::Expr(Box::new(b)))
                    .collect()
            }
        };
        if options.is_empty() {
            return vec![];
        }
        let mut next = Vec::with_capacity(partial.len() * options.len());
        'product: for prefix in &partial {
            for option in &options {
                if next.len() >= limit {
                    break 'product;
                }
                let mut row = prefix.clone();
                row.push(option.clone());
                next.push(row);
            }
        }
        partial = next;
    }

    partial
        .into_iter()
        .map(|children| Binding {
            expr_id,
            group_id,
            op: expr.op.clone(),
            children,
        })
        .collect()
}
