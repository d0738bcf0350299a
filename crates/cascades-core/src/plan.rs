//! Plan trees at the boundary of the optimizer.
//!
//! [`LogicalPlan`] is what callers hand in; [`PlanNode`] is what comes out. Inside a run
//! the optimizer never works on either: plans are flattened into the memo on the way in
//! and rebuilt from winners on the way out.

use crate::cost::Cost;
use crate::error::{OptimizerError, Result};
use crate::expr::*;
use crate::memo::GroupId;
use crate::properties::PhysicalPropertySet;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Immutable logical operator tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalPlan {
    pub op: LogicalOp,
    #[serde(default)]
    pub children: Vec<LogicalPlan>,
}

impl LogicalPlan {
    pub fn new(op: LogicalOp, children: Vec<LogicalPlan>) -> Self {
        Self { op, children }
    }

    pub fn scan(table: TableRef) -> Self {
        Self::new(
            LogicalOp::Scan {
                table,
                columns: vec![],
                predicate: None,
            },
            vec![],
        )
    }

    pub fn filter(self, predicate: Expr) -> Self {
        Self::new(LogicalOp::Filter { predicate }, vec![self])
    }

    pub fn project(self, exprs: Vec<Expr>, aliases: Vec<String>) -> Self {
        Self::new(LogicalOp::Project { exprs, aliases }, vec![self])
    }

    pub fn join(self, right: LogicalPlan, join_type: JoinType, condition: Expr) -> Self {
        Self::new(
            LogicalOp::Join {
                join_type,
                condition,
            },
            vec![self, right],
        )
    }

    pub fn aggregate(self, group_by: Vec<Expr>, aggregates: Vec<AggExpr>) -> Self {
        Self::new(
            LogicalOp::Aggregate {
                group_by,
                aggregates,
            },
            vec![self],
        )
    }

    pub fn sort(self, order: Vec<SortKey>) -> Self {
        Self::new(LogicalOp::Sort { order }, vec![self])
    }

    pub fn limit(self, offset: u64, count: u64) -> Self {
        Self::new(LogicalOp::Limit { offset, count }, vec![self])
    }

    /// Structural checks run before any optimization: operator arity everywhere in the
    /// tree, and projection alias lists that line up with their expressions.
    pub fn validate(&self) -> Result<()> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            let expected = node.op.arity();
            if node.children.len() != expected {
                return Err(OptimizerError::MalformedPlan(format!(
                    "{} expects {} children, found {}",
                    node.op,
                    expected,
                    node.children.len()
                )));
            }
            if let LogicalOp::Project { exprs, aliases } = &node.op {
                if !aliases.is_empty() && aliases.len() != exprs.len() {
                    return Err(OptimizerError::MalformedPlan(format!(
                        "{} has {} aliases for {} expressions",
                        node.op,
                        aliases.len(),
                        exprs.len()
                    )));
                }
            }
            stack.extend(node.children.iter());
        }
        Ok(())
    }
}

/// One node of the chosen physical plan, annotated with the cost of its subtree and the
/// property set it satisfies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub op: PhysicalOp,
    pub children: Vec<PlanNode>,
    pub cost: Cost,
    pub properties: PhysicalPropertySet,
    pub group_id: GroupId,
    pub row_count: Option<f64>,
}

impl PlanNode {
    /// Indented, one-operator-per-line rendering.
    pub fn display(&self, indent: usize) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, indent);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        let _ = write!(out, "{}{}  cost={}", "  ".repeat(depth), self.op, self.cost);
        if let Some(rows) = self.row_count {
            let _ = write!(out, " rows={rows:.0}");
        }
        if !self.properties.is_any() {
            let _ = write!(out, " props={}", self.properties);
        }
        out.push('\n');
        for child in &self.children {
            child.write_tree(out, depth + 1);
        }
    }

    /// Operators in pre-order.
    pub fn operators(&self) -> Vec<&PhysicalOp> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(&node.op);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str) -> LogicalPlan {
        LogicalPlan::scan(TableRef::new("s", name))
    }

    #[test]
    fn valid_tree_passes() {
        let plan = t("a")
            .join(t("b"), JoinType::Inner, Expr::eq(Expr::column("a", "x"), Expr::column("b", "x")))
            .filter(Expr::eq(Expr::column("a", "y"), Expr::int(1)))
            .limit(0, 10);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn arity_mismatch_is_malformed() {
        let bad = LogicalPlan::new(
            LogicalOp::Join {
                join_type: JoinType::Inner,
                condition: Expr::int(1),
            },
            vec![t("a")],
        );
        let err = bad.validate().unwrap_err();
        assert!(matches!(err, OptimizerError::MalformedPlan(ref msg) if msg.contains("expects 2")));
    }

    #[test]
    fn nested_scan_with_children_is_malformed() {
        let bad = LogicalPlan::new(
            LogicalOp::Filter {
                predicate: Expr::int(1),
            },
            vec![LogicalPlan::new(t("a").op, vec![t("b")])],
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn alias_count_must_match() {
        let bad = t("a").project(vec![Expr::column("a", "x")], vec!["x".into(), "y".into()]);
        assert!(bad.validate().is_err());
    }
}
