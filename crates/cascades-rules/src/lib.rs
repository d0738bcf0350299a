//! # Built-in Optimization Rules
//!
//! The default rule set for the Cascades search engine.
//!
//! ## Exploration Rules (Logical -> Logical)
//!
//! - **`JoinCommutativityRule`**: `A ⋈ B -> B ⋈ A` for inner and cross joins.
//! - **`JoinAssociativityRule`**: `(A ⋈ B) ⋈ C -> A ⋈ (B ⋈ C)` for inner joins.
//!   Together with commutativity this reaches every bushy join order without cross
//!   products.
//! - **`PredicatePushdownRule`**: moves a filter above a join into the join condition,
//!   or below the join when a conjunct only touches one side.
//! - **`ProjectionPushdownRule`**: narrows the column list of a scan under a project.
//!
//! ## Implementation Rules (Logical -> Physical)
//!
//! - **`ImplHashJoinRule`**: hash join, build-left and build-right.
//! - **`ImplMergeJoinRule`**: merge join for inner equi-joins.
//! - **`ImplNestedLoopJoinRule`**: nested-loop join, always applicable.
//! - **`ImplSeqScanRule`**: sequential table scan.
//! - **`ImplHashAggregateRule`** / **`ImplStreamAggregateRule`**.
//! - **`ImplSortRule`**: explicit ORDER BY.
//! - **`ImplFilterRule`**, **`ImplProjectRule`**, **`ImplLimitRule`**.
//!
//! Join conditions produced by rules are normalized (see `Expr::normalize`), so the
//! same join reached by different rewrite paths deduplicates in the memo.

pub mod enforcer;
pub mod impl_agg;
pub mod impl_join;
pub mod impl_scan;
pub mod impl_unary;
pub mod join_associativity;
pub mod join_commutativity;
pub mod predicate_pushdown;
pub mod projection_pushdown;

use cascades_core::expr::{Expr, JoinType, LogicalOp, Operator, ScalarValue};
use cascades_core::memo::GroupId;
use cascades_core::pattern::Binding;
use cascades_core::rule::{RuleError, RuleRegistry};
use std::sync::Arc;
use tracing::debug;

/// Create a default rule registry with all built-in rules.
///
/// Connector-specific rules can be added to the returned registry via
/// `add_source_rule_set()`.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    registry.add_rule(Arc::new(join_commutativity::JoinCommutativityRule));
    registry.add_rule(Arc::new(join_associativity::JoinAssociativityRule));
    registry.add_rule(Arc::new(predicate_pushdown::PredicatePushdownRule));
    registry.add_rule(Arc::new(projection_pushdown::ProjectionPushdownRule));

    registry.add_rule(Arc::new(impl_join::ImplHashJoinRule));
    registry.add_rule(Arc::new(impl_join::ImplMergeJoinRule));
    registry.add_rule(Arc::new(impl_join::ImplNestedLoopJoinRule));
    registry.add_rule(Arc::new(impl_scan::ImplSeqScanRule));
    registry.add_rule(Arc::new(impl_agg::ImplHashAggregateRule));
    registry.add_rule(Arc::new(impl_agg::ImplStreamAggregateRule));
    registry.add_rule(Arc::new(enforcer::ImplSortRule));
    registry.add_rule(Arc::new(impl_unary::ImplFilterRule));
    registry.add_rule(Arc::new(impl_unary::ImplProjectRule));
    registry.add_rule(Arc::new(impl_unary::ImplLimitRule));

    debug!(rules = registry.all_rules().len(), "built default rule registry");
    registry
}

pub(crate) fn unexpected(expected: &str, op: &Operator) -> RuleError {
    RuleError::UnexpectedBinding(format!("expected {expected}, found {op}"))
}

pub(crate) fn child(binding: &Binding, i: usize) -> Result<GroupId, RuleError> {
    binding
        .child_group(i)
        .ok_or_else(|| RuleError::UnexpectedBinding(format!("{} has no child {i}", binding.op)))
}

pub(crate) fn join_parts(op: &Operator) -> Result<(JoinType, &Expr), RuleError> {
    match op {
        Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) => Ok((*join_type, condition)),
        other => Err(unexpected("a logical join", other)),
    }
}

/// Conjuncts of `expr` without literal `TRUE`s, cloned.
pub(crate) fn conjuncts_of(expr: &Expr) -> Vec<Expr> {
    expr.conjuncts()
        .into_iter()
        .filter(|c| !matches!(c, Expr::Literal(ScalarValue::Bool(true))))
        .cloned()
        .collect()
}

pub(crate) fn logical_join(join_type: JoinType, condition: Expr) -> Operator {
    Operator::Logical(LogicalOp::Join {
        join_type,
        condition,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use cascades_core::catalog::InMemoryCatalog;
    use cascades_core::expr::*;
    use cascades_core::memo::{GroupId, Memo};
    use cascades_core::pattern::{bindings, Binding};
    use cascades_core::plan::LogicalPlan;
    use cascades_core::rule::{OptContext, Rule, RuleResult};

    pub fn scan(name: &str) -> LogicalPlan {
        LogicalPlan::scan(TableRef::new("s", name))
    }

    pub fn col(table: &str, name: &str) -> Expr {
        Expr::column(table, name)
    }

    /// Insert `plan`, bind `rule` at the root expression and apply it to every binding.
    pub fn fire(rule: &dyn Rule, plan: &LogicalPlan) -> (Memo, GroupId, Vec<RuleResult>) {
        let mut memo = Memo::new();
        let root = memo.insert_plan(plan).expect("valid plan");
        let catalog = InMemoryCatalog::new();
        let expr = memo.group(root).logical_exprs[0];
        let found: Vec<Binding> = bindings(&memo, expr, &rule.pattern(), 64);
        let ctx = OptContext {
            memo: &memo,
            catalog: &catalog,
        };
        let mut results = Vec::new();
        for b in &found {
            results.extend(rule.apply(b, &ctx).expect("rule applies"));
        }
        (memo, root, results)
    }
}
