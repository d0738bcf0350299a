//! # Join Implementation Rules
//!
//! Three ways to execute a logical join, each with its own cost profile:
//!
//! ## Hash Join (`ImplHashJoinRule`)
//!
//! Builds a hash table on one input and probes it with the other. Both build sides are
//! produced so the cost model can put the smaller input on the build side.
//!
//! **Requires**: at least one column-to-column equality in the condition.
//! **Cost**: O(build_rows) memory, O(build_rows + probe_rows) CPU.
//!
//! ## Merge Join (`ImplMergeJoinRule`)
//!
//! Merges two inputs sorted on the join keys. The keys are split per side when the rule
//! fires, and the search derives a sort requirement for each child from them. Unsorted
//! inputs get sort enforcers, which is why merge join rarely beats hash join unless
//! sortedness comes for free.
//!
//! **Requires**: inner join with equi-join predicates whose sides can be attributed to
//! the two inputs.
//! **Cost**: O(left_rows + right_rows) CPU, minimal memory.
//!
//! ## Nested Loop Join (`ImplNestedLoopJoinRule`)
//!
//! For each left row, scans all right rows. Works for any condition and join type,
//! including cross joins and non-equi predicates, so every join has at least this
//! implementation.
//!
//! **Cost**: O(left_rows * right_rows) CPU.

use crate::{child, join_parts};
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleError, RulePhase, RuleResult};
use std::collections::BTreeSet;

/// Implement a logical join as a hash join, once per build side.
pub struct ImplHashJoinRule;

impl Rule for ImplHashJoinRule {
    fn name(&self) -> &str {
        "ImplHashJoin"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (join_type, condition) = join_parts(&binding.op)?;
        let children = vec![child(binding, 0)?, child(binding, 1)?];
        if !has_equi_predicate(condition) {
            return Ok(vec![]);
        }

        Ok([BuildSide::Right, BuildSide::Left]
            .into_iter()
            .map(|build_side| {
                RuleResult::Substitution(
                    Operator::Physical(PhysicalOp::HashJoin {
                        join_type,
                        build_side,
                        condition: condition.clone(),
                    }),
                    children.clone(),
                )
            })
            .collect())
    }
}

/// Implement an inner equi-join as a merge join over sorted inputs.
pub struct ImplMergeJoinRule;

impl Rule for ImplMergeJoinRule {
    fn name(&self) -> &str {
        "ImplMergeJoin"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, binding: &Binding, ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (join_type, condition) = join_parts(&binding.op)?;
        let (left, right) = (child(binding, 0)?, child(binding, 1)?);
        if join_type != JoinType::Inner {
            return Ok(vec![]);
        }

        let (left_keys, right_keys) = merge_keys(
            condition,
            &ctx.memo.group(left).logical_props.tables,
            &ctx.memo.group(right).logical_props.tables,
        );
        if left_keys.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::MergeJoin {
                join_type,
                condition: condition.clone(),
                left_keys,
                right_keys,
            }),
            vec![left, right],
        )])
    }
}

/// Implement any logical join as a nested loop join.
pub struct ImplNestedLoopJoinRule;

impl Rule for ImplNestedLoopJoinRule {
    fn name(&self) -> &str {
        "ImplNestedLoopJoin"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (join_type, condition) = join_parts(&binding.op)?;
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::NestedLoopJoin {
                join_type,
                condition: condition.clone(),
            }),
            vec![child(binding, 0)?, child(binding, 1)?],
        )])
    }
}

/// True if the condition has at least one `col = col` conjunct.
fn has_equi_predicate(condition: &Expr) -> bool {
    condition.conjuncts().into_iter().any(|c| equi_columns(c).is_some())
}

fn equi_columns(expr: &Expr) -> Option<(&ColumnRef, &ColumnRef)> {
    match expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(l), Expr::Column(r)) => Some((l, r)),
            _ => None,
        },
        _ => None,
    }
}

/// Split the equi-join conjuncts into per-side sort keys. A conjunct is used only if one
/// column belongs to each input.
fn merge_keys(
    condition: &Expr,
    left_tables: &BTreeSet<String>,
    right_tables: &BTreeSet<String>,
) -> (Vec<Expr>, Vec<Expr>) {
    let owned_by = |c: &ColumnRef, tables: &BTreeSet<String>| c.table.as_ref().is_some_and(|t| tables.contains(t));

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    for (a, b) in condition.conjuncts().into_iter().filter_map(equi_columns) {
        let (l, r) = if owned_by(a, left_tables) && owned_by(b, right_tables) {
            (a, b)
        } else if owned_by(b, left_tables) && owned_by(a, right_tables) {
            (b, a)
        } else {
            continue;
        };
        left_keys.push(Expr::Column(l.clone()));
        right_keys.push(Expr::Column(r.clone()));
    }
    (left_keys, right_keys)
}
