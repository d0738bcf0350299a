//! # Predicate Pushdown Rule
//!
//! `Filter(p) over Join(L, R)` for inner and cross joins. Each conjunct of `p` lands as
//! close to the data as its columns allow:
//!
//! - only references tables of `L`: a new `Filter` directly over `L`
//! - only references tables of `R`: a new `Filter` directly over `R`
//! - anything else: merged into the join condition
//!
//! A cross join that picks up a real condition becomes an inner join. The result goes
//! into the filter's group, so the original filter-over-join stays available and the
//! cost model picks whichever is cheaper.
//!
//! Outer, semi and anti joins are skipped. Moving a predicate below the null-supplying
//! side of an outer join changes which rows survive.

use crate::{conjuncts_of, join_parts, logical_join, unexpected};
use cascades_core::expr::*;
use cascades_core::memo::GroupId;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleChild, RuleError, RulePhase, RuleResult};
use std::collections::BTreeSet;

pub struct PredicatePushdownRule;

impl Rule for PredicatePushdownRule {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Exploration
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter_join()
    }

    fn apply(&self, binding: &Binding, ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &binding.op else {
            return Err(unexpected("a logical filter", &binding.op));
        };
        let join = binding
            .child_binding(0)
            .ok_or_else(|| unexpected("a join bound under the filter", &binding.op))?;
        let (join_type, condition) = join_parts(&join.op)?;
        if !matches!(join_type, JoinType::Inner | JoinType::Cross) {
            return Ok(vec![]);
        }
        let (left, right) = (crate::child(join, 0)?, crate::child(join, 1)?);

        let left_tables = &ctx.memo.group(left).logical_props.tables;
        let right_tables = &ctx.memo.group(right).logical_props.tables;

        let mut left_preds = Vec::new();
        let mut right_preds = Vec::new();
        let mut join_preds = conjuncts_of(condition);
        for pred in conjuncts_of(predicate) {
            match side_of(&pred.tables(), left_tables, right_tables) {
                Some(Side::Left) => left_preds.push(pred),
                Some(Side::Right) => right_preds.push(pred),
                None => join_preds.push(pred),
            }
        }

        let new_type = if join_type == JoinType::Cross && !join_preds.is_empty() {
            JoinType::Inner
        } else {
            join_type
        };
        let new_join = logical_join(new_type, Expr::conjunction(join_preds).normalize());

        Ok(vec![RuleResult::NewChildren(
            new_join,
            vec![filtered(left, left_preds), filtered(right, right_preds)],
        )])
    }
}

enum Side {
    Left,
    Right,
}

/// The single join input that provides every table in `tables`. Predicates without
/// column references stay on the join.
fn side_of(tables: &BTreeSet<String>, left: &BTreeSet<String>, right: &BTreeSet<String>) -> Option<Side> {
    if tables.is_empty() {
        None
    } else if tables.is_subset(left) {
        Some(Side::Left)
    } else if tables.is_subset(right) {
        Some(Side::Right)
    } else {
        None
    }
}

fn filtered(group: GroupId, preds: Vec<Expr>) -> RuleChild {
    if preds.is_empty() {
        return RuleChild::Group(group);
    }
    RuleChild::NewExpr(
        Operator::Logical(LogicalOp::Filter {
            predicate: Expr::conjunction(preds).normalize(),
        }),
        vec![RuleChild::Group(group)],
    )
}
