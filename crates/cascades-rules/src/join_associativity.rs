//! # Join Associativity Rule
//!
//! `(A ⋈₁ B) ⋈₂ C = A ⋈ (B ⋈ C)` for inner joins.
//!
//! Associativity changes the shape of the join tree. With commutativity swapping
//! inputs at every level, the two rules reach every bushy ordering of an inner join
//! graph. For a 3-table chain `(A ⋈ B) ⋈ C`, commutativity alone only ever sees
//! `(A⋈B)⋈C` and `C⋈(A⋈B)`; associativity adds `A⋈(B⋈C)`, which wins when B and C
//! are small and A is large.
//!
//! ## Condition Handling
//!
//! Inner join predicates may sit on any join where their columns are available. The
//! outer condition is split into:
//!
//! 1. conjuncts that only reference the moved input and C, which become the condition
//!    of the new inner join `(B ⋈ C)`;
//! 2. everything else, which joins the old inner condition on the new outer join.
//!
//! The rule does not fire when (1) is empty, so it never introduces a cross product.
//! All produced conditions are normalized.
//!
//! ## Both Orientations
//!
//! - `(A ⋈ B) ⋈ C → A ⋈ (B ⋈ C)` when the outer condition connects B and C
//! - `(A ⋈ B) ⋈ C → B ⋈ (A ⋈ C)` when the outer condition connects A and C
//!
//! so the rule does not have to wait for commutativity to flip the inner join first.
//!
//! Outer joins are not reassociated: `(A LEFT JOIN B) LEFT JOIN C` is not in general
//! `A LEFT JOIN (B LEFT JOIN C)`.

use crate::{child, conjuncts_of, join_parts, logical_join, unexpected};
use cascades_core::expr::*;
use cascades_core::memo::GroupId;
use cascades_core::pattern::{Binding, OpMatcher, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleChild, RuleError, RulePhase, RuleResult};
use std::collections::BTreeSet;
use tracing::trace;

/// Join associativity: `(A ⋈₁ B) ⋈₂ C → A ⋈ (B ⋈ C)`.
pub struct JoinAssociativityRule;

fn is_inner_join(op: &Operator) -> bool {
    matches!(
        op,
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            ..
        })
    )
}

impl Rule for JoinAssociativityRule {
    fn name(&self) -> &str {
        "JoinAssociativity"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Exploration
    }

    fn pattern(&self) -> Pattern {
        let inner = Pattern::Operator(OpMatcher::LogicalOp(LogicalOpKind::Join), vec![Pattern::Any, Pattern::Any])
            .guarded(is_inner_join);
        Pattern::Operator(OpMatcher::LogicalOp(LogicalOpKind::Join), vec![inner, Pattern::Any])
            .guarded(is_inner_join)
    }

    fn apply(&self, binding: &Binding, ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (_, outer_cond) = join_parts(&binding.op)?;
        let inner = binding
            .child_binding(0)
            .ok_or_else(|| unexpected("a join bound on the left", &binding.op))?;
        let (_, inner_cond) = join_parts(&inner.op)?;

        let (a, b, c) = (child(inner, 0)?, child(inner, 1)?, child(binding, 1)?);
        let tables = |g: GroupId| &ctx.memo.group(g).logical_props.tables;

        let mut results = Vec::new();
        // A ⋈ (B ⋈ C)
        if let Some(result) = try_reassociate(outer_cond, inner_cond, a, b, c, tables(b), tables(c)) {
            results.push(result);
        }
        // B ⋈ (A ⋈ C)
        if let Some(result) = try_reassociate(outer_cond, inner_cond, b, a, c, tables(a), tables(c)) {
            results.push(result);
        }
        Ok(results)
    }
}

/// `(stay ⋈_inner move) ⋈_outer c  →  stay ⋈ (move ⋈ c)`, or `None` if no conjunct of
/// the outer condition connects `move` with `c`.
fn try_reassociate(
    outer_cond: &Expr,
    inner_cond: &Expr,
    stay: GroupId,
    moved: GroupId,
    c: GroupId,
    move_tables: &BTreeSet<String>,
    c_tables: &BTreeSet<String>,
) -> Option<RuleResult> {
    let (new_inner, remaining): (Vec<Expr>, Vec<Expr>) =
        conjuncts_of(outer_cond).into_iter().partition(|pred| {
            let tables = pred.tables();
            tables.iter().all(|t| move_tables.contains(t) || c_tables.contains(t))
                && tables.iter().any(|t| move_tables.contains(t))
                && tables.iter().any(|t| c_tables.contains(t))
        });

    if new_inner.is_empty() {
        trace!(?move_tables, ?c_tables, "no predicate connects the new inner join, skipping");
        return None;
    }

    let mut outer_parts = conjuncts_of(inner_cond);
    outer_parts.extend(remaining);

    Some(RuleResult::NewChildren(
        logical_join(JoinType::Inner, Expr::conjunction(outer_parts).normalize()),
        vec![
            RuleChild::Group(stay),
            RuleChild::NewExpr(
                logical_join(JoinType::Inner, Expr::conjunction(new_inner).normalize()),
                vec![RuleChild::Group(moved), RuleChild::Group(c)],
            ),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn eq_cond(lt: &str, lc: &str, rt: &str, rc: &str) -> Expr {
        Expr::eq(col(lt, lc), col(rt, rc))
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_try_reassociate_valid() {
        // (A ⋈_{A.x=B.y} B) ⋈_{B.z=C.w} C  ->  A ⋈_{A.x=B.y} (B ⋈_{B.z=C.w} C)
        let inner_cond = eq_cond("A", "x", "B", "y");
        let outer_cond = eq_cond("B", "z", "C", "w");

        let result = try_reassociate(&outer_cond, &inner_cond, 0, 1, 2, &set(&["B"]), &set(&["C"]));

        let Some(RuleResult::NewChildren(op, children)) = result else {
            panic!("expected a reassociation");
        };
        let Operator::Logical(LogicalOp::Join { condition, .. }) = &op else {
            panic!("expected logical join operator");
        };
        assert_eq!(*condition, inner_cond);
        assert!(matches!(&children[0], RuleChild::Group(0)));
        let RuleChild::NewExpr(Operator::Logical(LogicalOp::Join { condition, .. }), grand) = &children[1] else {
            panic!("expected a new inner join");
        };
        assert_eq!(*condition, outer_cond);
        assert!(matches!(grand.as_slice(), [RuleChild::Group(1), RuleChild::Group(2)]));
    }

    #[test]
    fn test_try_reassociate_no_bc_predicate() {
        // The outer condition connects A (stay) with C, so B ⋈ C would be a cross product.
        let inner_cond = eq_cond("A", "x", "B", "y");
        let outer_cond = eq_cond("A", "z", "C", "w");

        let result = try_reassociate(&outer_cond, &inner_cond, 0, 1, 2, &set(&["B"]), &set(&["C"]));
        assert!(result.is_none());
    }

    #[test]
    fn test_try_reassociate_flipped_orientation() {
        let inner_cond = eq_cond("A", "x", "B", "y");
        let outer_cond = eq_cond("A", "z", "C", "w");

        let result = try_reassociate(&outer_cond, &inner_cond, 1, 0, 2, &set(&["A"]), &set(&["C"]));
        assert!(result.is_some());
    }

    #[test]
    fn test_mixed_outer_condition_is_split() {
        // B.z = C.w moves down; A.q = C.r has to stay on the outer join.
        let inner_cond = eq_cond("A", "x", "B", "y");
        let outer_cond = Expr::conjunction(vec![eq_cond("B", "z", "C", "w"), eq_cond("A", "q", "C", "r")]);

        let Some(RuleResult::NewChildren(op, _)) =
            try_reassociate(&outer_cond, &inner_cond, 0, 1, 2, &set(&["B"]), &set(&["C"]))
        else {
            panic!("expected a reassociation");
        };
        let Operator::Logical(LogicalOp::Join { condition, .. }) = op else {
            panic!("expected a join");
        };
        assert_eq!(condition.conjuncts().len(), 2);
        assert!(condition.references_table("A"));
        assert!(condition.references_table("C"));
    }

    #[test]
    fn fires_on_left_deep_chain_through_memo() {
        let plan = scan("A")
            .join(scan("B"), JoinType::Inner, eq_cond("A", "x", "B", "y"))
            .join(scan("C"), JoinType::Inner, eq_cond("B", "z", "C", "w"));
        let (_, _, results) = fire(&JoinAssociativityRule, &plan);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_well_formed());
    }

    #[test]
    fn left_outer_chains_are_not_reassociated() {
        let plan = scan("A")
            .join(scan("B"), JoinType::Left, eq_cond("A", "x", "B", "y"))
            .join(scan("C"), JoinType::Inner, eq_cond("B", "z", "C", "w"));
        let (_, _, results) = fire(&JoinAssociativityRule, &plan);
        assert!(results.is_empty());
    }
}
