//! # Join Commutativity Rule
//!
//! `A ⋈ B = B ⋈ A` for inner and cross joins.
//!
//! In a cost-based optimizer the order of join inputs matters: the hash join build
//! side, and, combined with associativity, which join orders can be reached at all.
//! Left, right, semi and anti joins have fixed left/right semantics and are never
//! commuted.
//!
//! The swapped join carries the normalized condition. Normalization makes the
//! condition independent of operand order, so commuting twice lands back on an
//! expression the memo already has instead of growing forever.

use crate::{child, join_parts, logical_join};
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleError, RulePhase, RuleResult};

/// Join commutativity: A JOIN B -> B JOIN A.
pub struct JoinCommutativityRule;

pub(crate) fn is_commutative_join(op: &Operator) -> bool {
    matches!(
        op,
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner | JoinType::Cross,
            ..
        })
    )
}

impl Rule for JoinCommutativityRule {
    fn name(&self) -> &str {
        "JoinCommutativity"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Exploration
    }

    fn pattern(&self) -> Pattern {
        Pattern::join().guarded(is_commutative_join)
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (join_type, condition) = join_parts(&binding.op)?;
        let (left, right) = (child(binding, 0)?, child(binding, 1)?);
        Ok(vec![RuleResult::Substitution(
            logical_join(join_type, condition.normalize()),
            vec![right, left],
        )])
    }
}
