//! # Sort Implementation Rule
//!
//! Maps an explicit logical `Sort` (ORDER BY) to a physical `SortOp`.
//!
//! Sorts that only exist to satisfy a parent's requirement, such as the inputs of a
//! merge join or a stream aggregate, are not produced here. The search adds those as
//! enforcers when it optimizes a group for a required ordering (see
//! `cascades_core::properties::enforcer_for`). Both paths yield the same operator and
//! are costed the same way: O(n log n) CPU and O(n) memory.

use crate::{child, unexpected};
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleError, RulePhase, RuleResult};

pub struct ImplSortRule;

impl Rule for ImplSortRule {
    fn name(&self) -> &str {
        "ImplSort"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::sort()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Sort { order }) = &binding.op else {
            return Err(unexpected("a logical sort", &binding.op));
        };
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SortOp { order: order.clone() }),
            vec![child(binding, 0)?],
        )])
    }
}
