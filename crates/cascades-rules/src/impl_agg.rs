//! # Aggregate Implementation Rules
//!
//! ## Hash Aggregate (`ImplHashAggregateRule`)
//!
//! A hash table keyed by the group-by values, one accumulator set per bucket. Any input
//! order works. O(n) CPU and O(groups) memory, which hurts for high-cardinality keys.
//!
//! ## Stream Aggregate (`ImplStreamAggregateRule`)
//!
//! One pass over input sorted on the group-by columns, emitting a group whenever the key
//! changes. O(1) memory. The search derives the sort requirement for the child and adds
//! a sort enforcer when the input is not already ordered, so the total may or may not
//! beat the hash aggregate.

use crate::{child, unexpected};
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleError, RulePhase, RuleResult};

fn aggregate_parts(binding: &Binding) -> Result<(&Vec<Expr>, &Vec<AggExpr>), RuleError> {
    match &binding.op {
        Operator::Logical(LogicalOp::Aggregate {
            group_by,
            aggregates,
        }) => Ok((group_by, aggregates)),
        other => Err(unexpected("a logical aggregate", other)),
    }
}

/// Implement a logical aggregate as a hash aggregate. Always applicable.
pub struct ImplHashAggregateRule;

impl Rule for ImplHashAggregateRule {
    fn name(&self) -> &str {
        "ImplHashAggregate"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (group_by, aggregates) = aggregate_parts(binding)?;
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::HashAggregate {
                group_by: group_by.clone(),
                aggregates: aggregates.clone(),
            }),
            vec![child(binding, 0)?],
        )])
    }
}

/// Implement a grouped aggregate as a stream aggregate over sorted input.
///
/// Global aggregates (no group-by) are left to the hash aggregate: with nothing to sort
/// on, both implementations are the same single pass.
pub struct ImplStreamAggregateRule;

impl Rule for ImplStreamAggregateRule {
    fn name(&self) -> &str {
        "ImplStreamAggregate"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let (group_by, aggregates) = aggregate_parts(binding)?;
        if group_by.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::StreamAggregate {
                group_by: group_by.clone(),
                aggregates: aggregates.clone(),
            }),
            vec![child(binding, 0)?],
        )])
    }
}
