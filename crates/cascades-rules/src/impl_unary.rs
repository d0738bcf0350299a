//! Implementation rules for the pass-through operators: filter, project and limit map
//! one-to-one onto their physical counterparts.

use crate::{child, unexpected};
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleError, RulePhase, RuleResult};

pub struct ImplFilterRule;

impl Rule for ImplFilterRule {
    fn name(&self) -> &str {
        "ImplFilter"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &binding.op else {
            return Err(unexpected("a logical filter", &binding.op));
        };
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::Filter {
                predicate: predicate.clone(),
            }),
            vec![child(binding, 0)?],
        )])
    }
}

pub struct ImplProjectRule;

impl Rule for ImplProjectRule {
    fn name(&self) -> &str {
        "ImplProject"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::project()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Project { exprs, aliases }) = &binding.op else {
            return Err(unexpected("a logical project", &binding.op));
        };
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::Project {
                exprs: exprs.clone(),
                aliases: aliases.clone(),
            }),
            vec![child(binding, 0)?],
        )])
    }
}

pub struct ImplLimitRule;

impl Rule for ImplLimitRule {
    fn name(&self) -> &str {
        "ImplLimit"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::limit()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Limit { offset, count }) = &binding.op else {
            return Err(unexpected("a logical limit", &binding.op));
        };
        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::Limit {
                offset: *offset,
                count: *count,
            }),
            vec![child(binding, 0)?],
        )])
    }
}
