//! # Scan Implementation Rule
//!
//! Maps a logical `Scan` to a physical `SeqScan` with the same table, column list and
//! pushed predicate. Table storage has no indexes to choose from, so a sequential scan
//! is the only access path; partition pruning and file-level min/max skipping belong
//! to the storage layer and do not change the operator.

use crate::unexpected;
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleError, RulePhase, RuleResult};

pub struct ImplSeqScanRule;

impl Rule for ImplSeqScanRule {
    fn name(&self) -> &str {
        "ImplSeqScan"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::scan()
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Scan {
            table,
            columns,
            predicate,
        }) = &binding.op
        else {
            return Err(unexpected("a logical scan", &binding.op));
        };

        Ok(vec![RuleResult::Substitution(
            Operator::Physical(PhysicalOp::SeqScan {
                table: table.clone(),
                columns: columns.clone(),
                predicate: predicate.clone(),
            }),
            vec![],
        )])
    }
}
