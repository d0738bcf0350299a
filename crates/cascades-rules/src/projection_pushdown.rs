//! # Projection Pushdown Rule
//!
//! Column pruning for `Project` directly over `Scan`: the scan is replaced by one that
//! reads only the columns the projection (and the scan's own predicate) reference.
//!
//! Narrower scans read less from columnar storage and carry smaller rows through every
//! operator above them. An empty column list means "all columns", so the first
//! application always narrows it; once the list matches what is needed the rule stops
//! producing output.
//!
//! Only the Project-over-Scan case is handled. Pruning through joins, filters and
//! aggregates would need required-column tracking per group.

use crate::unexpected;
use cascades_core::expr::*;
use cascades_core::pattern::{Binding, Pattern};
use cascades_core::rule::{OptContext, Rule, RuleChild, RuleError, RulePhase, RuleResult};

pub struct ProjectionPushdownRule;

impl Rule for ProjectionPushdownRule {
    fn name(&self) -> &str {
        "ProjectionPushdown"
    }

    fn phase(&self) -> RulePhase {
        RulePhase::Exploration
    }

    fn pattern(&self) -> Pattern {
        Pattern::logical(LogicalOpKind::Project, vec![Pattern::scan()])
    }

    fn apply(&self, binding: &Binding, _ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError> {
        let Operator::Logical(LogicalOp::Project { exprs, .. }) = &binding.op else {
            return Err(unexpected("a logical project", &binding.op));
        };
        let scan = binding
            .child_binding(0)
            .ok_or_else(|| unexpected("a scan bound under the project", &binding.op))?;
        let Operator::Logical(LogicalOp::Scan {
            table,
            columns,
            predicate,
        }) = &scan.op
        else {
            return Err(unexpected("a logical scan", &scan.op));
        };

        let needed = needed_columns(table, exprs.iter().chain(predicate.as_ref()));
        if needed.is_empty() {
            return Ok(vec![]);
        }
        if !columns.is_empty() {
            let covered = needed.iter().all(|n| columns.iter().any(|c| same_column(c, n)));
            if !covered || needed.len() >= columns.len() {
                return Ok(vec![]);
            }
        }

        let narrowed = Operator::Logical(LogicalOp::Scan {
            table: table.clone(),
            columns: needed,
            predicate: predicate.clone(),
        });
        Ok(vec![RuleResult::NewChildren(
            binding.op.clone(),
            vec![RuleChild::NewExpr(narrowed, vec![])],
        )])
    }
}

fn same_column(a: &ColumnRef, b: &ColumnRef) -> bool {
    a.table == b.table && a.name == b.name
}

/// Distinct columns of `table` referenced by `exprs`, in first-use order.
fn needed_columns<'a>(table: &TableRef, exprs: impl Iterator<Item = &'a Expr>) -> Vec<ColumnRef> {
    let mut needed: Vec<ColumnRef> = Vec::new();
    for col in exprs.flat_map(Expr::columns) {
        let ours = col.table.as_deref().map_or(true, |t| t == table.name);
        if ours && !needed.iter().any(|n| same_column(n, col)) {
            needed.push(col.clone());
        }
    }
    needed
}
