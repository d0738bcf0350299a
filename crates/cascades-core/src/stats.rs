//! # Statistics for Cost-Based Optimization
//!
//! Table statistics come from the catalog; statistics for every other group are derived
//! bottom-up from the group's first logical expression and cached on the group. All
//! logical expressions of a group describe the same rows, so any one of them will do.
//!
//! ## Derivation Formulas
//!
//! - **Filter**: output_rows = input_rows * selectivity. Column NDVs scale with the row
//!   reduction.
//! - **Join**: output_rows = |left| * |right| / max(NDV_left_key, NDV_right_key), one
//!   factor per equi-join column pair.
//! - **Aggregate**: output_rows = product of group-by NDVs, capped by input rows.
//! - **Limit**: min(count, input_rows).
//! - **Project/Sort**: unchanged.
//!
//! ## Selectivity Estimation
//!
//! - **Equality**: 1 / NDV.
//! - **Range**: fixed 1/3.
//! - **AND / OR**: independence and inclusion-exclusion.
//! - **Default**: 0.1.

use crate::catalog::Catalog;
use crate::expr::*;
use crate::memo::{GroupId, Memo};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Row count assumed when nothing better is known.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;
/// Bytes per row assumed when nothing better is known.
pub const DEFAULT_ROW_SIZE: f64 = 100.0;
/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;
pub const RANGE_SELECTIVITY: f64 = 0.33;

/// Statistics for a relation (or group in the memo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    #[serde(default)]
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(DEFAULT_ROW_COUNT, DEFAULT_ROW_COUNT * DEFAULT_ROW_SIZE)
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    pub fn avg_row_size(&self) -> f64 {
        if self.row_count > 0.0 {
            self.total_size_bytes / self.row_count
        } else {
            DEFAULT_ROW_SIZE
        }
    }
}

/// Per-column statistics, keyed by bare column name in [`Statistics::column_stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV).
    pub distinct_count: f64,
    /// Fraction of rows that are NULL, in [0.0, 1.0].
    pub null_fraction: f64,
    #[serde(default)]
    pub min_value: Option<ScalarValue>,
    #[serde(default)]
    pub max_value: Option<ScalarValue>,
    #[serde(default = "default_value_size")]
    pub avg_row_size: f64,
}

fn default_value_size() -> f64 {
    8.0
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            min_value: None,
            max_value: None,
            avg_row_size: default_value_size(),
        }
    }
}

/// NDV of `col` on whichever input carries it, falling back to that input's row count.
fn ndv_either(left: &Statistics, right: &Statistics, col: &str) -> f64 {
    left.column_stats
        .get(col)
        .or_else(|| right.column_stats.get(col))
        .map(|s| s.distinct_count)
        .unwrap_or_else(|| left.row_count.max(right.row_count))
}

/// Derive statistics for join output.
///
/// ```text
/// |A JOIN B| = |A| * |B| / max(NDV(A.key), NDV(B.key))
/// ```
///
/// Pairs are looked up on both inputs, so the result does not depend on which side of
/// the condition a column was written on.
pub fn derive_join_stats(left: &Statistics, right: &Statistics, join_columns: &[(String, String)]) -> Statistics {
    let mut selectivity = 1.0_f64;
    for (a, b) in join_columns {
        let max_ndv = ndv_either(left, right, a).max(ndv_either(left, right, b)).max(1.0);
        selectivity /= max_ndv;
    }

    let row_count = (left.row_count * right.row_count * selectivity).max(1.0);
    let total_size_bytes = row_count * (left.avg_row_size() + right.avg_row_size());

    let column_stats = left
        .column_stats
        .iter()
        .chain(&right.column_stats)
        .map(|(name, stats)| {
            let mut cs = stats.clone();
            cs.distinct_count = cs.distinct_count.min(row_count);
            (name.clone(), cs)
        })
        .collect();

    Statistics {
        row_count,
        total_size_bytes,
        column_stats,
    }
}

/// Derive statistics for filter output. Column NDVs are clamped to [1, row_count].
pub fn derive_filter_stats(input: &Statistics, selectivity: f64) -> Statistics {
    let row_count = (input.row_count * selectivity.clamp(0.0, 1.0)).max(1.0);
    let ratio = if input.row_count > 0.0 {
        row_count / input.row_count
    } else {
        1.0
    };

    let column_stats = input
        .column_stats
        .iter()
        .map(|(name, stats)| {
            let mut cs = stats.clone();
            cs.distinct_count = (cs.distinct_count * ratio).max(1.0).min(row_count);
            (name.clone(), cs)
        })
        .collect();

    Statistics {
        row_count,
        total_size_bytes: input.total_size_bytes * ratio,
        column_stats,
    }
}

/// Derive statistics for aggregate output. A global aggregate yields one row.
pub fn derive_aggregate_stats(input: &Statistics, group_by_cols: &[String]) -> Statistics {
    let mut row_count = 1.0_f64;
    for col in group_by_cols {
        let ndv = input
            .column_stats
            .get(col)
            .map(|s| s.distinct_count)
            .unwrap_or(input.row_count);
        row_count *= ndv;
    }
    row_count = row_count.min(input.row_count).max(1.0);

    Statistics {
        row_count,
        total_size_bytes: row_count * DEFAULT_ROW_SIZE,
        column_stats: HashMap::new(),
    }
}

pub fn derive_limit_stats(input: &Statistics, count: u64) -> Statistics {
    let row_count = input.row_count.min(count as f64);
    Statistics {
        row_count,
        total_size_bytes: row_count * input.avg_row_size(),
        column_stats: input.column_stats.clone(),
    }
}

/// `1 / NDV`, or the default when the column has no statistics.
pub fn equality_selectivity(stats: &Statistics, col_name: &str) -> f64 {
    stats
        .column_stats
        .get(col_name)
        .map(|cs| 1.0 / cs.distinct_count.max(1.0))
        .unwrap_or(DEFAULT_FILTER_SELECTIVITY)
}

/// Fraction of input rows that pass `expr`, in [0, 1].
pub fn estimate_selectivity(expr: &Expr, stats: &Statistics) -> f64 {
    match expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(c), _) | (_, Expr::Column(c)) => equality_selectivity(stats, &c.name),
            _ => DEFAULT_FILTER_SELECTIVITY,
        },
        Expr::BinaryOp {
            op: BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq,
            ..
        } => RANGE_SELECTIVITY,
        Expr::Literal(ScalarValue::Bool(true)) => 1.0,
        Expr::And(conjuncts) => conjuncts
            .iter()
            .map(|c| estimate_selectivity(c, stats))
            .product(),
        Expr::Or(disjuncts) => {
            let miss: f64 = disjuncts
                .iter()
                .map(|d| 1.0 - estimate_selectivity(d, stats))
                .product();
            1.0 - miss
        }
        _ => DEFAULT_FILTER_SELECTIVITY,
    }
}

/// Column-name pairs of the `col = col` conjuncts of a join condition.
pub fn equi_join_columns(condition: &Expr) -> Vec<(String, String)> {
    condition
        .conjuncts()
        .into_iter()
        .filter_map(|c| match c {
            Expr::BinaryOp {
                op: BinaryOp::Eq,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(l), Expr::Column(r)) => Some((l.name.clone(), r.name.clone())),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Statistics of one operator's output given its inputs' statistics.
pub fn derive_expr_stats(op: &Operator, inputs: &[Statistics], catalog: &dyn Catalog) -> Statistics {
    let input = |i: usize| inputs.get(i).cloned().unwrap_or_else(Statistics::unknown);
    let Operator::Logical(op) = op else {
        return input(0);
    };
    match op {
        LogicalOp::Scan { table, predicate, .. } => {
            let base = catalog.get_table_stats(table).unwrap_or_else(Statistics::unknown);
            match predicate {
                Some(p) => derive_filter_stats(&base, estimate_selectivity(p, &base)),
                None => base,
            }
        }
        LogicalOp::Filter { predicate } => {
            let child = input(0);
            derive_filter_stats(&child, estimate_selectivity(predicate, &child))
        }
        LogicalOp::Join {
            join_type,
            condition,
        } => {
            let (left, right) = (input(0), input(1));
            let joined = match join_type {
                JoinType::Cross => derive_join_stats(&left, &right, &[]),
                _ => derive_join_stats(&left, &right, &equi_join_columns(condition)),
            };
            match join_type {
                JoinType::Semi | JoinType::Anti => derive_filter_stats(&left, 0.5),
                JoinType::Left if joined.row_count < left.row_count => {
                    derive_filter_stats(&left, 1.0)
                }
                JoinType::Right if joined.row_count < right.row_count => {
                    derive_filter_stats(&right, 1.0)
                }
                _ => joined,
            }
        }
        LogicalOp::Aggregate { group_by, .. } => {
            let group_cols: Vec<String> = group_by
                .iter()
                .filter_map(|e| match e {
                    Expr::Column(c) => Some(c.name.clone()),
                    _ => None,
                })
                .collect();
            derive_aggregate_stats(&input(0), &group_cols)
        }
        LogicalOp::Limit { count, .. } => derive_limit_stats(&input(0), *count),
        LogicalOp::Project { .. } | LogicalOp::Sort { .. } => input(0),
    }
}

/// Derive and cache statistics for `group_id` and, as needed, its descendants.
///
/// Groups already on the derivation path (possible after merges create cycles) are
/// treated as unknown rather than recursed into.
pub fn derive_group_stats(memo: &mut Memo, catalog: &dyn Catalog, group_id: GroupId) -> Statistics {
    let mut visiting = HashSet::new();
    derive_cached(memo, catalog, group_id, &mut visiting)
}

fn derive_cached(
    memo: &mut Memo,
    catalog: &dyn Catalog,
    group_id: GroupId,
    visiting: &mut HashSet<GroupId>,
) -> Statistics {
    let gid = memo.resolve(group_id);
    if let Some(stats) = &memo.group(gid).stats {
        return stats.clone();
    }
    let Some(&expr_id) = memo.group(gid).logical_exprs.first() else {
        return Statistics::unknown();
    };
    if !visiting.insert(gid) {
        return Statistics::unknown();
    }

    let expr = memo.expr(expr_id);
    let op = expr.op.clone();
    let children = expr.children.clone();
    let inputs: Vec<Statistics> = children
        .iter()
        .map(|&c| derive_cached(memo, catalog, c, visiting))
        .collect();
    let stats = derive_expr_stats(&op, &inputs, catalog);

    visiting.remove(&gid);
    memo.group_mut(gid).stats = Some(stats.clone());
    stats
}
