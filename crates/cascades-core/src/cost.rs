//! # Cost Model
//!
//! A plan's cost is one comparable number: the weighted sum of CPU, memory and network
//! estimates,
//!
//! ```text
//! total = Σ child totals + cpu_weight * cpu + memory_weight * memory + network_weight * network
//! ```
//!
//! Local costs are never negative, so a parent's total never decreases when a child's
//! total grows. The scheduler relies on this: a partial sum of child costs is a valid
//! lower bound and lets it abandon a candidate as soon as that bound reaches the current
//! winner.
//!
//! Weights come from [`CostWeights`] in the run configuration. Missing statistics fall
//! back to [`stats::DEFAULT_ROW_COUNT`](crate::stats::DEFAULT_ROW_COUNT) rows.

use crate::config::CostWeights;
use crate::expr::*;
use crate::properties::PhysicalPropertySet;
use crate::stats::{Statistics, DEFAULT_ROW_COUNT, DEFAULT_ROW_SIZE};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    /// Lower is better. `f64::MAX` marks an infeasible plan.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }

    pub fn infinite() -> Self {
        Self { total: f64::MAX }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::MAX
    }

    /// Strictly cheaper. Equal costs never displace an earlier winner.
    pub fn beats(&self, other: &Cost) -> bool {
        self.total < other.total
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost::new(self.total + rhs.total)
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        (self.total - other.total).abs() < f64::EPSILON
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.total.partial_cmp(&other.total)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.total)
    }
}

pub trait CostModel: Send + Sync {
    /// Cost of `op` given its inputs' statistics (one per child, in child order), the
    /// statistics of its own output, the settled winner cost of every child, and the
    /// property set it is being costed for.
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        input_stats: &[&Statistics],
        output_stats: &Statistics,
        children_costs: &[Cost],
        required_props: &PhysicalPropertySet,
    ) -> Cost;
}

/// Weighted CPU/memory/network model. Network defaults to ten times CPU.
#[derive(Debug, Clone)]
pub struct DefaultCostModel {
    pub weights: CostWeights,
}

impl DefaultCostModel {
    pub fn new(weights: CostWeights) -> Self {
        Self { weights }
    }

    fn local_cost(&self, op: &PhysicalOp, input: &[&Statistics], output: &Statistics) -> f64 {
        let w = &self.weights;
        let rows = |i: usize| input.get(i).map_or(DEFAULT_ROW_COUNT, |s| s.row_count.max(0.0));
        let bytes = |i: usize| {
            input
                .get(i)
                .map_or(DEFAULT_ROW_COUNT * DEFAULT_ROW_SIZE, |s| s.total_size_bytes.max(0.0))
        };

        match op {
            PhysicalOp::SeqScan { .. } => w.cpu_weight * output.row_count.max(0.0),
            PhysicalOp::Filter { .. } => w.cpu_weight * rows(0),
            // Projection touches every row but does little work per row.
            PhysicalOp::Project { exprs, .. } => {
                w.cpu_weight * rows(0) * 0.1 * exprs.len().max(1) as f64
            }
            PhysicalOp::Limit { offset, count } => {
                w.cpu_weight * rows(0).min(offset.saturating_add(*count) as f64)
            }
            PhysicalOp::HashJoin { build_side, .. } => {
                let (build, probe) = match build_side {
                    BuildSide::Left => (0, 1),
                    BuildSide::Right => (1, 0),
                };
                w.cpu_weight * (rows(build) + rows(probe)) + w.memory_weight * bytes(build)
            }
            PhysicalOp::MergeJoin { .. } => w.cpu_weight * (rows(0) + rows(1)),
            PhysicalOp::NestedLoopJoin { .. } => w.cpu_weight * rows(0) * rows(1),
            PhysicalOp::HashAggregate { .. } => {
                w.cpu_weight * rows(0) + w.memory_weight * output.row_count.max(0.0) * DEFAULT_ROW_SIZE
            }
            PhysicalOp::StreamAggregate { .. } => w.cpu_weight * rows(0),
            PhysicalOp::SortOp { .. } => {
                let n = rows(0);
                let n_log_n = if n > 2.0 { n * n.log2() } else { n };
                w.cpu_weight * n_log_n + w.memory_weight * bytes(0)
            }
            PhysicalOp::Exchange { distribution } => {
                let fan_out = match distribution {
                    Distribution::Broadcast => 4.0,
                    _ => 1.0,
                };
                w.network_weight * bytes(0) * fan_out
            }
        }
    }
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self::new(CostWeights::default())
    }
}

impl CostModel for DefaultCostModel {
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        input_stats: &[&Statistics],
        output_stats: &Statistics,
        children_costs: &[Cost],
        _required_props: &PhysicalPropertySet,
    ) -> Cost {
        let children_total: f64 = children_costs.iter().map(|c| c.total).sum();
        let local = self.local_cost(op, input_stats, output_stats).max(0.0);
        Cost::new(children_total + local)
    }
}
