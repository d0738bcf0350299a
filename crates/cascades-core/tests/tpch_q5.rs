//! End-to-end test: TPC-H Q5 optimization.
//!
//! Builds the Q5 join graph with SF=1 statistics, runs the Cascades optimizer and checks
//! that the starting join order does not matter: a naive left-deep plan and a
//! hand-tuned bushy plan optimize to the same cost.

use cascades_core::catalog::InMemoryCatalog;
use cascades_core::config::OptimizerConfig;
use cascades_core::cost::DefaultCostModel;
use cascades_core::expr::*;
use cascades_core::memo::Memo;
use cascades_core::plan::LogicalPlan;
use cascades_core::properties::PhysicalPropertySet;
use cascades_core::rule::ActiveRules;
use cascades_core::search::CascadesContext;
use cascades_core::stats::{ColumnStatistics, Statistics};
use std::sync::Arc;

/// TPC-H SF=1 catalog with statistics.
fn build_tpch_catalog() -> InMemoryCatalog {
    fn table(name: &str, rows: f64, row_size: f64, cols: &[(&str, f64)]) -> (TableRef, Vec<ColumnRef>, Statistics) {
        let columns = cols
            .iter()
            .enumerate()
            .map(|(i, (col, _))| ColumnRef {
                table: Some(name.into()),
                name: (*col).into(),
                index: i as u32,
            })
            .collect();
        let stats = cols.iter().fold(Statistics::new(rows, rows * row_size), |s, (col, ndv)| {
            s.with_column(*col, ColumnStatistics::new(*ndv, 0.0))
        });
        (TableRef::new("tpch", name), columns, stats)
    }

    let tables = [
        table("region", 5.0, 100.0, &[("r_regionkey", 5.0), ("r_name", 5.0)]),
        table("nation", 25.0, 100.0, &[("n_nationkey", 25.0), ("n_regionkey", 5.0), ("n_name", 25.0)]),
        table("supplier", 10000.0, 100.0, &[("s_suppkey", 10000.0), ("s_nationkey", 25.0)]),
        table("customer", 150000.0, 100.0, &[("c_custkey", 150000.0), ("c_nationkey", 25.0)]),
        table("orders", 1500000.0, 100.0, &[
            ("o_orderkey", 1500000.0), ("o_custkey", 150000.0), ("o_orderdate", 2500.0),
        ]),
        table("lineitem", 6001215.0, 100.0, &[
            ("l_orderkey", 1500000.0), ("l_suppkey", 10000.0),
            ("l_extendedprice", 1000000.0), ("l_discount", 11.0),
        ]),
    ];

    let mut catalog = InMemoryCatalog::new();
    for (t, cols, stats) in tables {
        catalog.add_table(&t, cols, stats);
    }
    catalog
}

fn equi(left_table: &str, left_col: &str, right_table: &str, right_col: &str) -> Expr {
    Expr::eq(Expr::column(left_table, left_col), Expr::column(right_table, right_col))
}

fn scan(name: &str) -> LogicalPlan {
    LogicalPlan::scan(TableRef::new("tpch", name))
}

fn inner(left: LogicalPlan, right: LogicalPlan, condition: Expr) -> LogicalPlan {
    left.join(right, JoinType::Inner, condition)
}

/// customer ⋈ orders ⋈ lineitem ⋈ supplier ⋈ nation ⋈ region, left-deep in query order.
fn build_suboptimal_plan() -> LogicalPlan {
    let co = inner(scan("customer"), scan("orders"), equi("customer", "c_custkey", "orders", "o_custkey"));
    let col = inner(co, scan("lineitem"), equi("orders", "o_orderkey", "lineitem", "l_orderkey"));
    let cols = inner(col, scan("supplier"), equi("lineitem", "l_suppkey", "supplier", "s_suppkey"));
    let colsn = inner(cols, scan("nation"), equi("supplier", "s_nationkey", "nation", "n_nationkey"));
    inner(colsn, scan("region"), equi("nation", "n_regionkey", "region", "r_regionkey"))
}

/// Smallest tables first:
///
/// nation ⋈ region → supplier ⋈ (nation ⋈ region) → lineitem ⋈ (...) → orders ⋈ (...)
/// → customer ⋈ (...)
fn build_optimal_plan() -> LogicalPlan {
    let nr = inner(scan("nation"), scan("region"), equi("nation", "n_regionkey", "region", "r_regionkey"));
    let snr = inner(scan("supplier"), nr, equi("supplier", "s_nationkey", "nation", "n_nationkey"));
    let ls = inner(scan("lineitem"), snr, equi("lineitem", "l_suppkey", "supplier", "s_suppkey"));
    let ols = inner(scan("orders"), ls, equi("orders", "o_orderkey", "lineitem", "l_orderkey"));
    inner(scan("customer"), ols, equi("customer", "c_custkey", "orders", "o_custkey"))
}

fn context(catalog: InMemoryCatalog, memo: Memo) -> CascadesContext {
    let config = OptimizerConfig {
        timeout_ms: None,
        ..OptimizerConfig::default()
    };
    let rules = ActiveRules::new(&cascades_rules::default_rule_registry(), &config.rules).expect("valid rules");
    CascadesContext::new(
        memo,
        Arc::new(rules),
        Arc::new(DefaultCostModel::default()),
        Arc::new(catalog),
        config,
    )
}

fn optimize_plan(plan: &LogicalPlan, catalog: InMemoryCatalog) -> (f64, String) {
    let mut ctx = context(catalog, Memo::new());
    let outcome = ctx.optimize(plan, &PhysicalPropertySet::any()).expect("optimization succeeds");
    assert!(outcome.status.is_complete());
    let plan = outcome.plan.expect("a plan");
    (plan.cost.total, plan.display(0))
}

#[test]
fn test_tpch_q5_suboptimal_plan_optimizes() {
    let (cost, plan_display) = optimize_plan(&build_suboptimal_plan(), build_tpch_catalog());

    println!("=== Optimized suboptimal plan ===");
    println!("{plan_display}");
    println!("Total cost: {cost:.1}");

    assert!(cost > 0.0, "Cost should be positive");
    assert!(cost < f64::MAX);
}

#[test]
fn test_tpch_q5_start_order_does_not_matter() {
    let (suboptimal_cost, suboptimal_display) = optimize_plan(&build_suboptimal_plan(), build_tpch_catalog());
    let (optimal_cost, optimal_display) = optimize_plan(&build_optimal_plan(), build_tpch_catalog());

    println!("=== From left-deep query order ===\n{suboptimal_display}\nCost: {suboptimal_cost:.1}\n");
    println!("=== From smallest-tables-first ===\n{optimal_display}\nCost: {optimal_cost:.1}\n");

    let diff = (optimal_cost - suboptimal_cost).abs();
    assert!(
        diff <= optimal_cost * 1e-9,
        "both starting points should reach the same optimum: {optimal_cost:.1} vs {suboptimal_cost:.1}"
    );
}

#[test]
fn test_tpch_q5_memo_exploration() {
    let mut memo = Memo::new();
    let root = memo.insert_plan(&build_suboptimal_plan()).expect("valid plan");
    let initial_groups = memo.num_groups();
    let initial_exprs = memo.num_exprs();

    let mut ctx = context(build_tpch_catalog(), memo);
    let outcome = ctx
        .optimize_group(root, &PhysicalPropertySet::any())
        .expect("optimization succeeds");

    println!("Memo exploration:");
    println!("  Initial: {initial_groups} groups, {initial_exprs} exprs");
    println!("  Final:   {} groups, {} exprs", outcome.stats.groups, outcome.stats.exprs);

    assert_eq!(initial_groups, 11);
    assert!(outcome.stats.groups > initial_groups);
    assert!(outcome.stats.exprs > initial_exprs);
    assert_eq!(outcome.stats.rule_faults, 0);
}

#[test]
fn test_simple_two_way_join() {
    let catalog = InMemoryCatalog::new()
        .with_table(
            &TableRef::new("test", "small"),
            vec![ColumnRef::new("small", "id")],
            Statistics::new(100.0, 10000.0).with_column("id", ColumnStatistics::new(100.0, 0.0)),
        )
        .with_table(
            &TableRef::new("test", "large"),
            vec![ColumnRef::new("large", "id")],
            Statistics::new(1000000.0, 100000000.0).with_column("id", ColumnStatistics::new(1000000.0, 0.0)),
        );

    let plan = LogicalPlan::scan(TableRef::new("test", "small")).join(
        LogicalPlan::scan(TableRef::new("test", "large")),
        JoinType::Inner,
        equi("small", "id", "large", "id"),
    );
    let mut ctx = context(catalog, Memo::new());
    let plan = ctx
        .optimize(&plan, &PhysicalPropertySet::any())
        .expect("optimization succeeds")
        .plan
        .expect("Should find a plan");

    println!("=== Two-way join plan ===\n{}", plan.display(0));

    // The hash table goes on the small side, whichever input order wins.
    let PhysicalOp::HashJoin { build_side, .. } = &plan.op else {
        panic!("expected a hash join, got {}", plan.op);
    };
    let build_child = match build_side {
        BuildSide::Left => &plan.children[0],
        BuildSide::Right => &plan.children[1],
    };
    assert!(matches!(
        &build_child.op,
        PhysicalOp::SeqScan { table, .. } if table.name == "small"
    ));
}
