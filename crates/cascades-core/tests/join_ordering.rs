//! End-to-end join ordering tests using TPC-H and TPC-DS join graphs.
//!
//! Each test builds a left-deep plan in query-text order (the "naive" plan), runs the
//! optimizer with the default rules and checks that it finds a plan, explores beyond the
//! input shape, and ends up no more expensive than what it was given.
//!
//! ## TPC-H (SF=1)
//! - Q2:  5-table chain (part → partsupp → supplier → nation → region)
//! - Q8:  8-table snowflake (lineitem hub, customer/supplier branches)
//! - Q10: 4-table chain (lineitem → orders → customer → nation)
//!
//! ## TPC-DS (SF=1)
//! - Q7:  5-table star (store_sales fact + 4 dimensions)
//! - Q19: 6-table snowflake (store_sales fact + customer→customer_address chain)
//! - Q96: 4-table star (store_sales fact + 3 dimensions)

use cascades_core::catalog::InMemoryCatalog;
use cascades_core::config::{OptimizerConfig, RuleConfig};
use cascades_core::cost::DefaultCostModel;
use cascades_core::expr::*;
use cascades_core::plan::LogicalPlan;
use cascades_core::properties::PhysicalPropertySet;
use cascades_core::search::CascadesContext;
use cascades_core::stats::{ColumnStatistics, Statistics};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn equi(lt: &str, lc: &str, rt: &str, rc: &str) -> Expr {
    Expr::eq(Expr::column(lt, lc), Expr::column(rt, rc))
}

fn scan(schema: &str, name: &str) -> LogicalPlan {
    LogicalPlan::scan(TableRef::new(schema, name))
}

trait JoinExt {
    fn inner(self, right: LogicalPlan, condition: Expr) -> LogicalPlan;
}

impl JoinExt for LogicalPlan {
    fn inner(self, right: LogicalPlan, condition: Expr) -> LogicalPlan {
        self.join(right, JoinType::Inner, condition)
    }
}

/// Add a table to the catalog with the given row count and column NDVs.
fn add_table(catalog: &mut InMemoryCatalog, schema: &str, name: &str, rows: f64, cols: &[(&str, f64)]) {
    let table = TableRef::new(schema, name);
    let col_refs: Vec<ColumnRef> = cols
        .iter()
        .enumerate()
        .map(|(i, (col_name, _))| ColumnRef {
            table: Some(name.into()),
            name: (*col_name).into(),
            index: i as u32,
        })
        .collect();
    let mut stats = Statistics::new(rows, rows * 100.0);
    for (col_name, ndv) in cols {
        stats = stats.with_column(*col_name, ColumnStatistics::new(*ndv, 0.0));
    }
    catalog.add_table(&table, col_refs, stats);
}

struct Optimized {
    cost: f64,
    plan: String,
    groups: usize,
}

fn optimize_with(plan: &LogicalPlan, catalog: &InMemoryCatalog, rules: RuleConfig) -> Optimized {
    let config = OptimizerConfig {
        timeout_ms: None,
        rules,
        ..OptimizerConfig::default()
    };
    let mut ctx = CascadesContext::from_registry(
        &cascades_rules::default_rule_registry(),
        Arc::new(DefaultCostModel::default()),
        Arc::new(catalog.clone()),
        config,
    )
    .expect("default registry is consistent");
    let outcome = ctx.optimize(plan, &PhysicalPropertySet::any()).expect("optimization succeeds");
    assert!(outcome.status.is_complete(), "search ran out of budget: {:?}", outcome.status);
    let best = outcome.plan.expect("complete search yields a plan");
    Optimized {
        cost: best.cost.total,
        plan: best.display(0),
        groups: outcome.stats.groups,
    }
}

fn optimize(plan: &LogicalPlan, catalog: &InMemoryCatalog) -> Optimized {
    optimize_with(plan, catalog, RuleConfig::default())
}

/// The same plan with join reordering switched off: the input order, implemented as-is.
fn optimize_fixed_order(plan: &LogicalPlan, catalog: &InMemoryCatalog) -> Optimized {
    let rules = RuleConfig::default()
        .disable("JoinCommutativity")
        .disable("JoinAssociativity");
    optimize_with(plan, catalog, rules)
}

// ===========================================================================
// TPC-H Q2: 5-table chain  part ← partsupp → supplier → nation → region
// ===========================================================================

fn build_tpch_q2_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "tpch", "part", 200000.0, &[
        ("p_partkey", 200000.0), ("p_mfgr", 5.0), ("p_size", 50.0), ("p_type", 150.0),
    ]);
    add_table(&mut c, "tpch", "partsupp", 800000.0, &[
        ("ps_partkey", 200000.0), ("ps_suppkey", 10000.0), ("ps_supplycost", 100000.0),
    ]);
    add_table(&mut c, "tpch", "supplier", 10000.0, &[
        ("s_suppkey", 10000.0), ("s_nationkey", 25.0),
    ]);
    add_table(&mut c, "tpch", "nation", 25.0, &[
        ("n_nationkey", 25.0), ("n_regionkey", 5.0), ("n_name", 25.0),
    ]);
    add_table(&mut c, "tpch", "region", 5.0, &[
        ("r_regionkey", 5.0), ("r_name", 5.0),
    ]);
    c
}

fn build_tpch_q2_naive() -> LogicalPlan {
    scan("tpch", "part")
        .inner(scan("tpch", "partsupp"), equi("part", "p_partkey", "partsupp", "ps_partkey"))
        .inner(scan("tpch", "supplier"), equi("partsupp", "ps_suppkey", "supplier", "s_suppkey"))
        .inner(scan("tpch", "nation"), equi("supplier", "s_nationkey", "nation", "n_nationkey"))
        .inner(scan("tpch", "region"), equi("nation", "n_regionkey", "region", "r_regionkey"))
}

#[test]
fn test_tpch_q2_chain_join() {
    let catalog = build_tpch_q2_catalog();
    let plan = build_tpch_q2_naive();
    let initial_groups = 9; // 5 scans + 4 joins

    let best = optimize(&plan, &catalog);
    let fixed = optimize_fixed_order(&plan, &catalog);

    println!("=== TPC-H Q2 (5-table chain) ===\n{}", best.plan);
    println!("Cost: {:.1} (fixed order {:.1}), Groups: {}", best.cost, fixed.cost, best.groups);

    assert!(best.cost > 0.0);
    assert!(best.groups > initial_groups, "associativity should create new groups");
    assert!(best.cost <= fixed.cost);
}

// ===========================================================================
// TPC-H Q8: 8-table snowflake. The two nation roles are registered as n1/n2.
// ===========================================================================

fn build_tpch_q8_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "tpch", "part", 200000.0, &[("p_partkey", 200000.0), ("p_type", 150.0)]);
    add_table(&mut c, "tpch", "supplier", 10000.0, &[("s_suppkey", 10000.0), ("s_nationkey", 25.0)]);
    add_table(&mut c, "tpch", "lineitem", 6001215.0, &[
        ("l_orderkey", 1500000.0), ("l_partkey", 200000.0), ("l_suppkey", 10000.0),
    ]);
    add_table(&mut c, "tpch", "orders", 1500000.0, &[("o_orderkey", 1500000.0), ("o_custkey", 100000.0)]);
    add_table(&mut c, "tpch", "customer", 150000.0, &[("c_custkey", 150000.0), ("c_nationkey", 25.0)]);
    add_table(&mut c, "tpch", "n1", 25.0, &[("n1_nationkey", 25.0), ("n1_regionkey", 5.0)]);
    add_table(&mut c, "tpch", "n2", 25.0, &[("n2_nationkey", 25.0)]);
    add_table(&mut c, "tpch", "region", 5.0, &[("r_regionkey", 5.0)]);
    c
}

fn build_tpch_q8_naive() -> LogicalPlan {
    scan("tpch", "part")
        .inner(scan("tpch", "lineitem"), equi("part", "p_partkey", "lineitem", "l_partkey"))
        .inner(scan("tpch", "supplier"), equi("lineitem", "l_suppkey", "supplier", "s_suppkey"))
        .inner(scan("tpch", "orders"), equi("lineitem", "l_orderkey", "orders", "o_orderkey"))
        .inner(scan("tpch", "customer"), equi("orders", "o_custkey", "customer", "c_custkey"))
        .inner(scan("tpch", "n1"), equi("customer", "c_nationkey", "n1", "n1_nationkey"))
        .inner(scan("tpch", "region"), equi("n1", "n1_regionkey", "region", "r_regionkey"))
        .inner(scan("tpch", "n2"), equi("supplier", "s_nationkey", "n2", "n2_nationkey"))
}

#[test]
fn test_tpch_q8_snowflake_8_tables() {
    let catalog = build_tpch_q8_catalog();
    let plan = build_tpch_q8_naive();

    let best = optimize(&plan, &catalog);
    let fixed = optimize_fixed_order(&plan, &catalog);

    println!("=== TPC-H Q8 (8-table snowflake) ===\n{}", best.plan);
    println!("Cost: {:.1}, Groups: {}", best.cost, best.groups);

    assert!(best.cost > 0.0);
    assert!(best.groups > 15, "8-table graph should explore well past the input shape");
    assert!(best.cost <= fixed.cost);
}

// ===========================================================================
// TPC-H Q10: 4-table chain  lineitem → orders → customer → nation
// ===========================================================================

fn build_tpch_q10_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "tpch", "lineitem", 6001215.0, &[("l_orderkey", 1500000.0)]);
    add_table(&mut c, "tpch", "orders", 1500000.0, &[("o_orderkey", 1500000.0), ("o_custkey", 100000.0)]);
    add_table(&mut c, "tpch", "customer", 150000.0, &[("c_custkey", 150000.0), ("c_nationkey", 25.0)]);
    add_table(&mut c, "tpch", "nation", 25.0, &[("n_nationkey", 25.0)]);
    c
}

fn build_tpch_q10_naive() -> LogicalPlan {
    scan("tpch", "lineitem")
        .inner(scan("tpch", "orders"), equi("lineitem", "l_orderkey", "orders", "o_orderkey"))
        .inner(scan("tpch", "customer"), equi("orders", "o_custkey", "customer", "c_custkey"))
        .inner(scan("tpch", "nation"), equi("customer", "c_nationkey", "nation", "n_nationkey"))
}

/// Small tables first: nation ⋈ customer ⋈ orders ⋈ lineitem.
fn build_tpch_q10_better() -> LogicalPlan {
    scan("tpch", "nation")
        .inner(scan("tpch", "customer"), equi("customer", "c_nationkey", "nation", "n_nationkey"))
        .inner(scan("tpch", "orders"), equi("orders", "o_custkey", "customer", "c_custkey"))
        .inner(scan("tpch", "lineitem"), equi("lineitem", "l_orderkey", "orders", "o_orderkey"))
}

#[test]
fn test_tpch_q10_chain_join() {
    let catalog = build_tpch_q10_catalog();
    let naive = optimize(&build_tpch_q10_naive(), &catalog);
    let better = optimize(&build_tpch_q10_better(), &catalog);

    println!("=== TPC-H Q10 naive ===\n{}\nCost: {:.1}", naive.plan, naive.cost);
    println!("=== TPC-H Q10 better ===\n{}\nCost: {:.1}", better.plan, better.cost);

    // Both inputs describe the same join graph, so exhaustive search lands on the same
    // optimum regardless of the starting order.
    let diff = (naive.cost - better.cost).abs();
    assert!(diff <= naive.cost * 1e-9, "naive {} vs better {}", naive.cost, better.cost);
}

// ===========================================================================
// TPC-DS Q7: 5-table star  store_sales + date_dim, item, customer_demographics, promotion
// ===========================================================================

fn build_tpcds_q7_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "tpcds", "store_sales", 2880404.0, &[
        ("ss_sold_date_sk", 1823.0), ("ss_item_sk", 18000.0),
        ("ss_cdemo_sk", 1920800.0), ("ss_promo_sk", 300.0),
    ]);
    add_table(&mut c, "tpcds", "date_dim", 73049.0, &[("d_date_sk", 73049.0)]);
    add_table(&mut c, "tpcds", "item", 18000.0, &[("i_item_sk", 18000.0)]);
    add_table(&mut c, "tpcds", "customer_demographics", 1920800.0, &[("cd_demo_sk", 1920800.0)]);
    add_table(&mut c, "tpcds", "promotion", 300.0, &[("p_promo_sk", 300.0)]);
    c
}

fn build_tpcds_q7_naive() -> LogicalPlan {
    scan("tpcds", "store_sales")
        .inner(scan("tpcds", "customer_demographics"), equi("store_sales", "ss_cdemo_sk", "customer_demographics", "cd_demo_sk"))
        .inner(scan("tpcds", "date_dim"), equi("store_sales", "ss_sold_date_sk", "date_dim", "d_date_sk"))
        .inner(scan("tpcds", "item"), equi("store_sales", "ss_item_sk", "item", "i_item_sk"))
        .inner(scan("tpcds", "promotion"), equi("store_sales", "ss_promo_sk", "promotion", "p_promo_sk"))
}

fn build_tpcds_q7_better() -> LogicalPlan {
    scan("tpcds", "store_sales")
        .inner(scan("tpcds", "promotion"), equi("store_sales", "ss_promo_sk", "promotion", "p_promo_sk"))
        .inner(scan("tpcds", "item"), equi("store_sales", "ss_item_sk", "item", "i_item_sk"))
        .inner(scan("tpcds", "date_dim"), equi("store_sales", "ss_sold_date_sk", "date_dim", "d_date_sk"))
        .inner(scan("tpcds", "customer_demographics"), equi("store_sales", "ss_cdemo_sk", "customer_demographics", "cd_demo_sk"))
}

#[test]
fn test_tpcds_q7_star_join() {
    let catalog = build_tpcds_q7_catalog();
    let naive = optimize(&build_tpcds_q7_naive(), &catalog);
    let better = optimize(&build_tpcds_q7_better(), &catalog);
    let naive_fixed = optimize_fixed_order(&build_tpcds_q7_naive(), &catalog);

    println!("=== TPC-DS Q7 (5-table star) ===\n{}", naive.plan);
    println!("Cost naive: {:.1}, better: {:.1}, fixed: {:.1}", naive.cost, better.cost, naive_fixed.cost);

    assert!(naive.cost <= naive_fixed.cost);
    let diff = (naive.cost - better.cost).abs();
    assert!(diff <= naive.cost * 1e-9, "naive {} vs better {}", naive.cost, better.cost);
}

// ===========================================================================
// TPC-DS Q96: 4-table star  store_sales + household_demographics, time_dim, store
// ===========================================================================

fn build_tpcds_q96_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "tpcds", "store_sales", 2880404.0, &[
        ("ss_sold_time_sk", 86400.0), ("ss_hdemo_sk", 7200.0), ("ss_store_sk", 12.0),
    ]);
    add_table(&mut c, "tpcds", "household_demographics", 7200.0, &[("hd_demo_sk", 7200.0)]);
    add_table(&mut c, "tpcds", "time_dim", 86400.0, &[("t_time_sk", 86400.0)]);
    add_table(&mut c, "tpcds", "store", 12.0, &[("s_store_sk", 12.0)]);
    c
}

fn build_tpcds_q96_naive() -> LogicalPlan {
    scan("tpcds", "store_sales")
        .inner(scan("tpcds", "household_demographics"), equi("store_sales", "ss_hdemo_sk", "household_demographics", "hd_demo_sk"))
        .inner(scan("tpcds", "time_dim"), equi("store_sales", "ss_sold_time_sk", "time_dim", "t_time_sk"))
        .inner(scan("tpcds", "store"), equi("store_sales", "ss_store_sk", "store", "s_store_sk"))
}

#[test]
fn test_tpcds_q96_star_join() {
    let catalog = build_tpcds_q96_catalog();
    let plan = build_tpcds_q96_naive();
    let best = optimize(&plan, &catalog);
    let fixed = optimize_fixed_order(&plan, &catalog);

    println!("=== TPC-DS Q96 (4-table star) ===\n{}", best.plan);
    assert!(best.cost > 0.0);
    assert!(best.groups > 7, "star joins should grow the memo beyond 4 scans + 3 joins");
    assert!(best.cost <= fixed.cost);
}

// ===========================================================================
// TPC-DS Q19: 6-table snowflake
// ===========================================================================

fn build_tpcds_q19_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "tpcds", "store_sales", 2880404.0, &[
        ("ss_sold_date_sk", 1823.0), ("ss_item_sk", 18000.0),
        ("ss_customer_sk", 100000.0), ("ss_store_sk", 12.0),
    ]);
    add_table(&mut c, "tpcds", "date_dim", 73049.0, &[("d_date_sk", 73049.0)]);
    add_table(&mut c, "tpcds", "item", 18000.0, &[("i_item_sk", 18000.0), ("i_manager_id", 100.0)]);
    add_table(&mut c, "tpcds", "customer", 100000.0, &[("c_customer_sk", 100000.0), ("c_current_addr_sk", 50000.0)]);
    add_table(&mut c, "tpcds", "customer_address", 50000.0, &[("ca_address_sk", 50000.0)]);
    add_table(&mut c, "tpcds", "store", 12.0, &[("s_store_sk", 12.0)]);
    c
}

fn build_tpcds_q19_naive() -> LogicalPlan {
    scan("tpcds", "date_dim")
        .inner(scan("tpcds", "store_sales"), equi("date_dim", "d_date_sk", "store_sales", "ss_sold_date_sk"))
        .inner(scan("tpcds", "item"), equi("store_sales", "ss_item_sk", "item", "i_item_sk"))
        .inner(scan("tpcds", "customer"), equi("store_sales", "ss_customer_sk", "customer", "c_customer_sk"))
        .inner(scan("tpcds", "customer_address"), equi("customer", "c_current_addr_sk", "customer_address", "ca_address_sk"))
        .inner(scan("tpcds", "store"), equi("store_sales", "ss_store_sk", "store", "s_store_sk"))
}

#[test]
fn test_tpcds_q19_snowflake() {
    let catalog = build_tpcds_q19_catalog();
    let plan = build_tpcds_q19_naive();
    let best = optimize(&plan, &catalog);
    let fixed = optimize_fixed_order(&plan, &catalog);

    println!("=== TPC-DS Q19 (6-table snowflake) ===\n{}", best.plan);
    assert!(best.cost > 0.0);
    assert!(best.groups > 11);
    assert!(best.cost <= fixed.cost);
}

// ===========================================================================
// Convergence and quality
// ===========================================================================

#[test]
fn test_associativity_convergence_3_tables() {
    let mut catalog = InMemoryCatalog::new();
    add_table(&mut catalog, "t", "small", 100.0, &[("s_mid", 100.0)]);
    add_table(&mut catalog, "t", "medium", 10000.0, &[("m_sid", 100.0), ("m_lid", 10000.0)]);
    add_table(&mut catalog, "t", "large", 1000000.0, &[("l_mid", 10000.0)]);

    // (small ⋈ medium) ⋈ large
    let left_deep = scan("t", "small")
        .inner(scan("t", "medium"), equi("small", "s_mid", "medium", "m_sid"))
        .inner(scan("t", "large"), equi("medium", "m_lid", "large", "l_mid"));
    // small ⋈ (medium ⋈ large)
    let right_deep = scan("t", "small").inner(
        scan("t", "medium").inner(scan("t", "large"), equi("medium", "m_lid", "large", "l_mid")),
        equi("small", "s_mid", "medium", "m_sid"),
    );

    let ld = optimize(&left_deep, &catalog);
    let rd = optimize(&right_deep, &catalog);
    println!("left-deep: {:.1}, right-deep: {:.1}", ld.cost, rd.cost);
    let diff = (ld.cost - rd.cost).abs();
    assert!(diff <= ld.cost * 1e-9, "both shapes should converge: {} vs {}", ld.cost, rd.cost);
}

#[test]
fn test_optimizer_beats_worst_case_ordering() {
    let mut catalog = InMemoryCatalog::new();
    add_table(&mut catalog, "t", "tiny", 10.0, &[("t_id", 10.0)]);
    add_table(&mut catalog, "t", "small", 1000.0, &[("s_id", 1000.0), ("s_tid", 10.0)]);
    add_table(&mut catalog, "t", "medium", 100000.0, &[("m_id", 100000.0), ("m_sid", 1000.0)]);
    add_table(&mut catalog, "t", "large", 10000000.0, &[("l_mid", 100000.0)]);

    // Worst order: start from the largest table.
    let worst = scan("t", "large")
        .inner(scan("t", "medium"), equi("large", "l_mid", "medium", "m_id"))
        .inner(scan("t", "small"), equi("medium", "m_sid", "small", "s_id"))
        .inner(scan("t", "tiny"), equi("small", "s_tid", "tiny", "t_id"));

    let best = optimize(&worst, &catalog);
    let fixed = optimize_fixed_order(&worst, &catalog);
    println!("=== worst-case input ===\n{}\nCost: {:.1} vs fixed {:.1}", best.plan, best.cost, fixed.cost);
    assert!(best.cost <= fixed.cost);
}
