//! # Cascades Search Driver
//!
//! [`CascadesContext`] owns everything one optimization needs: the memo, the active
//! rules, the cost model, the catalog and the run configuration. Optimization is driven
//! by an explicit task stack (see [`crate::tasks`]) rather than recursion, so plan depth
//! never turns into call-stack depth and the run can stop between any two tasks.
//!
//! ## Budgets
//!
//! Before each task the scheduler checks three budgets: the number of tasks executed,
//! the wall-clock deadline and the number of live memo groups. Hitting any of them ends
//! the run with [`SearchStatus::Partial`] and whatever plan the winners recorded so far
//! can produce, possibly none.
//!
//! ## Results
//!
//! A run that drains the task stack is complete. If it still has no winner for the
//! root, no physical plan exists under the active rules and
//! [`OptimizerError::NoPhysicalPlan`] names the groups that could not be implemented.

use crate::catalog::Catalog;
use crate::config::OptimizerConfig;
use crate::cost::CostModel;
use crate::error::{OptimizerError, Result};
use crate::memo::{GroupId, Memo};
use crate::plan::{LogicalPlan, PlanNode};
use crate::properties::PhysicalPropertySet;
use crate::rule::{ActiveRules, RuleRegistry};
use crate::tasks::Task;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Which budget stopped a partial run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BudgetKind {
    Tasks,
    Deadline,
    MemoGroups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchStatus {
    Complete,
    Partial(BudgetKind),
}

impl SearchStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, SearchStatus::Complete)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub tasks_run: usize,
    pub groups: usize,
    pub exprs: usize,
    /// Rule applications that failed or produced malformed output.
    pub rule_faults: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutcome {
    pub plan: Option<PlanNode>,
    pub status: SearchStatus,
    pub stats: SearchStats,
}

/// The Cascades search engine for one optimization context.
pub struct CascadesContext {
    pub memo: Memo,
    pub rules: Arc<ActiveRules>,
    pub cost_model: Arc<dyn CostModel>,
    pub catalog: Arc<dyn Catalog>,
    pub config: OptimizerConfig,
    pub(crate) tasks: Vec<Task>,
    /// `(group, required)` pairs whose optimization has started but not finished.
    pub(crate) in_progress: Vec<(GroupId, PhysicalPropertySet)>,
    pub(crate) rule_faults: usize,
    tasks_run: usize,
    deadline: Option<Instant>,
}

impl CascadesContext {
    pub fn new(
        memo: Memo,
        rules: Arc<ActiveRules>,
        cost_model: Arc<dyn CostModel>,
        catalog: Arc<dyn Catalog>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            memo,
            rules,
            cost_model,
            catalog,
            config,
            tasks: Vec::new(),
            in_progress: Vec::new(),
            rule_faults: 0,
            tasks_run: 0,
            deadline: None,
        }
    }

    /// Build a context with a fresh memo, selecting rules from `registry` through
    /// `config.rules`.
    pub fn from_registry(
        registry: &RuleRegistry,
        cost_model: Arc<dyn CostModel>,
        catalog: Arc<dyn Catalog>,
        config: OptimizerConfig,
    ) -> Result<Self> {
        let rules = Arc::new(ActiveRules::new(registry, &config.rules)?);
        Ok(Self::new(Memo::new(), rules, cost_model, catalog, config))
    }

    /// Insert `plan` into the memo and optimize it for `required`.
    pub fn optimize(&mut self, plan: &LogicalPlan, required: &PhysicalPropertySet) -> Result<OptimizeOutcome> {
        let root = self.memo.insert_plan(plan)?;
        self.optimize_group(root, required)
    }

    /// Optimize a group already in the memo for `required`.
    pub fn optimize_group(&mut self, root: GroupId, required: &PhysicalPropertySet) -> Result<OptimizeOutcome> {
        let root = self.memo.resolve(root);
        debug!(
            root,
            %required,
            groups = self.memo.num_groups(),
            exprs = self.memo.num_exprs(),
            rules = self.rules.len(),
            "starting cascades optimization"
        );

        self.tasks_run = 0;
        self.rule_faults = 0;
        self.deadline = self.config.timeout().map(|t| Instant::now() + t);
        self.tasks.clear();
        self.in_progress.clear();
        self.tasks.push(Task::OptimizeGroup {
            group_id: root,
            required: required.clone(),
        });

        let status = self.run();
        let root = self.memo.resolve(root);
        let plan = self.memo.extract_best_plan(root, required);
        let stats = SearchStats {
            tasks_run: self.tasks_run,
            groups: self.memo.num_groups(),
            exprs: self.memo.num_exprs(),
            rule_faults: self.rule_faults,
        };

        match (&plan, status) {
            (Some(p), _) => debug!(cost = %p.cost, tasks = stats.tasks_run, ?status, "optimization finished"),
            (None, SearchStatus::Partial(budget)) => {
                info!(?budget, tasks = stats.tasks_run, "budget exhausted before any plan was found")
            }
            (None, SearchStatus::Complete) => {
                let mut missing = self.memo.groups_without_winner(root);
                if missing.is_empty() {
                    missing.push(root);
                }
                debug!(?missing, "search complete without a physical plan");
                return Err(OptimizerError::NoPhysicalPlan {
                    root,
                    required: required.clone(),
                    missing,
                });
            }
        }

        Ok(OptimizeOutcome { plan, status, stats })
    }

    fn run(&mut self) -> SearchStatus {
        loop {
            if self.tasks.is_empty() {
                return SearchStatus::Complete;
            }
            if let Some(budget) = self.exhausted_budget() {
                self.tasks.clear();
                self.in_progress.clear();
                return SearchStatus::Partial(budget);
            }
            let Some(task) = self.tasks.pop() else {
                return SearchStatus::Complete;
            };
            self.tasks_run += 1;
            self.execute(task);
        }
    }

    fn exhausted_budget(&self) -> Option<BudgetKind> {
        if self.tasks_run >= self.config.max_tasks {
            return Some(BudgetKind::Tasks);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(BudgetKind::Deadline);
        }
        if self.memo.num_groups() > self.config.max_memo_groups {
            return Some(BudgetKind::MemoGroups);
        }
        None
    }
}
