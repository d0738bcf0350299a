//! # Optimization Tasks
//!
//! The unit of work of the scheduler. Tasks live on a LIFO stack; a task that needs
//! something done first pushes itself back and then the prerequisite, so the
//! prerequisite runs first and the task resumes afterwards.
//!
//! ```text
//! OptimizeGroup(g, req)
//!   ├─ ExploreGroup(g) ─ ExploreExpr(e) ─┬─ ExploreGroup(child)   (children first)
//!   │                                    └─ ApplyRule(e, r)
//!   ├─ ImplementGroup(g) ─ ImplementExpr(e) ─ ApplyRule(e, r)
//!   ├─ OptimizeInputs(p, g, req)   for every physical expression p of g
//!   │    └─ OptimizeGroup(child, child_req)   one child at a time
//!   └─ EnforceGroup(g, req)        runs last, then marks (g, req) finished
//!        └─ OptimizeGroup(g, relaxed)
//! ```
//!
//! A `(group, required)` pair is "in progress" from the moment its inputs are
//! scheduled until its `EnforceGroup` finishes. An expression that needs a child pair
//! that is still in progress is part of a cycle (possible after group merges) and is
//! not a candidate for that requirement.

use crate::cost::Cost;
use crate::expr::Operator;
use crate::memo::{ExprId, GroupId, Winner};
use crate::pattern;
use crate::properties::{enforcer_for, required_child_props, PhysicalPropertySet};
use crate::rule::{OptContext, RuleChild, RuleId, RulePhase, RuleResult};
use crate::search::CascadesContext;
use crate::stats::{derive_group_stats, Statistics};
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub enum Task {
    OptimizeGroup {
        group_id: GroupId,
        required: PhysicalPropertySet,
    },
    ExploreGroup {
        group_id: GroupId,
    },
    ExploreExpr {
        expr_id: ExprId,
    },
    ImplementGroup {
        group_id: GroupId,
    },
    ImplementExpr {
        expr_id: ExprId,
    },
    ApplyRule {
        expr_id: ExprId,
        rule_id: RuleId,
    },
    OptimizeInputs {
        expr_id: ExprId,
        group_id: GroupId,
        required: PhysicalPropertySet,
        /// Index of the child whose optimization this task last scheduled.
        scheduled: Option<usize>,
    },
    EnforceGroup {
        group_id: GroupId,
        required: PhysicalPropertySet,
        /// The relaxed requirement has already been scheduled.
        waiting: bool,
    },
}

impl CascadesContext {
    pub(crate) fn execute(&mut self, task: Task) {
        trace!(?task, "execute");
        match task {
            Task::OptimizeGroup { group_id, required } => self.optimize_group_task(group_id, required),
            Task::ExploreGroup { group_id } => self.explore_group(group_id),
            Task::ExploreExpr { expr_id } => self.explore_expr(expr_id),
            Task::ImplementGroup { group_id } => self.implement_group(group_id),
            Task::ImplementExpr { expr_id } => self.implement_expr(expr_id),
            Task::ApplyRule { expr_id, rule_id } => self.apply_rule(expr_id, rule_id),
            Task::OptimizeInputs {
                expr_id,
                group_id,
                required,
                scheduled,
            } => self.optimize_inputs(expr_id, group_id, required, scheduled),
            Task::EnforceGroup {
                group_id,
                required,
                waiting,
            } => self.enforce_group(group_id, required, waiting),
        }
    }

    fn is_in_progress(&self, group: GroupId, required: &PhysicalPropertySet) -> bool {
        self.in_progress
            .iter()
            .any(|(g, p)| self.memo.resolve(*g) == group && p == required)
    }

    fn finish(&mut self, group: GroupId, required: PhysicalPropertySet) {
        let memo = &self.memo;
        self.in_progress
            .retain(|(g, p)| !(memo.resolve(*g) == group && *p == required));
        self.memo.group_mut(group).optimized.insert(required);
    }

    fn optimize_group_task(&mut self, group_id: GroupId, required: PhysicalPropertySet) {
        let g = self.memo.resolve(group_id);
        if self.memo.group(g).is_optimized(&required) || self.is_in_progress(g, &required) {
            return;
        }
        if !self.memo.group_explored(g) {
            self.tasks.push(Task::OptimizeGroup { group_id: g, required });
            self.tasks.push(Task::ExploreGroup { group_id: g });
            return;
        }
        if !self.memo.group_implemented(g) {
            self.tasks.push(Task::OptimizeGroup { group_id: g, required });
            self.tasks.push(Task::ImplementGroup { group_id: g });
            return;
        }

        derive_group_stats(&mut self.memo, self.catalog.as_ref(), g);
        self.in_progress.push((g, required.clone()));
        self.tasks.push(Task::EnforceGroup {
            group_id: g,
            required: required.clone(),
            waiting: false,
        });
        let candidates: Vec<ExprId> = self
            .memo
            .group(g)
            .physical_exprs
            .iter()
            .copied()
            .filter(|&e| !self.memo.expr(e).is_enforcer())
            .collect();
        for expr_id in candidates.into_iter().rev() {
            self.tasks.push(Task::OptimizeInputs {
                expr_id,
                group_id: g,
                required: required.clone(),
                scheduled: None,
            });
        }
    }

    fn explore_group(&mut self, group_id: GroupId) {
        let pending: Vec<ExprId> = self
            .memo
            .group(group_id)
            .logical_exprs
            .iter()
            .copied()
            .filter(|&e| !self.memo.expr(e).explored)
            .collect();
        for expr_id in pending.into_iter().rev() {
            self.tasks.push(Task::ExploreExpr { expr_id });
        }
    }

    fn explore_expr(&mut self, expr_id: ExprId) {
        let expr = self.memo.expr(expr_id);
        if expr.explored || !expr.is_live() {
            return;
        }
        let Operator::Logical(op) = &expr.op else {
            return;
        };
        let kind = op.kind();
        let children = expr.children.clone();
        self.memo.expr_mut(expr_id).explored = true;

        self.push_rules(expr_id, kind, RulePhase::Exploration);
        // Children are explored before any rule fires on this expression, so nested
        // patterns see every alternative of the child groups.
        for child in children.into_iter().rev() {
            self.tasks.push(Task::ExploreGroup { group_id: child });
        }
    }

    fn implement_group(&mut self, group_id: GroupId) {
        let pending: Vec<ExprId> = self
            .memo
            .group(group_id)
            .logical_exprs
            .iter()
            .copied()
            .filter(|&e| !self.memo.expr(e).implemented)
            .collect();
        for expr_id in pending.into_iter().rev() {
            self.tasks.push(Task::ImplementExpr { expr_id });
        }
    }

    fn implement_expr(&mut self, expr_id: ExprId) {
        let expr = self.memo.expr(expr_id);
        if expr.implemented || !expr.is_live() {
            return;
        }
        let Operator::Logical(op) = &expr.op else {
            return;
        };
        let kind = op.kind();
        self.memo.expr_mut(expr_id).implemented = true;
        self.push_rules(expr_id, kind, RulePhase::Implementation);
    }

    fn push_rules(&mut self, expr_id: ExprId, kind: crate::expr::LogicalOpKind, phase: RulePhase) {
        let rules = self.rules.rules_for(kind, phase);
        for rule in rules.iter().rev() {
            let rule_id = rule.id();
            if !self.memo.is_rule_applied(expr_id, rule_id) {
                self.tasks.push(Task::ApplyRule { expr_id, rule_id });
            }
        }
    }

    fn apply_rule(&mut self, expr_id: ExprId, rule_id: RuleId) {
        if !self.memo.expr(expr_id).is_live() || self.memo.is_rule_applied(expr_id, rule_id) {
            return;
        }
        let Some(rule) = self.rules.get(rule_id).cloned() else {
            return;
        };
        let bindings = pattern::bindings(&self.memo, expr_id, &rule.pattern(), self.config.max_bindings_per_rule);
        self.memo.mark_applied(expr_id, rule_id);
        if bindings.is_empty() {
            return;
        }

        let group = self.memo.resolve(self.memo.expr(expr_id).group_id);
        let phase = rule.phase();
        let mut results: Vec<RuleResult> = Vec::new();
        {
            let ctx = OptContext {
                memo: &self.memo,
                catalog: self.catalog.as_ref(),
            };
            for binding in &bindings {
                match rule.apply(binding, &ctx) {
                    Ok(produced) => results.extend(produced),
                    Err(err) => {
                        warn!(rule = rule.name(), expr = expr_id, error = %err, "rule failed; skipping");
                        self.rule_faults += 1;
                    }
                }
            }
        }

        for result in results {
            let wants_logical = phase == RulePhase::Exploration;
            if !result.is_well_formed() || result.operator().is_logical() != wants_logical {
                warn!(
                    rule = rule.name(),
                    op = %result.operator(),
                    "rule produced a malformed expression; dropping it"
                );
                self.rule_faults += 1;
                continue;
            }
            let (op, children) = match result {
                RuleResult::Substitution(op, children) => (op, children),
                RuleResult::NewChildren(op, children) => {
                    let ids: Vec<GroupId> = children
                        .iter()
                        .map(|c: &RuleChild| self.memo.add_rule_child(c))
                        .collect();
                    (op, ids)
                }
            };
            let added = self.memo.add_expr_to_group(group, op, children);
            trace!(
                rule = rule.name(),
                expr = added.expr_id,
                group = added.group_id,
                inserted = added.inserted,
                "rule result"
            );
            if added.inserted && wants_logical {
                self.tasks.push(Task::ExploreExpr { expr_id: added.expr_id });
            }
        }
    }

    fn optimize_inputs(
        &mut self,
        expr_id: ExprId,
        group_id: GroupId,
        required: PhysicalPropertySet,
        scheduled: Option<usize>,
    ) {
        let expr = self.memo.expr(expr_id);
        if !expr.is_live() {
            return;
        }
        let Operator::Physical(op) = expr.op.clone() else {
            return;
        };
        let Some(child_props) = required_child_props(&op, &required) else {
            return;
        };
        let children: Vec<GroupId> = expr.children.iter().map(|&c| self.memo.resolve(c)).collect();
        let group = self.memo.resolve(group_id);
        let bound = self.memo.group(group).winner(&required).map(|w| w.cost);

        let mut child_costs = Vec::with_capacity(children.len());
        let mut accumulated = Cost::zero();
        for (i, (&child, props)) in children.iter().zip(&child_props).enumerate() {
            let child_group = self.memo.group(child);
            match child_group.winner(props) {
                Some(w) => {
                    accumulated = accumulated + w.cost;
                    child_costs.push(w.cost);
                    if bound.is_some_and(|b| !accumulated.beats(&b)) {
                        trace!(expr = expr_id, "pruned by current winner");
                        return;
                    }
                }
                None => {
                    let settled = child_group.is_optimized(props) || scheduled == Some(i);
                    if settled || self.is_in_progress(child, props) {
                        return;
                    }
                    self.tasks.push(Task::OptimizeInputs {
                        expr_id,
                        group_id: group,
                        required,
                        scheduled: Some(i),
                    });
                    self.tasks.push(Task::OptimizeGroup {
                        group_id: child,
                        required: props.clone(),
                    });
                    return;
                }
            }
        }

        let catalog = self.catalog.as_ref();
        let inputs: Vec<Statistics> = children
            .iter()
            .map(|&c| derive_group_stats(&mut self.memo, catalog, c))
            .collect();
        let output = derive_group_stats(&mut self.memo, catalog, group);
        let input_refs: Vec<&Statistics> = inputs.iter().collect();
        let cost = self
            .cost_model
            .compute_cost(&op, &input_refs, &output, &child_costs, &required);
        if self.memo.record_winner(
            group,
            &required,
            Winner {
                expr_id,
                cost,
                child_props,
            },
        ) {
            trace!(group, expr = expr_id, %cost, %required, "new winner");
        }
    }

    fn enforce_group(&mut self, group_id: GroupId, required: PhysicalPropertySet, waiting: bool) {
        let g = self.memo.resolve(group_id);
        let Some((enforcer, relaxed)) = enforcer_for(&required) else {
            self.finish(g, required);
            return;
        };

        let relaxed_settled = self.memo.group(g).is_optimized(&relaxed) || self.is_in_progress(g, &relaxed);
        if !waiting && !relaxed_settled {
            self.tasks.push(Task::EnforceGroup {
                group_id: g,
                required,
                waiting: true,
            });
            self.tasks.push(Task::OptimizeGroup {
                group_id: g,
                required: relaxed,
            });
            return;
        }

        let input = self.memo.group(g).winner(&relaxed).map(|w| w.cost);
        let bound = self.memo.group(g).winner(&required).map(|w| w.cost);
        if let Some(input_cost) = input {
            if bound.map_or(true, |b| input_cost.beats(&b)) {
                let stats = derive_group_stats(&mut self.memo, self.catalog.as_ref(), g);
                let cost = self
                    .cost_model
                    .compute_cost(&enforcer, &[&stats], &stats, &[input_cost], &required);
                let added = self.memo.add_enforcer(g, enforcer);
                self.memo.record_winner(
                    added.group_id,
                    &required,
                    Winner {
                        expr_id: added.expr_id,
                        cost,
                        child_props: vec![relaxed],
                    },
                );
            }
        }
        let g = self.memo.resolve(g);
        self.finish(g, required);
    }
}
