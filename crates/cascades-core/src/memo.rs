//! # Memo
//!
//! The memo stores the search space compactly: a **group** is a set of logically
//! equivalent expressions, and an **expression** is an operator whose children are
//! group ids rather than subtrees. A handful of groups can therefore encode an
//! exponential number of complete plans.
//!
//! ## Deduplication
//!
//! Every live expression is indexed by `(operator, child group ids)`. Inserting a key
//! that already exists returns the existing expression. If a rule proves that an
//! expression belongs to a group other than the one holding it, the two groups are
//! equivalent and get merged.
//!
//! ## Merging
//!
//! The lower group id survives. The absorbed group keeps a forwarding pointer, so stale
//! ids held by tasks or callers still resolve through [`Memo::resolve`]. Every
//! expression referencing the absorbed group is re-keyed; a re-keyed expression that
//! collides with an existing one is superseded by it, and if the two live in different
//! groups those groups are merged too. Merges run off a worklist until none are left.
//!
//! ## Winners
//!
//! Each group keeps, per required property set, the cheapest physical expression found
//! so far together with the property sets its children were optimized for. Replacing a
//! winner requires a strictly lower cost.

use crate::cost::Cost;
use crate::error::Result;
use crate::expr::{LogicalOp, Operator, PhysicalOp};
use crate::plan::{LogicalPlan, PlanNode};
use crate::properties::{LogicalProperties, PhysicalPropertySet};
use crate::rule::{RuleChild, RuleId};
use crate::stats::Statistics;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::mem;
use tracing::trace;

pub type GroupId = u32;
pub type ExprId = u32;

/// Best plan of a group for one property set.
#[derive(Debug, Clone)]
pub struct Winner {
    pub expr_id: ExprId,
    pub cost: Cost,
    /// Property set each child was optimized for, in child order.
    pub child_props: Vec<PhysicalPropertySet>,
}

/// An expression in the memo.
#[derive(Debug, Clone)]
pub struct MemoExpr {
    pub id: ExprId,
    pub op: Operator,
    pub children: Vec<GroupId>,
    pub group_id: GroupId,
    /// Exploration rules have been scheduled for this expression.
    pub explored: bool,
    /// Implementation rules have been scheduled for this expression.
    pub implemented: bool,
    /// Cheapest cost seen for this expression under any property set.
    pub cost: Option<Cost>,
    /// Set when a merge revealed this expression as a duplicate of another.
    pub superseded_by: Option<ExprId>,
    enforcer: bool,
    applied_rules: HashSet<RuleId>,
}

impl MemoExpr {
    /// Inserted through [`Memo::add_enforcer`]. A physical expression whose child group
    /// was merged into its own group is not an enforcer.
    pub fn is_enforcer(&self) -> bool {
        self.enforcer
    }

    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none()
    }
}

/// A group of logically equivalent expressions.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub logical_exprs: Vec<ExprId>,
    pub physical_exprs: Vec<ExprId>,
    pub best_plan: HashMap<PhysicalPropertySet, Winner>,
    /// Property sets for which optimization of this group has finished.
    pub optimized: HashSet<PhysicalPropertySet>,
    pub stats: Option<Statistics>,
    pub logical_props: LogicalProperties,
    merged_into: Option<GroupId>,
}

impl Group {
    fn new(id: GroupId, logical_props: LogicalProperties) -> Self {
        Self {
            id,
            logical_exprs: Vec::new(),
            physical_exprs: Vec::new(),
            best_plan: HashMap::new(),
            optimized: HashSet::new(),
            stats: None,
            logical_props,
            merged_into: None,
        }
    }

    pub fn winner(&self, props: &PhysicalPropertySet) -> Option<&Winner> {
        self.best_plan.get(props)
    }

    pub fn is_optimized(&self, props: &PhysicalPropertySet) -> bool {
        self.optimized.contains(props)
    }

    pub fn exprs(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.logical_exprs.iter().chain(&self.physical_exprs).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExprKey {
    op: Operator,
    children: Vec<GroupId>,
}

/// Outcome of [`Memo::add_expr_to_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddExprResult {
    pub expr_id: ExprId,
    /// Group the expression ended up in, after any merge it caused.
    pub group_id: GroupId,
    /// False when an equal expression already existed.
    pub inserted: bool,
}

#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
    exprs: Vec<MemoExpr>,
    index: HashMap<ExprKey, ExprId>,
    live_groups: usize,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow merge forwarding to the surviving group.
    ///
    /// # Panics
    ///
    /// If `id` was never allocated by this memo.
    pub fn resolve(&self, id: GroupId) -> GroupId {
        let mut current = id;
        loop {
            let group = self
                .groups
                .get(current as usize)
                .unwrap_or_else(|| panic!("group {id} does not exist"));
            match group.merged_into {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// The live group `id` resolves to. Panics on an id this memo never allocated.
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[self.resolve(id) as usize]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        let id = self.resolve(id);
        &mut self.groups[id as usize]
    }

    pub fn expr(&self, id: ExprId) -> &MemoExpr {
        &self.exprs[id as usize]
    }

    pub(crate) fn expr_mut(&mut self, id: ExprId) -> &mut MemoExpr {
        &mut self.exprs[id as usize]
    }

    /// Live groups.
    pub fn num_groups(&self) -> usize {
        self.live_groups
    }

    /// Live expressions.
    pub fn num_exprs(&self) -> usize {
        self.exprs.iter().filter(|e| e.is_live()).count()
    }

    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups
            .iter()
            .filter(|g| g.merged_into.is_none())
            .map(|g| g.id)
    }

    /// Insert a logical plan bottom-up, one expression per node, and return the root
    /// group. The plan is validated first; nothing is inserted if it is malformed.
    pub fn insert_plan(&mut self, plan: &LogicalPlan) -> Result<GroupId> {
        plan.validate()?;
        Ok(self.insert_subtree(plan))
    }

    fn insert_subtree(&mut self, plan: &LogicalPlan) -> GroupId {
        let children: Vec<GroupId> = plan.children.iter().map(|c| self.insert_subtree(c)).collect();
        self.add_expr(Operator::Logical(plan.op.clone()), children).0
    }

    /// Find or create the expression `op(children)`. A new expression gets a new group.
    pub fn add_expr(&mut self, op: Operator, children: Vec<GroupId>) -> (GroupId, ExprId) {
        let key = self.make_key(op, children);
        if let Some(&existing) = self.index.get(&key) {
            return (self.resolve(self.exprs[existing as usize].group_id), existing);
        }
        let group = self.new_group(&key.op, &key.children);
        let id = self.push_expr(key, group);
        (group, id)
    }

    /// Add `op(children)` to `group`. If the expression already exists elsewhere, that
    /// group and `group` are merged.
    pub fn add_expr_to_group(&mut self, group: GroupId, op: Operator, children: Vec<GroupId>) -> AddExprResult {
        let group = self.resolve(group);
        let key = self.make_key(op, children);
        if let Some(&existing) = self.index.get(&key) {
            let other = self.resolve(self.exprs[existing as usize].group_id);
            let group_id = if other == group {
                group
            } else {
                self.merge_groups(group, other)
            };
            return AddExprResult {
                expr_id: existing,
                group_id,
                inserted: false,
            };
        }
        let expr_id = self.push_expr(key, group);
        AddExprResult {
            expr_id,
            group_id: group,
            inserted: true,
        }
    }

    /// Add an enforcer over `group` to `group` itself.
    pub fn add_enforcer(&mut self, group: GroupId, op: PhysicalOp) -> AddExprResult {
        let group = self.resolve(group);
        let added = self.add_expr_to_group(group, Operator::Physical(op), vec![group]);
        if added.inserted {
            self.exprs[added.expr_id as usize].enforcer = true;
        }
        added
    }

    /// Materialize a rule child: existing groups pass through, new sub-expressions are
    /// found or created bottom-up.
    pub fn add_rule_child(&mut self, child: &RuleChild) -> GroupId {
        match child {
            RuleChild::Group(g) => self.resolve(*g),
            RuleChild::NewExpr(op, children) => {
                let ids: Vec<GroupId> = children.iter().map(|c| self.add_rule_child(c)).collect();
                self.add_expr(op.clone(), ids).0
            }
        }
    }

    fn make_key(&self, op: Operator, children: Vec<GroupId>) -> ExprKey {
        let children = children.into_iter().map(|c| self.resolve(c)).collect();
        ExprKey { op, children }
    }

    fn new_group(&mut self, op: &Operator, children: &[GroupId]) -> GroupId {
        let tables: BTreeSet<String> = match op {
            Operator::Logical(LogicalOp::Scan { table, .. })
            | Operator::Physical(PhysicalOp::SeqScan { table, .. }) => BTreeSet::from([table.name.clone()]),
            _ => children
                .iter()
                .flat_map(|&c| self.group(c).logical_props.tables.iter().cloned())
                .collect(),
        };
        let id = self.groups.len() as GroupId;
        self.groups.push(Group::new(id, LogicalProperties { tables }));
        self.live_groups += 1;
        id
    }

    fn push_expr(&mut self, key: ExprKey, group: GroupId) -> ExprId {
        let id = self.exprs.len() as ExprId;
        self.index.insert(key.clone(), id);
        let logical = key.op.is_logical();
        self.exprs.push(MemoExpr {
            id,
            op: key.op,
            children: key.children,
            group_id: group,
            explored: false,
            implemented: false,
            cost: None,
            superseded_by: None,
            enforcer: false,
            applied_rules: HashSet::new(),
        });
        let g = &mut self.groups[group as usize];
        if logical {
            g.logical_exprs.push(id);
        } else {
            g.physical_exprs.push(id);
        }
        trace!(expr = id, group, "memo insert");
        id
    }

    pub fn is_rule_applied(&self, expr: ExprId, rule: RuleId) -> bool {
        self.exprs[expr as usize].applied_rules.contains(&rule)
    }

    pub fn mark_applied(&mut self, expr: ExprId, rule: RuleId) {
        self.exprs[expr as usize].applied_rules.insert(rule);
    }

    /// Every logical expression of the group has been explored.
    pub fn group_explored(&self, group: GroupId) -> bool {
        self.group(group)
            .logical_exprs
            .iter()
            .all(|&e| self.exprs[e as usize].explored)
    }

    /// Every logical expression of the group has been implemented.
    pub fn group_implemented(&self, group: GroupId) -> bool {
        self.group(group)
            .logical_exprs
            .iter()
            .all(|&e| self.exprs[e as usize].implemented)
    }

    /// Forget which expressions were explored or implemented and which property sets
    /// were finished. Expressions, applied-rule marks and winners stay, so a later search
    /// revisits every group without firing any rule a second time.
    pub fn reset_progress(&mut self) {
        for e in &mut self.exprs {
            e.explored = false;
            e.implemented = false;
        }
        for g in &mut self.groups {
            g.optimized.clear();
        }
    }

    /// Record `winner` for `props` if it is strictly cheaper than the current one.
    pub fn record_winner(&mut self, group: GroupId, props: &PhysicalPropertySet, winner: Winner) -> bool {
        let expr = &mut self.exprs[winner.expr_id as usize];
        if expr.cost.map_or(true, |c| winner.cost.beats(&c)) {
            expr.cost = Some(winner.cost);
        }
        let g = self.group_mut(group);
        match g.best_plan.get(props) {
            Some(current) if !winner.cost.beats(&current.cost) => false,
            _ => {
                g.best_plan.insert(props.clone(), winner);
                true
            }
        }
    }

    /// Merge two groups known to be equivalent and return the survivor.
    pub fn merge_groups(&mut self, a: GroupId, b: GroupId) -> GroupId {
        let mut pending = vec![(a, b)];
        while let Some((x, y)) = pending.pop() {
            let (x, y) = (self.resolve(x), self.resolve(y));
            if x == y {
                continue;
            }
            let (into, from) = (x.min(y), x.max(y));
            trace!(into, from, "merging groups");
            self.absorb(into, from, &mut pending);
        }
        if cfg!(debug_assertions) {
            self.verify_integrity();
        }
        self.resolve(a)
    }

    fn absorb(&mut self, into: GroupId, from: GroupId, pending: &mut Vec<(GroupId, GroupId)>) {
        let source = &mut self.groups[from as usize];
        source.merged_into = Some(into);
        let logical = mem::take(&mut source.logical_exprs);
        let physical = mem::take(&mut source.physical_exprs);
        let winners = mem::take(&mut source.best_plan);
        let optimized = mem::take(&mut source.optimized);
        let stats = source.stats.take();
        let tables = mem::take(&mut source.logical_props.tables);
        self.live_groups -= 1;

        for &e in logical.iter().chain(&physical) {
            self.exprs[e as usize].group_id = into;
        }
        let target = &mut self.groups[into as usize];
        target.logical_exprs.extend(logical);
        target.physical_exprs.extend(physical);
        for (props, winner) in winners {
            match target.best_plan.get(&props) {
                Some(current) if !winner.cost.beats(&current.cost) => {}
                _ => {
                    target.best_plan.insert(props, winner);
                }
            }
        }
        // A property set is only finished if it was finished on both sides.
        target.optimized.retain(|p| optimized.contains(p));
        if target.stats.is_none() {
            target.stats = stats;
        }
        target.logical_props.tables.extend(tables);

        let parents: Vec<ExprId> = self
            .exprs
            .iter()
            .filter(|e| e.children.contains(&from))
            .map(|e| e.id)
            .collect();
        for id in parents {
            self.repoint(id, from, into, pending);
        }
    }

    fn key_of(&self, id: ExprId) -> ExprKey {
        let e = &self.exprs[id as usize];
        ExprKey {
            op: e.op.clone(),
            children: e.children.clone(),
        }
    }

    fn repoint(&mut self, id: ExprId, from: GroupId, into: GroupId, pending: &mut Vec<(GroupId, GroupId)>) {
        let old_key = self.key_of(id);
        if self.index.get(&old_key) == Some(&id) {
            self.index.remove(&old_key);
        }
        for c in &mut self.exprs[id as usize].children {
            if *c == from {
                *c = into;
            }
        }
        if !self.exprs[id as usize].is_live() {
            return;
        }

        let new_key = self.key_of(id);
        match self.index.get(&new_key).copied() {
            Some(existing) if existing != id => {
                let own = self.resolve(self.exprs[id as usize].group_id);
                let other = self.resolve(self.exprs[existing as usize].group_id);
                self.supersede(id, existing);
                if own != other {
                    pending.push((own, other));
                }
            }
            _ => {
                self.index.insert(new_key, id);
            }
        }
    }

    fn supersede(&mut self, dup: ExprId, keep: ExprId) {
        let applied = mem::take(&mut self.exprs[dup as usize].applied_rules);
        let dup_cost = self.exprs[dup as usize].cost;
        self.exprs[dup as usize].superseded_by = Some(keep);

        let kept = &mut self.exprs[keep as usize];
        kept.applied_rules.extend(applied);
        if let Some(c) = dup_cost {
            if kept.cost.map_or(true, |k| c.beats(&k)) {
                kept.cost = Some(c);
            }
        }

        let gid = self.resolve(self.exprs[dup as usize].group_id);
        let group = &mut self.groups[gid as usize];
        group.logical_exprs.retain(|&e| e != dup);
        group.physical_exprs.retain(|&e| e != dup);
        for winner in group.best_plan.values_mut() {
            if winner.expr_id == dup {
                winner.expr_id = keep;
            }
        }
        trace!(dup, keep, "expression superseded");
    }

    /// Consistency checks over the whole memo. Panics on the first violation.
    pub fn verify_integrity(&self) {
        let mut live = 0;
        for group in &self.groups {
            if let Some(target) = group.merged_into {
                assert!(target < group.id, "group {} forwards to higher id {}", group.id, target);
                assert!(group.logical_exprs.is_empty() && group.physical_exprs.is_empty());
                continue;
            }
            live += 1;
            for e in group.exprs() {
                let expr = &self.exprs[e as usize];
                assert!(expr.is_live(), "group {} lists superseded expr {}", group.id, e);
                assert_eq!(expr.group_id, group.id, "expr {} has stale group id", e);
            }
        }
        assert_eq!(live, self.live_groups);

        for expr in self.exprs.iter().filter(|e| e.is_live()) {
            for &c in &expr.children {
                assert!(
                    self.groups[c as usize].merged_into.is_none(),
                    "expr {} references merged group {}",
                    expr.id,
                    c
                );
            }
            assert_eq!(self.index.get(&self.key_of(expr.id)), Some(&expr.id), "expr {} not indexed", expr.id);
        }
    }

    /// Rebuild the cheapest physical plan for `group` under `props` from the recorded
    /// winners, or `None` if some group on the way has no winner.
    pub fn extract_best_plan(&self, group: GroupId, props: &PhysicalPropertySet) -> Option<PlanNode> {
        let mut path = Vec::new();
        self.extract(group, props, &mut path)
    }

    fn extract(
        &self,
        group: GroupId,
        props: &PhysicalPropertySet,
        path: &mut Vec<(GroupId, PhysicalPropertySet)>,
    ) -> Option<PlanNode> {
        let gid = self.resolve(group);
        if path.iter().any(|(g, p)| *g == gid && p == props) {
            return None;
        }
        let g = &self.groups[gid as usize];
        let winner = g.best_plan.get(props)?;
        let expr = &self.exprs[winner.expr_id as usize];
        let Operator::Physical(op) = &expr.op else {
            return None;
        };

        path.push((gid, props.clone()));
        let children: Option<Vec<PlanNode>> = expr
            .children
            .iter()
            .zip(&winner.child_props)
            .map(|(&child, child_props)| self.extract(child, child_props, path))
            .collect();
        path.pop();

        Some(PlanNode {
            op: op.clone(),
            children: children?,
            cost: winner.cost,
            properties: props.clone(),
            group_id: gid,
            row_count: g.stats.as_ref().map(|s| s.row_count),
        })
    }

    /// Groups reachable from `root` through logical expressions that have no winner for
    /// any property set, in ascending id order.
    pub fn groups_without_winner(&self, root: GroupId) -> Vec<GroupId> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.resolve(root)];
        let mut missing = Vec::new();
        while let Some(gid) = stack.pop() {
            if !seen.insert(gid) {
                continue;
            }
            let group = &self.groups[gid as usize];
            if group.best_plan.is_empty() {
                missing.push(gid);
            }
            for &e in &group.logical_exprs {
                stack.extend(self.exprs[e as usize].children.iter().map(|&c| self.resolve(c)));
            }
        }
        missing.sort_unstable();
        missing
    }

    /// One logical tree the expression stands for, choosing the first acyclic logical
    /// alternative in every child group.
    pub fn logical_plan_of(&self, expr: ExprId) -> Option<LogicalPlan> {
        self.logical_tree(expr, &mut HashSet::new())
    }

    fn logical_tree(&self, expr: ExprId, visiting: &mut HashSet<GroupId>) -> Option<LogicalPlan> {
        let e = &self.exprs[expr as usize];
        let Operator::Logical(op) = &e.op else {
            return None;
        };
        let gid = self.resolve(e.group_id);
        if !visiting.insert(gid) {
            return None;
        }
        let mut children = Vec::with_capacity(e.children.len());
        for &c in &e.children {
            let alternatives = self.group(c).logical_exprs.clone();
            match alternatives.into_iter().find_map(|alt| self.logical_tree(alt, visiting)) {
                Some(plan) => children.push(plan),
                None => {
                    visiting.remove(&gid);
                    return None;
                }
            }
        }
        visiting.remove(&gid);
        Some(LogicalPlan::new(op.clone(), children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::*;

    fn scan(name: &str) -> Operator {
        Operator::Logical(LogicalOp::Scan {
            table: TableRef::new("s", name),
            columns: vec![],
            predicate: None,
        })
    }

    fn join() -> Operator {
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition: Expr::Literal(ScalarValue::Bool(true)),
        })
    }

    fn filter(v: i64) -> Operator {
        Operator::Logical(LogicalOp::Filter {
            predicate: Expr::eq(Expr::column("a", "x"), Expr::int(v)),
        })
    }

    #[test]
    fn identical_expressions_dedup() {
        let mut memo = Memo::new();
        let (a, ea) = memo.add_expr(scan("a"), vec![]);
        let (a2, ea2) = memo.add_expr(scan("a"), vec![]);
        assert_eq!((a, ea), (a2, ea2));
        assert_eq!(memo.num_groups(), 1);
        assert_eq!(memo.num_exprs(), 1);
    }

    #[test]
    fn group_tables_follow_children() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let (b, _) = memo.add_expr(scan("b"), vec![]);
        let (ab, _) = memo.add_expr(join(), vec![a, b]);
        let tables: Vec<&str> = memo.group(ab).logical_props.tables.iter().map(String::as_str).collect();
        assert_eq!(tables, vec!["a", "b"]);
    }

    #[test]
    fn adding_existing_expr_to_other_group_merges() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let (f1, _) = memo.add_expr(filter(1), vec![a]);
        let (f2, e2) = memo.add_expr(filter(2), vec![a]);
        assert_ne!(f1, f2);

        let res = memo.add_expr_to_group(f1, filter(2), vec![a]);
        assert!(!res.inserted);
        assert_eq!(res.expr_id, e2);
        assert_eq!(res.group_id, f1.min(f2));
        assert_eq!(memo.resolve(f2), memo.resolve(f1));
        assert_eq!(memo.group(f2).logical_exprs.len(), 2);
        assert_eq!(memo.num_groups(), 2);
    }

    #[test]
    fn merge_cascades_through_parents() {
        // P1 = Filter(1)(G1), P2 = Filter(1)(G2). Merging G1 and G2 makes P1 and P2
        // identical, so their groups merge as well.
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let (g1, _) = memo.add_expr(filter(7), vec![a]);
        let (g2, _) = memo.add_expr(filter(8), vec![a]);
        let (p1, _) = memo.add_expr(filter(1), vec![g1]);
        let (p2, _) = memo.add_expr(filter(1), vec![g2]);
        assert_eq!(memo.num_groups(), 5);

        memo.merge_groups(g1, g2);
        assert_eq!(memo.resolve(p1), memo.resolve(p2));
        assert_eq!(memo.num_groups(), 3);
        assert_eq!(memo.group(p1).logical_exprs.len(), 1);
        memo.verify_integrity();
    }

    #[test]
    fn merged_winner_keeps_cheaper_entry() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let (g1, _) = memo.add_expr(filter(1), vec![a]);
        let (g2, _) = memo.add_expr(filter(2), vec![a]);
        let any = PhysicalPropertySet::any();
        let phys = |v| {
            Operator::Physical(PhysicalOp::Filter {
                predicate: Expr::eq(Expr::column("a", "x"), Expr::int(v)),
            })
        };
        let p1 = memo.add_expr_to_group(g1, phys(1), vec![a]).expr_id;
        let p2 = memo.add_expr_to_group(g2, phys(2), vec![a]).expr_id;
        memo.record_winner(g1, &any, Winner { expr_id: p1, cost: Cost::new(50.0), child_props: vec![any.clone()] });
        memo.record_winner(g2, &any, Winner { expr_id: p2, cost: Cost::new(20.0), child_props: vec![any.clone()] });
        memo.group_mut(g1).optimized.insert(any.clone());

        let g = memo.merge_groups(g1, g2);
        let winner = memo.group(g).winner(&any).expect("winner survives merge");
        assert_eq!(winner.expr_id, p2);
        assert!(!memo.group(g).is_optimized(&any));
    }

    #[test]
    fn record_winner_requires_strict_improvement() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let any = PhysicalPropertySet::any();
        let seq = |n: &str| {
            Operator::Physical(PhysicalOp::SeqScan {
                table: TableRef::new("s", n),
                columns: vec![],
                predicate: None,
            })
        };
        let first = memo.add_expr_to_group(a, seq("a"), vec![]).expr_id;
        let second = memo.add_expr_to_group(a, seq("a2"), vec![]).expr_id;
        assert!(memo.record_winner(a, &any, Winner { expr_id: first, cost: Cost::new(10.0), child_props: vec![] }));
        assert!(!memo.record_winner(a, &any, Winner { expr_id: second, cost: Cost::new(10.0), child_props: vec![] }));
        assert_eq!(memo.group(a).winner(&any).map(|w| w.expr_id), Some(first));
    }

    #[test]
    fn rule_marks_are_per_expression() {
        let mut memo = Memo::new();
        let (_, e) = memo.add_expr(scan("a"), vec![]);
        let rule = RuleId::from_name("ImplSeqScan");
        assert!(!memo.is_rule_applied(e, rule));
        memo.mark_applied(e, rule);
        assert!(memo.is_rule_applied(e, rule));
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn unknown_group_panics() {
        Memo::new().group(3);
    }

    #[test]
    fn only_marked_expressions_are_enforcers() {
        let mut memo = Memo::new();
        let (a, _) = memo.add_expr(scan("a"), vec![]);
        let (f, _) = memo.add_expr(filter(1), vec![a]);
        let phys = memo
            .add_expr_to_group(
                f,
                Operator::Physical(PhysicalOp::Filter {
                    predicate: Expr::eq(Expr::column("a", "x"), Expr::int(1)),
                }),
                vec![a],
            )
            .expr_id;

        // The filter now reads from its own group, but it was never added as an enforcer.
        let g = memo.merge_groups(a, f);
        assert!(memo.expr(phys).children.contains(&g));
        assert!(!memo.expr(phys).is_enforcer());

        let sort = memo.add_enforcer(g, PhysicalOp::SortOp { order: vec![] });
        assert!(sort.inserted);
        assert_eq!(memo.expr(sort.expr_id).children, vec![g]);
        assert!(memo.expr(sort.expr_id).is_enforcer());
    }
}
