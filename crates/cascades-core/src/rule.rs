//! # Rule System
//!
//! There are two kinds of optimization rules:
//!
//! - **Exploration rules** rewrite a logical expression into equivalent logical
//!   expressions (join commutativity, predicate pushdown). Their output lands in the
//!   same group as the input.
//! - **Implementation rules** map a logical expression to physical alternatives (a
//!   logical join to a hash join, merge join or nested-loop join).
//!
//! A rule sees one [`Binding`] of its pattern and a read-only [`OptContext`]. It
//! returns new expressions and never touches the memo; the scheduler inserts the
//! results. A rule that fails returns a [`RuleError`], which costs the run that one
//! application and nothing else.
//!
//! ## Rule Identity
//!
//! A rule's [`RuleId`] is a hash of its name. The memo records which ids have fired on
//! each expression, which is what stops commutativity from swapping back and forth
//! forever.
//!
//! ## Registry and Active Rules
//!
//! [`RuleRegistry`] holds every known rule, plus connector-specific rule sets keyed by
//! source type. [`ActiveRules`] is the per-run selection: the registry filtered through
//! a [`RuleConfig`], indexed by root operator kind and phase.

use crate::catalog::Catalog;
use crate::config::RuleConfig;
use crate::error::{OptimizerError, Result};
use crate::expr::{LogicalOpKind, Operator};
use crate::memo::{GroupId, Memo};
use crate::pattern::{Binding, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RulePhase {
    /// Logical → logical.
    Exploration,
    /// Logical → physical.
    Implementation,
}

impl fmt::Display for RulePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePhase::Exploration => f.write_str("exploration"),
            RulePhase::Implementation => f.write_str("implementation"),
        }
    }
}

/// Identifier derived from the rule name with 64-bit FNV-1a, so the same name maps to
/// the same id in every process and on every toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u64);

impl RuleId {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        RuleId(hash)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Read-only view handed to rules.
pub struct OptContext<'a> {
    pub memo: &'a Memo,
    pub catalog: &'a dyn Catalog,
}

/// A child reference in a rule result: an existing group or a new sub-expression.
///
/// ```text
/// (A ⋈ B) ⋈ C  →  A ⋈ (B ⋈ C)
/// ```
///
/// needs a group for `B ⋈ C`. The rule returns
/// `RuleChild::NewExpr(Join, [Group(B), Group(C)])` and the scheduler finds or creates
/// that group when inserting the result.
#[derive(Debug, Clone)]
pub enum RuleChild {
    Group(GroupId),
    NewExpr(Operator, Vec<RuleChild>),
}

/// An expression produced by a rule, to be added to the group of the bound expression.
#[derive(Debug, Clone)]
pub enum RuleResult {
    /// Children are existing groups.
    Substitution(Operator, Vec<GroupId>),
    /// Some children are new sub-expressions.
    NewChildren(Operator, Vec<RuleChild>),
}

impl RuleResult {
    pub fn operator(&self) -> &Operator {
        match self {
            RuleResult::Substitution(op, _) | RuleResult::NewChildren(op, _) => op,
        }
    }

    /// True when the operator and every nested sub-expression have the number of
    /// children their kind requires.
    pub fn is_well_formed(&self) -> bool {
        fn child_ok(child: &RuleChild) -> bool {
            match child {
                RuleChild::Group(_) => true,
                RuleChild::NewExpr(op, children) => {
                    op.arity() == children.len() && children.iter().all(child_ok)
                }
            }
        }
        match self {
            RuleResult::Substitution(op, children) => op.arity() == children.len(),
            RuleResult::NewChildren(op, children) => {
                op.arity() == children.len() && children.iter().all(child_ok)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("binding does not have the expected shape: {0}")]
    UnexpectedBinding(String),
    #[error("{0}")]
    Failed(String),
}

/// A rule transforms or implements expressions.
pub trait Rule: Send + Sync {
    /// Unique name of this rule.
    fn name(&self) -> &str;

    fn phase(&self) -> RulePhase;

    /// Pattern that this rule matches against.
    fn pattern(&self) -> Pattern;

    /// Produce the alternatives for one binding. Returning no results is fine.
    fn apply(&self, binding: &Binding, ctx: &OptContext<'_>) -> Result<Vec<RuleResult>, RuleError>;

    fn id(&self) -> RuleId {
        RuleId::from_name(self.name())
    }
}

/// A named set of rules (e.g., for a specific connector).
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<Arc<dyn Rule>>,
}

/// Registry of optimization rules.
#[derive(Default)]
pub struct RuleRegistry {
    base_rules: Vec<Arc<dyn Rule>>,
    source_rules: HashMap<String, RuleSet>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) {
        self.base_rules.push(rule);
    }

    pub fn add_source_rule_set(&mut self, name: impl Into<String>, rule_set: RuleSet) {
        self.source_rules.insert(name.into(), rule_set);
    }

    /// Base rules followed by the rule set for `source`, if any.
    pub fn rules_for_source(&self, source: Option<&str>) -> Vec<&Arc<dyn Rule>> {
        let mut rules: Vec<&Arc<dyn Rule>> = self.base_rules.iter().collect();
        if let Some(rs) = source.and_then(|s| self.source_rules.get(s)) {
            rules.extend(rs.rules.iter());
        }
        rules
    }

    /// Every rule the registry knows, base rules first, then source sets by name.
    pub fn all_rules(&self) -> Vec<&Arc<dyn Rule>> {
        let mut sources: Vec<&String> = self.source_rules.keys().collect();
        sources.sort();
        let mut rules: Vec<&Arc<dyn Rule>> = self.base_rules.iter().collect();
        for s in sources {
            rules.extend(self.source_rules[s].rules.iter());
        }
        rules
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all_rules().iter().any(|r| r.name() == name)
    }
}

/// The rules taking part in one run, indexed for dispatch.
pub struct ActiveRules {
    rules: Vec<Arc<dyn Rule>>,
    by_id: HashMap<RuleId, usize>,
    index: HashMap<(LogicalOpKind, RulePhase), Vec<Arc<dyn Rule>>>,
}

impl ActiveRules {
    /// Select the rules `config` enables. Names in the configuration that match no
    /// known rule are logged and otherwise ignored; two active rules with one id are an
    /// error.
    pub fn new(registry: &RuleRegistry, config: &RuleConfig) -> Result<Self> {
        for name in config.mentioned() {
            if !registry.contains(name) {
                warn!(rule = %name, "rule configuration names an unknown rule");
            }
        }

        let mut rules = Vec::new();
        let mut by_id = HashMap::new();
        let mut index: HashMap<_, Vec<Arc<dyn Rule>>> = HashMap::new();
        let mut seen = HashSet::new();
        for rule in registry.rules_for_source(config.source_type.as_deref()) {
            if !config.is_enabled(rule.name()) {
                continue;
            }
            if !seen.insert(rule.id()) {
                return Err(OptimizerError::DuplicateRule(rule.name().to_string()));
            }
            by_id.insert(rule.id(), rules.len());
            rules.push(Arc::clone(rule));
            for kind in rule.pattern().root_kinds() {
                index.entry((kind, rule.phase())).or_default().push(Arc::clone(rule));
            }
        }
        Ok(Self { rules, by_id, index })
    }

    /// Rules whose pattern can match at a root of `kind`, in registration order.
    pub fn rules_for(&self, kind: LogicalOpKind, phase: RulePhase) -> &[Arc<dyn Rule>] {
        self.index.get(&(kind, phase)).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: RuleId) -> Option<&Arc<dyn Rule>> {
        self.by_id.get(&id).map(|&i| &self.rules[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Rule>> {
        self.rules.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for ActiveRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
