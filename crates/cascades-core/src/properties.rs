//! # Physical Properties
//!
//! A `PhysicalPropertySet` is a requirement on a plan's output: an ordering, a data
//! distribution, both, or neither ("any"). Winners in the memo are keyed by the property
//! set they were optimized for.
//!
//! Every physical operator answers one question through [`required_child_props`]: given
//! what the parent requires of me, what must each of my children deliver? `None` means
//! the operator cannot satisfy the requirement at all, no matter what its children do.
//! Requirements an operator cannot meet on its own are covered by enforcers
//! ([`enforcer_for`]): a `SortOp` for orderings, an `Exchange` for distributions.

use crate::expr::{Distribution, Expr, PhysicalOp, SortKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Logical properties shared by every expression of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalProperties {
    /// Unqualified names of the base tables this group reads.
    pub tables: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalPropertySet {
    #[serde(default)]
    pub sort_order: Option<Vec<SortKey>>,
    #[serde(default)]
    pub distribution: Option<Distribution>,
}

impl PhysicalPropertySet {
    pub fn any() -> Self {
        Self::default()
    }

    /// An empty ordering is no requirement at all.
    pub fn with_sort(order: Vec<SortKey>) -> Self {
        Self {
            sort_order: if order.is_empty() { None } else { Some(order) },
            distribution: None,
        }
    }

    pub fn with_distribution(dist: Distribution) -> Self {
        Self {
            sort_order: None,
            distribution: Some(dist),
        }
    }

    pub fn is_any(&self) -> bool {
        self.sort_order.is_none() && self.distribution.is_none()
    }

    pub fn without_sort(&self) -> Self {
        Self {
            sort_order: None,
            distribution: self.distribution.clone(),
        }
    }

    /// True when `provided` meets every part of this requirement. A required ordering is
    /// met by any provided ordering it is a prefix of; distributions must match exactly.
    pub fn satisfied_by(&self, provided: &PhysicalPropertySet) -> bool {
        let sort_ok = match (&self.sort_order, &provided.sort_order) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(required), Some(provided)) => is_prefix(required, provided),
        };
        let dist_ok = match (&self.distribution, &provided.distribution) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(required), Some(provided)) => required == provided,
        };
        sort_ok && dist_ok
    }
}

impl fmt::Display for PhysicalPropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "{{any}}");
        }
        write!(f, "{{")?;
        if let Some(order) = &self.sort_order {
            write!(f, "order=[")?;
            for (i, k) in order.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}")?;
            }
            write!(f, "]")?;
            if self.distribution.is_some() {
                write!(f, " ")?;
            }
        }
        if let Some(dist) = &self.distribution {
            write!(f, "dist={dist}")?;
        }
        write!(f, "}}")
    }
}

fn is_prefix(required: &[SortKey], provided: &[SortKey]) -> bool {
    required.len() <= provided.len() && required.iter().zip(provided).all(|(r, p)| r == p)
}

fn ascending(keys: &[Expr]) -> Vec<SortKey> {
    keys.iter().cloned().map(SortKey::asc).collect()
}

/// Orders an operator produces by itself, independent of its input's order.
fn sort_required_ok(required: &PhysicalPropertySet, produced: &[SortKey]) -> bool {
    match &required.sort_order {
        None => true,
        Some(req) => is_prefix(req, produced),
    }
}

/// The input column a projection output `expr` is computed from. Only bare columns
/// pass through: an alias of a computed expression has no counterpart below the
/// projection, so a requirement on it has to be enforced above.
fn through_projection(expr: &Expr, exprs: &[Expr], aliases: &[String]) -> Option<Expr> {
    let Expr::Column(col) = expr else {
        return None;
    };
    if col.table.is_none() {
        if let Some(i) = aliases.iter().position(|a| *a == col.name) {
            return matches!(exprs.get(i), Some(Expr::Column(_))).then(|| exprs[i].clone());
        }
    }
    exprs
        .iter()
        .any(|e| matches!(e, Expr::Column(c) if c.table == col.table && c.name == col.name))
        .then(|| expr.clone())
}

/// Property sets each child must deliver for `op` to satisfy `required`.
pub fn required_child_props(
    op: &PhysicalOp,
    required: &PhysicalPropertySet,
) -> Option<Vec<PhysicalPropertySet>> {
    match op {
        PhysicalOp::Filter { .. } => Some(vec![required.clone()]),
        PhysicalOp::Project { exprs, aliases } => {
            let sort_order = match &required.sort_order {
                None => None,
                Some(keys) => Some(
                    keys.iter()
                        .map(|k| {
                            Some(SortKey {
                                expr: through_projection(&k.expr, exprs, aliases)?,
                                ..k.clone()
                            })
                        })
                        .collect::<Option<Vec<_>>>()?,
                ),
            };
            let distribution = match &required.distribution {
                Some(Distribution::Hash(keys)) => Some(Distribution::Hash(
                    keys.iter()
                        .map(|k| through_projection(k, exprs, aliases))
                        .collect::<Option<Vec<_>>>()?,
                )),
                other => other.clone(),
            };
            Some(vec![PhysicalPropertySet {
                sort_order,
                distribution,
            }])
        }
        // A limit over a partitioned input would keep `count` rows per partition.
        PhysicalOp::Limit { .. } => {
            if required.distribution.is_some() {
                return None;
            }
            Some(vec![required.clone()])
        }
        PhysicalOp::SortOp { order } => {
            if !sort_required_ok(required, order) {
                return None;
            }
            Some(vec![required.without_sort()])
        }
        PhysicalOp::Exchange { distribution } => {
            if required.sort_order.is_some() {
                return None;
            }
            match &required.distribution {
                Some(d) if d != distribution => None,
                _ => Some(vec![PhysicalPropertySet::any()]),
            }
        }
        PhysicalOp::MergeJoin {
            left_keys,
            right_keys,
            ..
        } => {
            let produced = ascending(left_keys);
            if required.distribution.is_some() || !sort_required_ok(required, &produced) {
                return None;
            }
            Some(vec![
                PhysicalPropertySet::with_sort(produced),
                PhysicalPropertySet::with_sort(ascending(right_keys)),
            ])
        }
        PhysicalOp::StreamAggregate { group_by, .. } => {
            let produced = ascending(group_by);
            if required.distribution.is_some() || !sort_required_ok(required, &produced) {
                return None;
            }
            Some(vec![PhysicalPropertySet::with_sort(produced)])
        }
        PhysicalOp::SeqScan { .. }
        | PhysicalOp::HashJoin { .. }
        | PhysicalOp::NestedLoopJoin { .. }
        | PhysicalOp::HashAggregate { .. } => {
            if !required.is_any() {
                return None;
            }
            Some(vec![PhysicalPropertySet::any(); op.arity()])
        }
    }
}

/// The enforcer to try for `required`, and the weaker requirement it needs from the
/// group underneath it. Orderings are enforced outermost, so a requirement carrying both
/// an ordering and a distribution becomes `Sort` over `Exchange`.
pub fn enforcer_for(required: &PhysicalPropertySet) -> Option<(PhysicalOp, PhysicalPropertySet)> {
    if let Some(order) = &required.sort_order {
        return Some((
            PhysicalOp::SortOp {
                order: order.clone(),
            },
            required.without_sort(),
        ));
    }
    required.distribution.as_ref().map(|dist| {
        (
            PhysicalOp::Exchange {
                distribution: dist.clone(),
            },
            PhysicalPropertySet::any(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, BuildSide, JoinType, ScalarValue};

    fn key(col: &str) -> SortKey {
        SortKey::asc(Expr::column("t", col))
    }

    #[test]
    fn prefix_ordering_satisfies_requirement() {
        let required = PhysicalPropertySet::with_sort(vec![key("a")]);
        let provided = PhysicalPropertySet::with_sort(vec![key("a"), key("b")]);
        assert!(required.satisfied_by(&provided));
        assert!(!provided.satisfied_by(&required));
        assert!(PhysicalPropertySet::any().satisfied_by(&required));
    }

    #[test]
    fn empty_sort_is_any() {
        assert!(PhysicalPropertySet::with_sort(vec![]).is_any());
    }

    #[test]
    fn hash_join_only_satisfies_any() {
        let op = PhysicalOp::HashJoin {
            join_type: JoinType::Inner,
            build_side: BuildSide::Right,
            condition: Expr::Literal(ScalarValue::Bool(true)),
        };
        let any = PhysicalPropertySet::any();
        assert_eq!(required_child_props(&op, &any), Some(vec![any.clone(), any]));
        let sorted = PhysicalPropertySet::with_sort(vec![key("a")]);
        assert_eq!(required_child_props(&op, &sorted), None);
    }

    #[test]
    fn merge_join_provides_left_key_order() {
        let op = PhysicalOp::MergeJoin {
            join_type: JoinType::Inner,
            condition: Expr::eq(Expr::column("l", "k"), Expr::column("r", "k")),
            left_keys: vec![Expr::column("l", "k")],
            right_keys: vec![Expr::column("r", "k")],
        };
        let required = PhysicalPropertySet::with_sort(vec![SortKey::asc(Expr::column("l", "k"))]);
        let children = required_child_props(&op, &required).expect("merge join satisfies order");
        assert_eq!(
            children[1],
            PhysicalPropertySet::with_sort(vec![SortKey::asc(Expr::column("r", "k"))])
        );
    }

    #[test]
    fn enforcers_layer_sort_over_exchange() {
        let required = PhysicalPropertySet {
            sort_order: Some(vec![key("a")]),
            distribution: Some(Distribution::Single),
        };
        let (op, relaxed) = enforcer_for(&required).expect("sort enforcer");
        assert!(matches!(op, PhysicalOp::SortOp { .. }));
        assert_eq!(relaxed, PhysicalPropertySet::with_distribution(Distribution::Single));
        let (op, relaxed) = enforcer_for(&relaxed).expect("exchange enforcer");
        assert!(matches!(op, PhysicalOp::Exchange { .. }));
        assert!(relaxed.is_any());
        assert!(enforcer_for(&relaxed).is_none());
    }

    fn alias(name: &str) -> Expr {
        Expr::Column(crate::expr::ColumnRef {
            table: None,
            name: name.into(),
            index: 0,
        })
    }

    #[test]
    fn project_maps_bare_column_aliases_to_its_input() {
        let op = PhysicalOp::Project {
            exprs: vec![Expr::column("t", "a"), Expr::binary(BinaryOp::Mul, Expr::column("t", "b"), Expr::int(2))],
            aliases: vec!["renamed".into(), "doubled".into()],
        };
        let by_alias = PhysicalPropertySet::with_sort(vec![SortKey::asc(alias("renamed"))]);
        assert_eq!(
            required_child_props(&op, &by_alias),
            Some(vec![PhysicalPropertySet::with_sort(vec![key("a")])])
        );
        let by_column = PhysicalPropertySet::with_sort(vec![key("a")]);
        assert_eq!(required_child_props(&op, &by_column), Some(vec![by_column.clone()]));
    }

    #[test]
    fn project_cannot_pass_down_computed_or_missing_keys() {
        let op = PhysicalOp::Project {
            exprs: vec![Expr::column("t", "a"), Expr::binary(BinaryOp::Mul, Expr::column("t", "b"), Expr::int(2))],
            aliases: vec!["a".into(), "doubled".into()],
        };
        let computed = PhysicalPropertySet::with_sort(vec![SortKey::asc(alias("doubled"))]);
        assert_eq!(required_child_props(&op, &computed), None);
        let projected_away = PhysicalPropertySet::with_sort(vec![key("b")]);
        assert_eq!(required_child_props(&op, &projected_away), None);
        let hashed = PhysicalPropertySet::with_distribution(Distribution::Hash(vec![alias("doubled")]));
        assert_eq!(required_child_props(&op, &hashed), None);
        let single = PhysicalPropertySet::with_distribution(Distribution::Single);
        assert_eq!(required_child_props(&op, &single), Some(vec![single.clone()]));
    }

    #[test]
    fn limit_passes_order_but_not_distribution() {
        let op = PhysicalOp::Limit { offset: 0, count: 10 };
        let sorted = PhysicalPropertySet::with_sort(vec![key("a")]);
        assert_eq!(required_child_props(&op, &sorted), Some(vec![sorted.clone()]));
        let hashed = PhysicalPropertySet::with_distribution(Distribution::Hash(vec![Expr::column("t", "a")]));
        assert_eq!(required_child_props(&op, &hashed), None);
    }
}
