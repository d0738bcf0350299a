//! # Plan Node Model
//!
//! Scalar expressions, logical operators and physical operators. Operator values are
//! immutable: rules never mutate an operator in place, they build a new one and hand it
//! to the memo.
//!
//! Two operators are "the same shape" when they are equal as values. The memo keys
//! expressions on `(Operator, child group ids)`, so every attribute that changes the
//! meaning of an operator must take part in `Eq`/`Hash`.
//!
//! `OpKind` and friends are the data-free discriminants used for rule dispatch and
//! pattern matching.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Reference to a column. `table` is the unqualified table name the column belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub index: u32,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
            index: 0,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Constant value. `Float64` goes through `OrderedFloat` so literals can be hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Days since 1970-01-01.
    Date(i32),
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScalarValue {}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Date(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{}", v.0),
            Self::Utf8(v) => write!(f, "'{v}'"),
            Self::Date(v) => write!(f, "DATE({v})"),
        }
    }
}

/// Scalar expression tree used in predicates, projections, join conditions and keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(ScalarValue),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Flat conjunction.
    And(Vec<Expr>),
    /// Flat disjunction.
    Or(Vec<Expr>),
}

impl Expr {
    pub fn column(table: &str, name: &str) -> Self {
        Expr::Column(ColumnRef::new(table, name))
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(ScalarValue::Int64(v))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    /// Every column reference in the expression, in syntactic order.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut cols = Vec::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_columns(out),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.collect_columns(out)),
            Expr::And(exprs) | Expr::Or(exprs) => {
                exprs.iter().for_each(|e| e.collect_columns(out))
            }
        }
    }

    /// Unqualified table names referenced by column expressions.
    pub fn tables(&self) -> std::collections::BTreeSet<String> {
        self.columns()
            .into_iter()
            .filter_map(|c| c.table.clone())
            .collect()
    }

    pub fn references_table(&self, table: &str) -> bool {
        self.columns()
            .iter()
            .any(|c| c.table.as_deref() == Some(table))
    }

    /// Flatten nested AND chains into a list of conjuncts.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Combine conjuncts into one predicate. An empty list is `TRUE`.
    pub fn conjunction(mut preds: Vec<Expr>) -> Expr {
        match preds.len() {
            0 => Expr::Literal(ScalarValue::Bool(true)),
            1 => preds.remove(0),
            _ => Expr::And(preds),
        }
    }

    /// Canonical form: conjuncts flattened, deduplicated and sorted, operands of
    /// symmetric comparisons ordered. Equal predicates written differently normalize to
    /// the same value, which is what lets rule output dedup in the memo.
    pub fn normalize(&self) -> Expr {
        match self {
            Expr::And(_) => {
                let mut parts: Vec<Expr> = self.conjuncts().into_iter().map(Expr::normalize).collect();
                parts.sort_by_cached_key(|e| e.to_string());
                parts.dedup();
                Expr::conjunction(parts)
            }
            Expr::Or(exprs) => {
                let mut parts: Vec<Expr> = exprs.iter().map(Expr::normalize).collect();
                parts.sort_by_cached_key(|e| e.to_string());
                parts.dedup();
                Expr::Or(parts)
            }
            Expr::BinaryOp { op, left, right } => {
                let (l, r) = (left.normalize(), right.normalize());
                if op.is_symmetric() && r.to_string() < l.to_string() {
                    Expr::binary(*op, r, l)
                } else {
                    Expr::binary(*op, l, r)
                }
            }
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.normalize()),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(Expr::normalize).collect(),
            },
            Expr::Column(_) | Expr::Literal(_) => self.clone(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::BinaryOp { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT ({operand})"),
                UnaryOp::Neg => write!(f, "-({operand})"),
                UnaryOp::IsNull => write!(f, "{operand} IS NULL"),
                UnaryOp::IsNotNull => write!(f, "{operand} IS NOT NULL"),
            },
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            Expr::And(exprs) => write_list(f, exprs, " AND "),
            Expr::Or(exprs) => {
                write!(f, "(")?;
                write_list(f, exprs, " OR ")?;
                write!(f, ")")
            }
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Operand order does not change the result.
    pub fn is_symmetric(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Add | BinaryOp::Mul)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Only `Inner` and `Cross` are commutative and associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub arg: Expr,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
            nulls_first: false,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, if self.ascending { "ASC" } else { "DESC" })
    }
}

/// How rows are spread across workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    /// Gathered on one node.
    Single,
    Broadcast,
    Hash(Vec<Expr>),
    RoundRobin,
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distribution::Single => write!(f, "single"),
            Distribution::Broadcast => write!(f, "broadcast"),
            Distribution::RoundRobin => write!(f, "round-robin"),
            Distribution::Hash(keys) => {
                write!(f, "hash[")?;
                write_list(f, keys, ", ")?;
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildSide {
    Left,
    Right,
}

/// Logical operators. Children live in the memo as group ids, never inline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    Scan {
        table: TableRef,
        columns: Vec<ColumnRef>,
        predicate: Option<Expr>,
    },
    Filter {
        predicate: Expr,
    },
    Project {
        exprs: Vec<Expr>,
        aliases: Vec<String>,
    },
    Join {
        join_type: JoinType,
        condition: Expr,
    },
    Aggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    Sort {
        order: Vec<SortKey>,
    },
    Limit {
        offset: u64,
        count: u64,
    },
}

impl LogicalOp {
    pub fn kind(&self) -> LogicalOpKind {
        match self {
            LogicalOp::Scan { .. } => LogicalOpKind::Scan,
            LogicalOp::Filter { .. } => LogicalOpKind::Filter,
            LogicalOp::Project { .. } => LogicalOpKind::Project,
            LogicalOp::Join { .. } => LogicalOpKind::Join,
            LogicalOp::Aggregate { .. } => LogicalOpKind::Aggregate,
            LogicalOp::Sort { .. } => LogicalOpKind::Sort,
            LogicalOp::Limit { .. } => LogicalOpKind::Limit,
        }
    }

    pub fn arity(&self) -> usize {
        self.kind().arity()
    }
}

/// Physical operators.
///
/// `MergeJoin` carries its per-side key lists: the left child must arrive sorted on
/// `left_keys` and the right child on `right_keys`. They are resolved when the rule
/// fires, since only then is it known which side owns which column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOp {
    SeqScan {
        table: TableRef,
        columns: Vec<ColumnRef>,
        predicate: Option<Expr>,
    },
    Filter {
        predicate: Expr,
    },
    Project {
        exprs: Vec<Expr>,
        aliases: Vec<String>,
    },
    Limit {
        offset: u64,
        count: u64,
    },
    HashJoin {
        join_type: JoinType,
        build_side: BuildSide,
        condition: Expr,
    },
    MergeJoin {
        join_type: JoinType,
        condition: Expr,
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
    },
    NestedLoopJoin {
        join_type: JoinType,
        condition: Expr,
    },
    HashAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Needs input sorted on `group_by`.
    StreamAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    SortOp {
        order: Vec<SortKey>,
    },
    Exchange {
        distribution: Distribution,
    },
}

impl PhysicalOp {
    pub fn kind(&self) -> PhysicalOpKind {
        match self {
            PhysicalOp::SeqScan { .. } => PhysicalOpKind::SeqScan,
            PhysicalOp::Filter { .. } => PhysicalOpKind::Filter,
            PhysicalOp::Project { .. } => PhysicalOpKind::Project,
            PhysicalOp::Limit { .. } => PhysicalOpKind::Limit,
            PhysicalOp::HashJoin { .. } => PhysicalOpKind::HashJoin,
            PhysicalOp::MergeJoin { .. } => PhysicalOpKind::MergeJoin,
            PhysicalOp::NestedLoopJoin { .. } => PhysicalOpKind::NestedLoopJoin,
            PhysicalOp::HashAggregate { .. } => PhysicalOpKind::HashAggregate,
            PhysicalOp::StreamAggregate { .. } => PhysicalOpKind::StreamAggregate,
            PhysicalOp::SortOp { .. } => PhysicalOpKind::SortOp,
            PhysicalOp::Exchange { .. } => PhysicalOpKind::Exchange,
        }
    }

    pub fn arity(&self) -> usize {
        match self.kind() {
            PhysicalOpKind::SeqScan => 0,
            PhysicalOpKind::HashJoin
            | PhysicalOpKind::MergeJoin
            | PhysicalOpKind::NestedLoopJoin => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::Scan { table, .. } => write!(f, "Scan({table})"),
            LogicalOp::Filter { predicate } => write!(f, "Filter({predicate})"),
            LogicalOp::Project { exprs, .. } => {
                write!(f, "Project(")?;
                write_list(f, exprs, ", ")?;
                write!(f, ")")
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => write!(f, "Join[{join_type:?}]({condition})"),
            LogicalOp::Aggregate { group_by, .. } => {
                write!(f, "Aggregate(")?;
                write_list(f, group_by, ", ")?;
                write!(f, ")")
            }
            LogicalOp::Sort { order } => {
                write!(f, "Sort(")?;
                write_list(f, order, ", ")?;
                write!(f, ")")
            }
            LogicalOp::Limit { offset, count } => write!(f, "Limit({count} offset {offset})"),
        }
    }
}

impl fmt::Display for PhysicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalOp::SeqScan { table, .. } => write!(f, "SeqScan({table})"),
            PhysicalOp::Filter { predicate } => write!(f, "Filter({predicate})"),
            PhysicalOp::Project { exprs, .. } => {
                write!(f, "Project(")?;
                write_list(f, exprs, ", ")?;
                write!(f, ")")
            }
            PhysicalOp::Limit { offset, count } => write!(f, "Limit({count} offset {offset})"),
            PhysicalOp::HashJoin {
                join_type,
                build_side,
                condition,
            } => write!(f, "HashJoin[{join_type:?}, build={build_side:?}]({condition})"),
            PhysicalOp::MergeJoin {
                join_type,
                condition,
                ..
            } => write!(f, "MergeJoin[{join_type:?}]({condition})"),
            PhysicalOp::NestedLoopJoin {
                join_type,
                condition,
            } => write!(f, "NestedLoopJoin[{join_type:?}]({condition})"),
            PhysicalOp::HashAggregate { group_by, .. } => {
                write!(f, "HashAggregate(")?;
                write_list(f, group_by, ", ")?;
                write!(f, ")")
            }
            PhysicalOp::StreamAggregate { group_by, .. } => {
                write!(f, "StreamAggregate(")?;
                write_list(f, group_by, ", ")?;
                write!(f, ")")
            }
            PhysicalOp::SortOp { order } => {
                write!(f, "Sort(")?;
                write_list(f, order, ", ")?;
                write!(f, ")")
            }
            PhysicalOp::Exchange { distribution } => write!(f, "Exchange({distribution})"),
        }
    }
}

/// Either side of the logical/physical split, as stored in the memo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Logical(LogicalOp),
    Physical(PhysicalOp),
}

impl Operator {
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Logical(l) => OpKind::Logical(l.kind()),
            Operator::Physical(p) => OpKind::Physical(p.kind()),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Operator::Logical(l) => l.arity(),
            Operator::Physical(p) => p.arity(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Logical(l) => l.fmt(f),
            Operator::Physical(p) => p.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Logical(LogicalOpKind),
    Physical(PhysicalOpKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalOpKind {
    Scan,
    Filter,
    Project,
    Join,
    Aggregate,
    Sort,
    Limit,
}

impl LogicalOpKind {
    pub const ALL: [LogicalOpKind; 7] = [
        LogicalOpKind::Scan,
        LogicalOpKind::Filter,
        LogicalOpKind::Project,
        LogicalOpKind::Join,
        LogicalOpKind::Aggregate,
        LogicalOpKind::Sort,
        LogicalOpKind::Limit,
    ];

    pub fn arity(self) -> usize {
        match self {
            LogicalOpKind::Scan => 0,
            LogicalOpKind::Join => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOpKind {
    SeqScan,
    Filter,
    Project,
    Limit,
    HashJoin,
    MergeJoin,
    NestedLoopJoin,
    HashAggregate,
    StreamAggregate,
    SortOp,
    Exchange,
}
