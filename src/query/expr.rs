//! Query expression tree.
//!
//! Plain data, serializable so a front end can send queries as JSON:
//!
//! ```json
//! {
//!   "from": {"collection": "objects"},
//!   "select": [
//!     {"expr": {"kind": "column", "name": "type"}},
//!     {"expr": {"kind": "aggregate", "func": "count"}, "alias": "n"}
//!   ],
//!   "group_by": [{"kind": "column", "name": "type"}],
//!   "order_by": [{"expr": {"kind": "column", "name": "n"}, "descending": true}]
//! }
//! ```
//!
//! Two collections exist: `objects` (default alias `obj`) and `references`
//! (default alias `ref`). Nothing else can be named.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::result::Value;

/// Columns of the objects collection.
pub const OBJECT_COLUMNS: &[&str] = &[
    "address", "type", "name", "value", "size", "len", "repr", "top", "mark",
];

/// Columns of the references collection.
pub const REFERENCE_COLUMNS: &[&str] = &["parent", "child", "label"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Objects,
    References,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Objects => "obj",
            Collection::References => "ref",
        }
    }

    pub fn default_alias(&self) -> &'static str {
        self.table()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Collection::Objects => OBJECT_COLUMNS,
            Collection::References => REFERENCE_COLUMNS,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns().contains(&name)
    }
}

/// A collection bound to an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Relation {
    pub fn objects() -> Self {
        Self {
            collection: Collection::Objects,
            alias: None,
        }
    }

    pub fn references() -> Self {
        Self {
            collection: Collection::References,
            alias: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// The name this relation is referred to by.
    pub fn name(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or_else(|| self.collection.default_alias())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    #[serde(default)]
    pub kind: JoinKind,
    pub relation: Relation,
    pub on: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
}

impl BinaryOp {
    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunc {
    pub fn sql(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::Avg => "avg",
        }
    }
}

/// Scalar, boolean and aggregate expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relation: Option<String>,
        name: String,
    },
    Literal {
        value: Value,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        #[serde(default)]
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        #[serde(default)]
        negated: bool,
    },
    InQuery {
        expr: Box<Expr>,
        query: Box<Query>,
        #[serde(default)]
        negated: bool,
    },
    Exists {
        query: Box<Query>,
        #[serde(default)]
        negated: bool,
    },
    Aggregate {
        func: AggregateFunc,
        /// `None` means `*` (count only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<Box<Expr>>,
        #[serde(default)]
        distinct: bool,
    },
}

/// Unqualified column reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column {
        relation: None,
        name: name.into(),
    }
}

/// Column qualified by a relation alias.
pub fn col_of(relation: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Column {
        relation: Some(relation.into()),
        name: name.into(),
    }
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal {
        value: value.into(),
    }
}

pub fn count_star() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
        distinct: false,
    }
}

pub fn aggregate(func: AggregateFunc, arg: Expr) -> Expr {
    Expr::Aggregate {
        func,
        arg: Some(Box::new(arg)),
        distinct: false,
    }
}

pub fn exists(query: Query) -> Expr {
    Expr::Exists {
        query: Box::new(query),
        negated: false,
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Ge, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn like(self, pattern: Expr) -> Expr {
        self.binary(BinaryOp::Like, pattern)
    }

    pub fn not(self) -> Expr {
        Expr::Not {
            expr: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn in_query(self, query: Query) -> Expr {
        Expr::InQuery {
            expr: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    pub fn not_in_query(self, query: Query) -> Expr {
        Expr::InQuery {
            expr: Box::new(self),
            query: Box::new(query),
            negated: true,
        }
    }

    pub fn distinct(self) -> Expr {
        match self {
            Expr::Aggregate { func, arg, .. } => Expr::Aggregate {
                func,
                arg,
                distinct: true,
            },
            other => other,
        }
    }

    /// Column name used when a select item carries no alias.
    pub fn default_name(&self) -> String {
        match self {
            Expr::Column { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column {
                relation: Some(r),
                name,
            } => write!(f, "{}.{}", r, name),
            Expr::Column { relation: None, name } => write!(f, "{}", name),
            Expr::Literal { value } => match value {
                Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
                other => write!(f, "{}", other),
            },
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op.sql(), right),
            Expr::Not { expr } => write!(f, "NOT {}", expr),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::InList { expr, list, negated } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(
                    f,
                    "{} {}IN ({})",
                    expr,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            Expr::InQuery { expr, negated, .. } => {
                write!(f, "{} {}IN (subquery)", expr, if *negated { "NOT " } else { "" })
            }
            Expr::Exists { negated, .. } => {
                write!(f, "{}EXISTS (subquery)", if *negated { "NOT " } else { "" })
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => match arg {
                None => write!(f, "{}(*)", func.sql()),
                Some(arg) => write!(
                    f,
                    "{}({}{})",
                    func.sql(),
                    if *distinct { "DISTINCT " } else { "" },
                    arg
                ),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expr: Expr,
    #[serde(default)]
    pub descending: bool,
}

/// One relational query over the store.
///
/// An empty `select` projects every column of `from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub from: Relation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<SelectItem>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Expr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl Query {
    pub fn new(relation: Relation) -> Self {
        Self {
            from: relation,
            joins: Vec::new(),
            filter: None,
            select: Vec::new(),
            distinct: false,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn objects() -> Self {
        Self::new(Relation::objects())
    }

    pub fn references() -> Self {
        Self::new(Relation::references())
    }

    /// Addresses of the parents of `child`: `SELECT parent FROM ref WHERE child = <child>`.
    ///
    /// `child` may be correlated with an enclosing query.
    pub fn parents_of(child: Expr) -> Self {
        Self::references()
            .select(col("parent"))
            .filter(col("child").eq(child))
    }

    /// Addresses of the children of `parent`.
    pub fn children_of(parent: Expr) -> Self {
        Self::references()
            .select(col("child"))
            .filter(col("parent").eq(parent))
    }

    /// Parents of every address produced by `children`.
    pub fn parents_of_any(children: Query) -> Self {
        Self::references()
            .select(col("parent"))
            .filter(col("child").in_query(children))
    }

    /// Children of every address produced by `parents`.
    pub fn children_of_any(parents: Query) -> Self {
        Self::references()
            .select(col("child"))
            .filter(col("parent").in_query(parents))
    }

    pub fn join(mut self, relation: Relation, on: Expr) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Inner,
            relation,
            on,
        });
        self
    }

    pub fn left_join(mut self, relation: Relation, on: Expr) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Left,
            relation,
            on,
        });
        self
    }

    /// Add a selection predicate, AND-ed with any existing one.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn select(mut self, expr: Expr) -> Self {
        self.select.push(SelectItem { expr, alias: None });
        self
    }

    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.select.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, predicate: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderBy {
            expr,
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderBy {
            expr,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_default_names() {
        assert_eq!(count_star().default_name(), "count(*)");
        assert_eq!(aggregate(AggregateFunc::Sum, col("size")).default_name(), "sum(size)");
        assert_eq!(col_of("o", "type").default_name(), "type");
        assert_eq!(
            aggregate(AggregateFunc::Count, col("type")).distinct().to_string(),
            "count(DISTINCT type)"
        );
    }

    #[test]
    fn test_filter_accumulates_with_and() {
        let q = Query::objects()
            .filter(col("type").eq(lit("str")))
            .filter(col("size").gt(lit(100)));
        match q.filter {
            Some(Expr::Binary { op: BinaryOp::And, .. }) => {}
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_json_form() {
        let json = r#"{
            "from": {"collection": "objects"},
            "select": [{"expr": {"kind": "column", "name": "type"}},
                       {"expr": {"kind": "aggregate", "func": "count"}, "alias": "n"}],
            "group_by": [{"kind": "column", "name": "type"}]
        }"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert_eq!(
            q,
            Query::objects()
                .select(col("type"))
                .select_as(count_star(), "n")
                .group_by(col("type"))
        );
    }

    #[test]
    fn test_relation_names() {
        assert_eq!(Relation::objects().name(), "obj");
        assert_eq!(Relation::references().alias("r").name(), "r");
    }
}
