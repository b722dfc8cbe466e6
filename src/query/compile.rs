//! Validation and SQL generation for query expression trees.
//!
//! Names are resolved against a stack of scopes, one per (sub)query, so an
//! unqualified column inside a subquery binds to the innermost relation that
//! has it and falls back to enclosing queries (correlation). Literals are
//! always bound as `?N` parameters; identifiers are always quoted.

use crate::error::QueryError;
use crate::store::sql_int;

use super::expr::{AggregateFunc, Collection, Expr, JoinKind, Query, Relation};
use super::result::Value;

/// SQL text plus its bound parameters and output column names.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<String>,
}

/// A boolean expression over one collection, for use in a `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub params: Vec<Value>,
}

pub fn compile(query: &Query) -> Result<CompiledQuery, QueryError> {
    let mut compiler = Compiler::default();
    let (sql, columns) = compiler.query(query)?;
    Ok(CompiledQuery {
        sql,
        params: compiler.params,
        columns,
    })
}

/// Compile `predicate` against `collection` under its default alias.
pub fn compile_predicate(
    predicate: &Expr,
    collection: Collection,
) -> Result<CompiledPredicate, QueryError> {
    let mut compiler = Compiler::default();
    compiler.scopes.push(Scope {
        relations: vec![(collection.default_alias().to_string(), collection)],
        select_aliases: Vec::new(),
    });
    let sql = compiler.expr(predicate, Clause::Where)?;
    Ok(CompiledPredicate {
        sql,
        params: compiler.params,
    })
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(name: &str) -> Result<(), QueryError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Where,
    On,
    GroupBy,
    Select,
    Having,
    OrderBy,
    AggregateArg,
}

impl Clause {
    fn allows_aggregate(self) -> bool {
        matches!(self, Clause::Select | Clause::Having | Clause::OrderBy)
    }

    fn sees_select_aliases(self) -> bool {
        matches!(self, Clause::GroupBy | Clause::Having | Clause::OrderBy)
    }

    fn name(self) -> &'static str {
        match self {
            Clause::Where => "filter",
            Clause::On => "join condition",
            Clause::GroupBy => "group by",
            Clause::Select => "select",
            Clause::Having => "having",
            Clause::OrderBy => "order by",
            Clause::AggregateArg => "aggregate argument",
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    relations: Vec<(String, Collection)>,
    select_aliases: Vec<String>,
}

#[derive(Debug, Default)]
struct Compiler {
    params: Vec<Value>,
    scopes: Vec<Scope>,
}

impl Compiler {
    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn query(&mut self, query: &Query) -> Result<(String, Vec<String>), QueryError> {
        let mut scope = Scope::default();
        for relation in std::iter::once(&query.from).chain(query.joins.iter().map(|j| &j.relation)) {
            let name = relation.name().to_string();
            validate_identifier(&name)?;
            if scope.relations.iter().any(|(n, _)| *n == name) {
                return Err(QueryError::DuplicateAlias(name));
            }
            scope.relations.push((name, relation.collection));
        }
        self.scopes.push(scope);
        let result = self.query_body(query);
        self.scopes.pop();
        result
    }

    fn query_body(&mut self, query: &Query) -> Result<(String, Vec<String>), QueryError> {
        let mut projections = Vec::new();
        let mut columns = Vec::new();

        if query.select.is_empty() {
            let from = query.from.name();
            for column in query.from.collection.columns() {
                projections.push(format!("{}.{} AS {}", quote(from), quote(column), quote(column)));
                columns.push(column.to_string());
            }
        } else {
            for item in &query.select {
                if let Some(alias) = &item.alias {
                    validate_identifier(alias)?;
                }
                let sql = self.expr(&item.expr, Clause::Select)?;
                let name = item
                    .alias
                    .clone()
                    .unwrap_or_else(|| item.expr.default_name());
                if columns.contains(&name) {
                    return Err(QueryError::DuplicateColumn(name));
                }
                projections.push(format!("{} AS {}", sql, quote(&name)));
                columns.push(name);
            }
        }

        if let Some(scope) = self.scopes.last_mut() {
            scope.select_aliases = query
                .select
                .iter()
                .filter_map(|item| item.alias.clone())
                .collect();
        }

        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&projections.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&relation_sql(&query.from));

        for join in &query.joins {
            let on = self.expr(&join.on, Clause::On)?;
            let keyword = match join.kind {
                JoinKind::Inner => "JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push_str(&format!(" {} {} ON {}", keyword, relation_sql(&join.relation), on));
        }

        if let Some(filter) = &query.filter {
            let filter = self.expr(filter, Clause::Where)?;
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }

        if !query.group_by.is_empty() {
            let keys = query
                .group_by
                .iter()
                .map(|e| self.expr(e, Clause::GroupBy))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(having) = &query.having {
            let having = self.expr(having, Clause::Having)?;
            sql.push_str(" HAVING ");
            sql.push_str(&having);
        }

        if !query.order_by.is_empty() {
            let mut keys = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                let key = self.expr(&order.expr, Clause::OrderBy)?;
                keys.push(if order.descending {
                    format!("{} DESC", key)
                } else {
                    key
                });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        match (query.limit, query.offset) {
            (Some(limit), offset) => {
                let limit = self.bind(Value::Integer(sql_int("limit", limit)?));
                sql.push_str(&format!(" LIMIT {}", limit));
                if let Some(offset) = offset {
                    let offset = self.bind(Value::Integer(sql_int("offset", offset)?));
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
            (None, Some(offset)) => {
                let offset = self.bind(Value::Integer(sql_int("offset", offset)?));
                sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset));
            }
            (None, None) => {}
        }

        Ok((sql, columns))
    }

    fn subquery(&mut self, query: &Query) -> Result<(String, usize), QueryError> {
        let (sql, columns) = self.query(query)?;
        Ok((sql, columns.len()))
    }

    fn expr(&mut self, expr: &Expr, clause: Clause) -> Result<String, QueryError> {
        match expr {
            Expr::Column { relation, name } => self.column(relation.as_deref(), name, clause),
            Expr::Literal { value } => Ok(self.bind(value.clone())),
            Expr::Binary { op, left, right } => {
                let left = self.expr(left, clause)?;
                let right = self.expr(right, clause)?;
                Ok(format!("({} {} {})", left, op.sql(), right))
            }
            Expr::Not { expr } => Ok(format!("(NOT {})", self.expr(expr, clause)?)),
            Expr::IsNull { expr, negated } => Ok(format!(
                "({} IS {}NULL)",
                self.expr(expr, clause)?,
                if *negated { "NOT " } else { "" }
            )),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let target = self.expr(expr, clause)?;
                if list.is_empty() {
                    return Ok(if *negated { "1" } else { "0" }.to_string());
                }
                let items = list
                    .iter()
                    .map(|e| self.expr(e, clause))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!(
                    "({} {}IN ({}))",
                    target,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                ))
            }
            Expr::InQuery {
                expr,
                query,
                negated,
            } => {
                let target = self.expr(expr, clause)?;
                let (sql, arity) = self.subquery(query)?;
                if arity != 1 {
                    return Err(QueryError::SubqueryArity(arity));
                }
                Ok(format!(
                    "({} {}IN ({}))",
                    target,
                    if *negated { "NOT " } else { "" },
                    sql
                ))
            }
            Expr::Exists { query, negated } => {
                let (sql, _) = self.subquery(query)?;
                Ok(format!("({}EXISTS ({}))", if *negated { "NOT " } else { "" }, sql))
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => {
                if !clause.allows_aggregate() {
                    return Err(QueryError::MisplacedAggregate(format!(
                        "{} in {}",
                        expr,
                        clause.name()
                    )));
                }
                match arg {
                    None if *func == AggregateFunc::Count => Ok("count(*)".to_string()),
                    None => Err(QueryError::Rejected(format!("{}(*) needs an argument", func.sql()))),
                    Some(arg) => {
                        let arg = self.expr(arg, Clause::AggregateArg)?;
                        Ok(format!(
                            "{}({}{})",
                            func.sql(),
                            if *distinct { "DISTINCT " } else { "" },
                            arg
                        ))
                    }
                }
            }
        }
    }

    fn column(
        &self,
        relation: Option<&str>,
        name: &str,
        clause: Clause,
    ) -> Result<String, QueryError> {
        if let Some(relation) = relation {
            for scope in self.scopes.iter().rev() {
                if let Some((alias, collection)) =
                    scope.relations.iter().find(|(alias, _)| alias == relation)
                {
                    if !collection.has_column(name) {
                        return Err(QueryError::UnknownColumn(format!("{}.{}", relation, name)));
                    }
                    return Ok(format!("{}.{}", quote(alias), quote(name)));
                }
            }
            return Err(QueryError::UnknownRelation(relation.to_string()));
        }

        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            let matches: Vec<&str> = scope
                .relations
                .iter()
                .filter(|(_, collection)| collection.has_column(name))
                .map(|(alias, _)| alias.as_str())
                .collect();

            match matches.as_slice() {
                [alias] => return Ok(format!("{}.{}", quote(alias), quote(name))),
                [] => {}
                _ => return Err(QueryError::AmbiguousColumn(name.to_string())),
            }

            if depth == 0
                && clause.sees_select_aliases()
                && scope.select_aliases.iter().any(|a| a == name)
            {
                return Ok(quote(name));
            }
        }

        Err(QueryError::UnknownColumn(name.to_string()))
    }
}

fn relation_sql(relation: &Relation) -> String {
    format!(
        "{} AS {}",
        quote(relation.collection.table()),
        quote(relation.name())
    )
}
