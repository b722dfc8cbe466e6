//! Canned queries for the questions asked most often of a heap.

use super::expr::{aggregate, col, col_of, count_star, lit, AggregateFunc, Query, Relation};

/// `type, n` for every type, most numerous first.
pub fn count_by_type() -> Query {
    Query::objects()
        .select(col("type"))
        .select_as(count_star(), "n")
        .group_by(col("type"))
        .order_by_desc(col("n"))
        .order_by(col("type"))
}

/// `type, n, bytes` for every type, largest total first.
pub fn bytes_by_type() -> Query {
    Query::objects()
        .select(col("type"))
        .select_as(count_star(), "n")
        .select_as(aggregate(AggregateFunc::Sum, col("size")), "bytes")
        .group_by(col("type"))
        .order_by_desc(col("bytes"))
        .order_by(col("type"))
}

/// Objects holding at least one reference to an object of `type_name`.
pub fn holders_of_type(type_name: &str) -> Query {
    let held = Query::references()
        .select(col_of("ref", "parent"))
        .join(
            Relation::objects().alias("held"),
            col_of("held", "address").eq(col_of("ref", "child")),
        )
        .filter(col_of("held", "type").eq(lit(type_name)));

    Query::objects()
        .filter(col("address").in_query(held))
        .order_by(col("address"))
}

/// Objects currently flagged by the marker.
pub fn roots() -> Query {
    Query::objects()
        .filter(col("mark").eq(lit(1)))
        .order_by(col("address"))
}

/// The `n` largest objects.
pub fn largest(n: u64) -> Query {
    Query::objects()
        .order_by_desc(col("size"))
        .order_by(col("address"))
        .limit(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compile::compile;

    #[test]
    fn test_patterns_compile() {
        for query in [count_by_type(), bytes_by_type(), holders_of_type("str"), roots(), largest(3)] {
            compile(&query).unwrap();
        }
    }

    #[test]
    fn test_holders_subquery_is_single_column() {
        let compiled = compile(&holders_of_type("dict")).unwrap();
        assert!(compiled.sql.contains(r#"JOIN "obj" AS "held""#));
        assert_eq!(compiled.params.len(), 1);
    }
}
