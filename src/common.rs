//! Common helpers shared across command modules
//!
//! Address parsing, `$name` resolution and JSON argument loading. Every
//! command that accepts an address or an expression goes through here so the
//! accepted syntax stays the same everywhere.

use anyhow::{Context, Result};
use std::path::Path;

use crate::query::{col, Expr, Query};
use crate::session::Session;
use crate::Address;

/// Parse a decimal or `0x`-prefixed hexadecimal address.
///
/// # Examples
///
/// ```
/// use memsee::common::parse_address;
///
/// assert_eq!(parse_address("140"), Some(140));
/// assert_eq!(parse_address("0x8c"), Some(140));
/// assert_eq!(parse_address("list"), None);
/// ```
pub fn parse_address(text: &str) -> Option<Address> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => Address::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Resolve an address argument: a literal address or `$name`.
pub fn resolve_address(session: &Session, text: &str) -> Result<Address> {
    if let Some(name) = text.strip_prefix('$') {
        let value = session
            .lookup_name(name)?
            .ok_or_else(|| anyhow::anyhow!("undefined name: ${}", name))?;
        return parse_address(&value)
            .ok_or_else(|| anyhow::anyhow!("${} is not an address: {}", name, value));
    }
    parse_address(text).ok_or_else(|| anyhow::anyhow!("invalid address: {}", text))
}

/// Read a JSON argument, either inline or from `@FILE`.
pub fn load_json_argument(text: &str) -> Result<String> {
    match text.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(Path::new(file))
            .with_context(|| format!("failed to read {}", file)),
        None => Ok(text.to_string()),
    }
}

/// Parse an object predicate (JSON expression, inline or `@FILE`).
pub fn parse_predicate(text: &str) -> Result<Expr> {
    let json = load_json_argument(text)?;
    serde_json::from_str(&json).context("invalid predicate expression")
}

/// Parse a query tree (JSON, inline or `@FILE`).
pub fn parse_query(text: &str) -> Result<Query> {
    let json = load_json_argument(text)?;
    serde_json::from_str(&json).context("invalid query expression")
}

/// Resolve a selector to addresses.
///
/// A literal address or `$name` yields exactly that address, whether or not
/// an object exists there. Anything else is taken as a predicate over
/// objects and yields every matching address in ascending order.
pub fn resolve_selector(session: &Session, text: &str) -> Result<Vec<Address>> {
    if text.starts_with('$') || parse_address(text).is_some() {
        return Ok(vec![resolve_address(session, text)?]);
    }

    let predicate = parse_predicate(text)?;
    let query = Query::objects()
        .select(col("address"))
        .filter(predicate)
        .order_by(col("address"));
    let result = session.query(&query)?;
    Ok(result
        .column_i64("address")
        .into_iter()
        .map(|a| a as Address)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_address_forms() {
        assert_eq!(parse_address(" 42 "), Some(42));
        assert_eq!(parse_address("0X2a"), Some(42));
        assert_eq!(parse_address("-1"), None);
        assert_eq!(parse_address("0x"), None);
    }

    #[test]
    fn test_resolve_named_address() {
        let dir = TempDir::new().unwrap();
        let session = Session::create(dir.path().join("heap.db")).unwrap();
        session.define_name("root", "0x8c").unwrap();
        session.define_name("label", "hello").unwrap();

        assert_eq!(resolve_address(&session, "$root").unwrap(), 140);
        assert!(resolve_address(&session, "$label").is_err());
        assert!(resolve_address(&session, "$missing").is_err());
    }

    #[test]
    fn test_load_json_from_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pred.json");
        std::fs::write(&file, r#"{"kind": "column", "name": "top"}"#).unwrap();

        let arg = format!("@{}", file.display());
        let predicate = parse_predicate(&arg).unwrap();
        assert_eq!(predicate, col("top"));
    }

    #[test]
    fn test_bad_predicate_is_an_error() {
        assert!(parse_predicate("{not json").is_err());
    }
}
