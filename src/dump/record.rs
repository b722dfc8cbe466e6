//! Typed dump records.

use serde::{Deserialize, Serialize};

use crate::Address;

/// One outgoing edge carried inline by its parent's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub child: Address,
    pub label: Option<String>,
}

/// One heap object plus its outgoing references.
///
/// # Position
/// `record` is the 0-based index among non-blank dump lines and `offset`
/// the byte offset of the line start. Both are used to report which input
/// ranges did or did not land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub record: u64,
    pub offset: u64,
    pub address: Address,
    pub type_name: String,
    pub size: u64,
    pub len: Option<i64>,
    pub name: Option<String>,
    pub value: Option<String>,
    /// Short display form derived from type, name and value
    pub repr: String,
    /// Flagged as significant by the dump itself
    pub top: bool,
    pub refs: Vec<EdgeRecord>,
}

impl ObjectRecord {
    /// Build a record directly, deriving `repr` the same way the reader does.
    ///
    /// Position fields are zero; the ingestion engine does not depend on them
    /// beyond reporting.
    pub fn new(address: Address, type_name: impl Into<String>, size: u64) -> Self {
        let type_name = type_name.into();
        let repr = derive_repr(&type_name, None, None);
        Self {
            record: 0,
            offset: 0,
            address,
            type_name,
            size,
            len: None,
            name: None,
            value: None,
            repr,
            top: false,
            refs: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self.repr = derive_repr(&self.type_name, self.name.as_deref(), self.value.as_deref());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.repr = derive_repr(&self.type_name, self.name.as_deref(), self.value.as_deref());
        self
    }

    pub fn with_refs(mut self, children: &[Address]) -> Self {
        self.refs.extend(children.iter().map(|&child| EdgeRecord { child, label: None }));
        self
    }

    pub fn with_top(mut self, top: bool) -> Self {
        self.top = top;
        self
    }

    pub fn at(mut self, record: u64) -> Self {
        self.record = record;
        self
    }
}

/// Derive the short display form for an object.
///
/// Functions, types and modules show their name; ints show their value and
/// strings their quoted value; everything else shows the type name.
pub fn derive_repr(type_name: &str, name: Option<&str>, value: Option<&str>) -> String {
    match type_name {
        "function" | "type" | "module" => name.or(value).unwrap_or(type_name).to_string(),
        "int" => value.unwrap_or(type_name).to_string(),
        "str" | "unicode" => match value {
            Some(v) => format!("{:?}", v),
            None => type_name.to_string(),
        },
        _ => type_name.to_string(),
    }
}
