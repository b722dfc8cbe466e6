//! Human-readable rendering: compact counts and aligned tables.

use std::collections::HashMap;
use std::fmt;

use crate::query::Value;
use crate::store::ObjectRow;

/// Shown for NULL cells.
pub const NULL_CELL: &str = "\u{2218}";

/// A count with compact formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count(pub u64);

impl Count {
    /// `9999`, `12.3K`, `4.5M`, `6.7G`, `8.9T`.
    pub fn nice(&self) -> String {
        let n = self.0 as f64;
        if n < 1e4 {
            format!("{}", self.0)
        } else if n < 1e6 {
            format!("{:.1}K", n / 1e3)
        } else if n < 1e9 {
            format!("{:.1}M", n / 1e6)
        } else if n < 1e12 {
            format!("{:.1}G", n / 1e9)
        } else {
            format!("{:.1}T", n / 1e12)
        }
    }

    /// Exact value, followed by the compact form once it differs.
    pub fn both(&self) -> String {
        if self.0 >= 10_000 {
            format!("{} ({})", self.0, self.nice())
        } else {
            self.0.to_string()
        }
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Formats cells, replacing integers that match a named value with `$name`.
#[derive(Debug, Default)]
pub struct CellFormatter {
    names: HashMap<i64, String>,
}

impl CellFormatter {
    /// Build from `(name, value)` pairs; values that are not integers are ignored.
    pub fn with_names(names: &[(String, String)]) -> Self {
        let names = names
            .iter()
            .filter_map(|(name, value)| value.trim().parse::<i64>().ok().map(|v| (v, name.clone())))
            .collect();
        Self { names }
    }

    pub fn cell(&self, value: &Value) -> String {
        match value {
            Value::Null => NULL_CELL.to_string(),
            Value::Integer(n) => match self.names.get(n) {
                Some(name) => format!("${}", name),
                None => n.to_string(),
            },
            other => other.to_string(),
        }
    }

    pub fn optional<T: ToString>(&self, value: &Option<T>) -> String {
        value.as_ref().map_or_else(|| NULL_CELL.to_string(), |v| v.to_string())
    }

    pub fn address(&self, address: u64) -> String {
        match i64::try_from(address) {
            Ok(n) => self.cell(&Value::Integer(n)),
            Err(_) => address.to_string(),
        }
    }
}

/// Render rows as left-aligned columns separated by two spaces.
pub fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(columns));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

/// Column headers used for object listings.
pub fn object_columns() -> Vec<String> {
    ["address", "type", "name", "value", "size", "len", "repr", "mark"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn object_cells(object: &ObjectRow, cells: &CellFormatter) -> Vec<String> {
    vec![
        cells.address(object.address),
        object.type_name.clone(),
        cells.optional(&object.name),
        cells.optional(&object.value),
        object.size.to_string(),
        cells.optional(&object.len),
        cells.optional(&object.repr),
        cells.optional(&object.marked.map(|m| m as u8)),
    ]
}
