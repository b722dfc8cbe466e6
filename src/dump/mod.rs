//! Dump reader: streams an object dump into typed records.
//!
//! The input is JSON-lines, one heap object per line, with the object's
//! outgoing references embedded:
//!
//! ```text
//! {"address": 125817416, "type": "list", "size": 72, "len": 2, "refs": [125817400, 125817432]}
//! {"address": 125817400, "type": "str", "size": 50, "value": "hello"}
//! ```
//!
//! Optional fields: `name`, `value`, `len`, `refs`, `ref_labels` (parallel to
//! `refs`) and `top` (the dump marks the object as significant).
//!
//! The reader never holds more than one line in memory. A line that fails to
//! decode yields a [`ParseError`] carrying its record index and byte offset;
//! the reader then continues with the next line, leaving the skip-or-abort
//! decision to the caller.

mod record;

pub use record::{derive_repr, EdgeRecord, ObjectRecord};

use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ParseError, Result};
use crate::Address;

/// Replacement text for `value` strings that cannot be decoded.
pub const SURROGATE_PLACEHOLDER: &str = "SURROGATE ERROR REMOVED";

#[derive(Debug, Deserialize)]
struct RawRecord {
    address: Option<u64>,
    #[serde(rename = "type")]
    type_name: Option<String>,
    size: Option<i64>,
    len: Option<i64>,
    name: Option<serde_json::Value>,
    value: Option<serde_json::Value>,
    #[serde(default)]
    refs: Vec<u64>,
    ref_labels: Option<Vec<Option<String>>>,
    #[serde(default)]
    top: bool,
}

/// Lazy, forward-only reader over a dump stream.
pub struct DumpReader<R> {
    input: R,
    buf: Vec<u8>,
    offset: u64,
    records: u64,
    finished: bool,
}

impl DumpReader<BufReader<File>> {
    /// Open a dump file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            buf: Vec::new(),
            offset: 0,
            records: 0,
            finished: false,
        }
    }

    /// Number of records produced so far (including malformed ones).
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Bytes consumed from the stream so far.
    pub fn bytes_read(&self) -> u64 {
        self.offset
    }
}

impl<R: BufRead> Iterator for DumpReader<R> {
    type Item = Result<ObjectRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            self.buf.clear();
            let start = self.offset;
            match self.input.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(n) => self.offset += n as u64,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }

            let line = trim_line(&self.buf);
            if line.is_empty() {
                continue;
            }

            let record = self.records;
            self.records += 1;
            return Some(decode_line(line, record, start).map_err(Into::into));
        }
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end.max(start)]
}

/// Decode one dump line into a record.
pub fn decode_line(line: &[u8], record: u64, offset: u64) -> Result<ObjectRecord, ParseError> {
    let fail = |message: String| ParseError {
        record,
        offset,
        message,
    };

    let raw: RawRecord = match serde_json::from_slice(line) {
        Ok(raw) => raw,
        // Dumps from some interpreters carry lone UTF-16 surrogates in string
        // values; drop the value and keep the object.
        Err(first) => match scrub_value(line) {
            Some(scrubbed) => {
                serde_json::from_slice(&scrubbed).map_err(|_| fail(first.to_string()))?
            }
            None => return Err(fail(first.to_string())),
        },
    };

    let address = raw
        .address
        .ok_or_else(|| fail("missing field `address`".to_string()))?;
    if address > i64::MAX as u64 {
        return Err(fail(format!("address {} out of range", address)));
    }
    let type_name = raw
        .type_name
        .ok_or_else(|| fail("missing field `type`".to_string()))?;
    let size = raw
        .size
        .ok_or_else(|| fail("missing field `size`".to_string()))?;
    if size < 0 {
        return Err(fail(format!("negative size {}", size)));
    }
    if let Some(&child) = raw.refs.iter().find(|&&child| child > i64::MAX as u64) {
        return Err(fail(format!("reference {} out of range", child)));
    }

    let labels = raw.ref_labels.unwrap_or_default();
    let refs = raw
        .refs
        .iter()
        .enumerate()
        .map(|(i, &child)| EdgeRecord {
            child: child as Address,
            label: labels.get(i).cloned().flatten(),
        })
        .collect();

    let name = raw.name.and_then(json_text);
    let value = raw.value.and_then(json_text);
    let repr = derive_repr(&type_name, name.as_deref(), value.as_deref());

    Ok(ObjectRecord {
        record,
        offset,
        address,
        type_name,
        size: size as u64,
        len: raw.len,
        name,
        value,
        repr,
        top: raw.top,
        refs,
    })
}

fn json_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Replace the `"value"` string literal of a line with [`SURROGATE_PLACEHOLDER`].
///
/// Returns `None` when the line has no string-valued `"value"` field.
fn scrub_value(line: &[u8]) -> Option<Vec<u8>> {
    const KEY: &[u8] = b"\"value\"";

    let key_at = line.windows(KEY.len()).position(|w| w == KEY)?;
    let mut i = key_at + KEY.len();
    while i < line.len() && line[i].is_ascii_whitespace() {
        i += 1;
    }
    if line.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    while i < line.len() && line[i].is_ascii_whitespace() {
        i += 1;
    }
    if line.get(i) != Some(&b'"') {
        return None;
    }
    let open = i;
    i += 1;
    while i < line.len() {
        match line[i] {
            b'\\' => i += 2,
            b'"' => break,
            _ => i += 1,
        }
    }
    if i >= line.len() {
        return None;
    }

    let mut out = Vec::with_capacity(line.len());
    out.extend_from_slice(&line[..open]);
    out.push(b'"');
    out.extend_from_slice(SURROGATE_PLACEHOLDER.as_bytes());
    out.push(b'"');
    out.extend_from_slice(&line[i + 1..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemseeError;

    fn read_all(input: &str) -> Vec<Result<ObjectRecord>> {
        DumpReader::new(input.as_bytes()).collect()
    }

    #[test]
    fn test_reads_records_with_inline_refs() {
        let dump = r#"{"address": 3, "type": "list", "size": 64, "len": 2, "refs": [1, 2]}
{"address": 1, "type": "int", "size": 28, "value": 5}
"#;
        let records: Vec<ObjectRecord> = read_all(dump).into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].address, 3);
        assert_eq!(records[0].len, Some(2));
        assert_eq!(
            records[0].refs.iter().map(|e| e.child).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(records[1].value.as_deref(), Some("5"));
        assert_eq!(records[1].repr, "5");
        assert_eq!(records[1].record, 1);
    }

    #[test]
    fn test_blank_lines_are_skipped_but_offsets_advance() {
        let dump = "\n{\"address\": 1, \"type\": \"int\", \"size\": 28}\n";
        let records = read_all(dump);
        assert_eq!(records.len(), 1);
        let record = records.into_iter().next().unwrap().unwrap();
        assert_eq!(record.record, 0);
        assert_eq!(record.offset, 1);
    }

    #[test]
    fn test_malformed_record_reports_offset_and_continues() {
        let dump = "{\"address\": 1, \"type\": \"int\", \"size\": 28}\n{not json}\n{\"address\": 2, \"type\": \"int\", \"size\": 28}\n";
        let records = read_all(dump);
        assert_eq!(records.len(), 3);

        match &records[1] {
            Err(MemseeError::Parse(e)) => {
                assert_eq!(e.record, 1);
                assert_eq!(e.offset, 42);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(records[2].as_ref().unwrap().address, 2);
    }

    #[test]
    fn test_missing_required_field() {
        let records = read_all("{\"address\": 1, \"size\": 28}\n");
        match &records[0] {
            Err(MemseeError::Parse(e)) => assert!(e.message.contains("type")),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_size_rejected() {
        let records = read_all("{\"address\": 1, \"type\": \"int\", \"size\": -4}\n");
        assert!(matches!(records[0], Err(MemseeError::Parse(_))));
    }

    #[test]
    fn test_lone_surrogate_value_is_replaced() {
        let dump = "{\"address\": 9, \"type\": \"str\", \"size\": 40, \"value\": \"ab\\ud800cd\"}\n";
        let record = read_all(dump).into_iter().next().unwrap().unwrap();
        assert_eq!(record.value.as_deref(), Some(SURROGATE_PLACEHOLDER));
        assert_eq!(record.address, 9);
    }

    #[test]
    fn test_ref_labels_are_parallel_to_refs() {
        let dump = "{\"address\": 5, \"type\": \"dict\", \"size\": 100, \"refs\": [1, 2], \"ref_labels\": [\"key\", null]}\n";
        let record = read_all(dump).into_iter().next().unwrap().unwrap();
        assert_eq!(record.refs[0].label.as_deref(), Some("key"));
        assert_eq!(record.refs[1].label, None);
    }

    #[test]
    fn test_top_flag() {
        let dump = "{\"address\": 5, \"type\": \"module\", \"size\": 100, \"name\": \"sys\", \"top\": true}\n";
        let record = read_all(dump).into_iter().next().unwrap().unwrap();
        assert!(record.top);
        assert_eq!(record.repr, "sys");
    }

    #[test]
    fn test_scrub_value_without_value_field() {
        assert!(scrub_value(b"{\"address\": 1}").is_none());
    }
}
