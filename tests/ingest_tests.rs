//! Ingestion tests over JSON-lines dump streams
//!
//! Exercises the public ingestion entry points end to end: counts, marking,
//! batch isolation, cancellation, single-writer enforcement and determinism.

use std::sync::Mutex;

use memsee::query::{col, lit};
use memsee::{
    ingest, ingest_file, FailPoint, IngestOptions, IngestProgress, MemseeError, Query, Session,
    Value,
};
use tempfile::TempDir;

const THREE_OBJECTS: &str = r#"{"address": 1, "type": "list", "size": 72, "len": 2, "refs": [2, 3]}
{"address": 2, "type": "str", "size": 50, "value": "hello", "refs": []}
{"address": 3, "type": "int", "size": 28, "value": "42", "refs": [999]}
"#;

fn session(dir: &TempDir) -> Session {
    Session::create(dir.path().join("heap.db")).unwrap()
}

fn ints(n: u64) -> String {
    (0..n)
        .map(|i| format!("{{\"address\": {}, \"type\": \"int\", \"size\": 28}}\n", 100 + i))
        .collect()
}

#[test]
fn test_three_object_dump_end_to_end() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);

    let report = ingest(&session, THREE_OBJECTS.as_bytes(), &IngestOptions::default()).unwrap();

    assert_eq!(report.records_read, 3);
    assert_eq!(report.objects_loaded, 3);
    assert_eq!(report.references_loaded, 3);
    assert_eq!(report.total_bytes, 150);
    assert_eq!(report.roots_marked, Some(1));
    assert!(report.is_complete());

    let stats = session.stats().unwrap();
    assert_eq!(stats.objects, 3);
    assert_eq!(stats.references, 3);
    assert_eq!(stats.total_bytes, 150);
    assert_eq!(stats.roots, 1);

    let list = session.object(1).unwrap().unwrap();
    assert_eq!(list.type_name, "list");
    assert_eq!(list.len, Some(2));
    assert_eq!(list.marked, Some(true));

    let hello = session.object(2).unwrap().unwrap();
    assert_eq!(hello.repr, Some("\"hello\"".to_string()));
    assert_eq!(hello.marked, Some(false));
}

#[test]
fn test_group_by_type_and_single_root() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let dump = r#"{"address": 1, "type": "int", "size": 28}
{"address": 2, "type": "str", "size": 50}
{"address": 3, "type": "list", "size": 64, "refs": [1, 2]}
"#;

    let report = ingest(&session, dump.as_bytes(), &IngestOptions::default()).unwrap();
    assert_eq!(report.objects_loaded, 3);
    assert_eq!(report.references_loaded, 2);

    let counts = session.query(&memsee::query::patterns::count_by_type()).unwrap();
    let by_type: Vec<(String, i64)> = counts
        .rows
        .iter()
        .map(|row| {
            (
                row.get("type").and_then(Value::as_str).unwrap().to_string(),
                row.get("n").and_then(Value::as_i64).unwrap(),
            )
        })
        .collect();
    assert_eq!(
        by_type,
        vec![
            ("int".to_string(), 1),
            ("list".to_string(), 1),
            ("str".to_string(), 1)
        ]
    );

    let marked = session
        .query(&Query::objects().filter(col("mark").eq(lit(1))).select(col("address")))
        .unwrap();
    assert_eq!(marked.column_i64("address"), vec![3]);

    // Marking again flags the same set
    session.mark_top().unwrap();
    let again = session
        .query(&Query::objects().filter(col("mark").eq(lit(1))).select(col("address")))
        .unwrap();
    assert_eq!(again, marked);
}

#[test]
fn test_dangling_reference_is_kept_without_object() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    ingest(&session, THREE_OBJECTS.as_bytes(), &IngestOptions::default()).unwrap();

    assert!(session.object(999).unwrap().is_none());

    let refs = session
        .query(&Query::references().filter(col("child").eq(lit(999))))
        .unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs.rows[0].get("parent"), Some(&Value::Integer(3)));

    // Children only lists existing objects
    assert!(session.children(3).unwrap().is_empty());
}

#[test]
fn test_ingest_file_records_source_in_history() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let dump = dir.path().join("heap.json");
    std::fs::write(&dump, THREE_OBJECTS).unwrap();

    let report = ingest_file(&session, &dump, &IngestOptions::default(), None).unwrap();

    let history = session.ingest_history(None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run_id, report.run_id);
    assert_eq!(history[0].source, dump.display().to_string());
    assert_eq!(history[0].outcome, "completed");
    assert_eq!(history[0].objects, 3);
}

#[test]
fn test_failed_batch_is_isolated() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let options = IngestOptions::default()
        .with_batch_size(2)
        .with_fail_point(FailPoint::CommitBatch(1));

    let report = ingest(&session, ints(6).as_bytes(), &options).unwrap();

    assert_eq!(report.batches_committed, 2);
    assert_eq!(report.objects_loaded, 4);
    assert_eq!(report.failed_batches.len(), 1);
    let lost = &report.failed_batches[0];
    assert_eq!(lost.index, 1);
    assert_eq!((lost.first_record, lost.last_record), (2, 3));
    assert!(!report.is_complete());

    // Records 2 and 3 are gone; their neighbours are not
    assert!(session.object(101).unwrap().is_some());
    assert!(session.object(102).unwrap().is_none());
    assert!(session.object(103).unwrap().is_none());
    assert!(session.object(104).unwrap().is_some());
    assert_eq!(session.stats().unwrap().objects, 4);

    let history = session.ingest_history(Some(1)).unwrap();
    assert_eq!(history[0].outcome, "partial");
    assert_eq!(history[0].failed_batches, report.failed_batches);
}

#[test]
fn test_cancel_after_second_batch_keeps_committed_work() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let options = IngestOptions::default().with_batch_size(2);
    let cancel = options.cancel.clone();

    let on_progress = move |p: &IngestProgress| {
        if p.batches_committed >= 2 {
            cancel.cancel();
        }
    };
    let report = memsee::ingest_with_progress(
        &session,
        ints(10).as_bytes(),
        &options,
        Some(&on_progress),
    )
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.batches_committed, 2);
    assert_eq!(report.objects_loaded, 4);
    assert_eq!(report.roots_marked, None);
    assert_eq!(session.stats().unwrap().objects, 4);
    assert_eq!(session.ingest_history(Some(1)).unwrap()[0].outcome, "cancelled");
}

#[test]
fn test_second_ingest_is_refused_while_first_runs() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let other = session.clone();
    let attempts = Mutex::new(Vec::new());

    let on_progress = |p: &IngestProgress| {
        let busy = matches!(
            ingest(&other, ints(1).as_bytes(), &IngestOptions::default()),
            Err(MemseeError::SessionBusy { .. })
        );
        let name_busy = matches!(
            other.define_name("x", "1"),
            Err(MemseeError::SessionBusy { .. })
        );
        // Readers see exactly the committed batches
        let visible = other.stats().unwrap().objects;
        attempts
            .lock()
            .unwrap()
            .push((busy && name_busy, visible, p.objects_loaded));
    };
    let options = IngestOptions::default().with_batch_size(3);
    memsee::ingest_with_progress(&session, ints(6).as_bytes(), &options, Some(&on_progress))
        .unwrap();

    let attempts = attempts.into_inner().unwrap();
    assert_eq!(attempts, vec![(true, 3, 3), (true, 6, 6)]);

    // Free again once the first run returns
    let more = "{\"address\": 9000, \"type\": \"int\", \"size\": 28}\n";
    let report = ingest(&session, more.as_bytes(), &IngestOptions::default()).unwrap();
    assert_eq!(report.objects_loaded, 1);
    assert_eq!(session.stats().unwrap().objects, 7);
}

#[test]
fn test_second_handle_on_same_store_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("heap.db");
    let first = Session::create(&path).unwrap();
    let second = Session::open(&path).unwrap();
    let refused = Mutex::new(Vec::new());

    let on_progress = |_: &IngestProgress| {
        let err = ingest(&second, ints(2).as_bytes(), &IngestOptions::default()).unwrap_err();
        refused
            .lock()
            .unwrap()
            .push(matches!(err, MemseeError::SessionBusy { .. }));
    };
    let options = IngestOptions::default().with_batch_size(3);
    memsee::ingest_with_progress(&first, ints(6).as_bytes(), &options, Some(&on_progress))
        .unwrap();

    assert_eq!(refused.into_inner().unwrap(), vec![true, true]);
    assert_eq!(second.stats().unwrap().objects, 6);

    // The claim is released with the first run
    let more = "{\"address\": 9000, \"type\": \"int\", \"size\": 28}\n";
    ingest(&second, more.as_bytes(), &IngestOptions::default()).unwrap();
    assert_eq!(first.stats().unwrap().objects, 7);
}

#[test]
fn test_duplicate_address_last_write_wins_and_refs_accumulate() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let dump = r#"{"address": 7, "type": "list", "size": 72, "refs": [1]}
{"address": 7, "type": "tuple", "size": 64, "refs": [2]}
"#;

    let report = ingest(&session, dump.as_bytes(), &IngestOptions::default()).unwrap();

    assert_eq!(report.warning_count, 1);
    assert_eq!(report.warnings[0].address, 7);
    let object = session.object(7).unwrap().unwrap();
    assert_eq!(object.type_name, "tuple");
    assert_eq!(object.size, 64);
    assert_eq!(session.stats().unwrap().references, 2);
}

#[test]
fn test_strict_mode_rejects_conflicting_duplicate() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let dump = r#"{"address": 7, "type": "list", "size": 72}
{"address": 7, "type": "tuple", "size": 64}
"#;

    let err = ingest(&session, dump.as_bytes(), &IngestOptions::default().strict(true)).unwrap_err();
    assert!(matches!(err, MemseeError::DataQuality(_)));
    assert_eq!(session.stats().unwrap().objects, 0);
}

#[test]
fn test_malformed_lines_are_skipped_with_offsets() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir);
    let dump = "{\"address\": 1, \"type\": \"int\", \"size\": 28}\nnot json\n{\"address\": 2, \"type\": \"int\", \"size\": 28}\n";

    let report = ingest(&session, dump.as_bytes(), &IngestOptions::default()).unwrap();

    assert_eq!(report.objects_loaded, 2);
    assert_eq!(report.parse_error_count, 1);
    assert_eq!(report.parse_errors[0].record, 1);
    assert_eq!(report.parse_errors[0].offset, 42);
}

#[test]
fn test_same_dump_same_store() {
    let dir = TempDir::new().unwrap();
    let first = Session::create(dir.path().join("a.db")).unwrap();
    let second = Session::create(dir.path().join("b.db")).unwrap();
    let options = IngestOptions::default().with_batch_size(1);

    ingest(&first, THREE_OBJECTS.as_bytes(), &options).unwrap();
    ingest(&second, THREE_OBJECTS.as_bytes(), &IngestOptions::default()).unwrap();

    let all = Query::objects().order_by(col("address"));
    assert_eq!(first.query(&all).unwrap(), second.query(&all).unwrap());
    let refs = Query::references().order_by(col("parent")).order_by(col("child"));
    assert_eq!(first.query(&refs).unwrap(), second.query(&refs).unwrap());
}
