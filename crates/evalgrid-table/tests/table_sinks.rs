use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use evalgrid_core::{ErrorInfo, EvalError, EvalResult, ResultRow};
use evalgrid_table::{CsvSink, ResultTable, TableLayout, TableSink};
use serde_json::{json, Value};

#[derive(Default)]
struct Counters {
    rows: AtomicUsize,
    closes: AtomicUsize,
}

struct CountingSink {
    counters: Arc<Counters>,
    fail_on_row: Option<usize>,
}

impl TableSink for CountingSink {
    fn write_row(&mut self, _layout: &TableLayout, _row: &ResultRow) -> EvalResult<()> {
        let seen = self.counters.rows.fetch_add(1, Ordering::SeqCst);
        if Some(seen) == self.fail_on_row {
            return Err(EvalError::Io(ErrorInfo::new("sink_full", "rejected")));
        }
        Ok(())
    }

    fn close(&mut self) -> EvalResult<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn row(pairs: &[(&str, Value)]) -> ResultRow {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn layout() -> TableLayout {
    TableLayout::new(["split", "k", "BuildTime", "TestTime", "rmse"])
}

#[test]
fn missing_columns_become_null() {
    let table = ResultTable::open("global", layout());
    table
        .write(row(&[("split", json!("1")), ("rmse", json!(0.9))]))
        .expect("write");
    let snapshot = table.snapshot();
    assert_eq!(snapshot.len(), 1);
    let written = &snapshot.rows()[0];
    assert_eq!(written.len(), 5);
    assert_eq!(written.get("k"), Some(&Value::Null));
    assert_eq!(snapshot.column("rmse"), Some(vec![&json!(0.9)]));
    assert!(snapshot.column("missing").is_none());
}

#[test]
fn unknown_columns_are_rejected() {
    let table = ResultTable::open("global", layout());
    let err = table.write(row(&[("nope", json!(1))])).unwrap_err();
    assert_eq!(err.info().code, "unknown_column");
    assert!(table.is_empty());
}

#[test]
fn rows_fan_out_to_every_sink_and_close_once() {
    let first = Arc::new(Counters::default());
    let second = Arc::new(Counters::default());
    let table = ResultTable::open("global", layout());
    for counters in [&first, &second] {
        table
            .attach(Box::new(CountingSink {
                counters: Arc::clone(counters),
                fail_on_row: None,
            }))
            .expect("attach");
    }
    table.write(row(&[("k", json!(1))])).expect("write");
    table.write(row(&[("k", json!(2))])).expect("write");
    table.close().expect("close");
    table.close().expect("second close is a no-op");
    for counters in [&first, &second] {
        assert_eq!(counters.rows.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }
    let err = table.write(row(&[("k", json!(3))])).unwrap_err();
    assert_eq!(err.info().code, "table_closed");
}

#[test]
fn sink_failure_is_fatal_for_the_row() {
    let counters = Arc::new(Counters::default());
    let table = ResultTable::open("global", layout());
    table
        .attach(Box::new(CountingSink {
            counters: Arc::clone(&counters),
            fail_on_row: Some(1),
        }))
        .expect("attach");
    table.write(row(&[("k", json!(1))])).expect("first row");
    let err = table.write(row(&[("k", json!(2))])).unwrap_err();
    assert!(matches!(err, EvalError::Io(_)));
    assert_eq!(table.len(), 1);
}

#[test]
fn concurrent_writers_never_lose_rows() {
    let table = ResultTable::open("global", layout());
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for idx in 0..25 {
                    table
                        .write(row(&[("k", json!(worker * 100 + idx))]))
                        .expect("write");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }
    assert_eq!(table.len(), 200);
}

#[test]
fn csv_sink_writes_header_and_cells() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("out/results.csv");
    let table = ResultTable::open("global", layout());
    table
        .attach(Box::new(CsvSink::create(&path, table.layout()).expect("open")))
        .expect("attach");
    table
        .write(row(&[("split", json!("1")), ("k", json!(5)), ("rmse", json!(0.9))]))
        .expect("write");
    table.close().expect("close");
    let contents = std::fs::read_to_string(&path).expect("read");
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines, vec!["split,k,BuildTime,TestTime,rmse", "1,5,,,0.9"]);
}

#[test]
fn gz_extension_selects_gzip() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("results.csv.gz");
    let mut sink = CsvSink::create(&path, &layout()).expect("open");
    sink.write_row(&layout(), &row(&[("split", json!("a"))]))
        .expect("write");
    sink.close().expect("close");
    let file = std::fs::File::open(&path).expect("open gz");
    let mut decoded = String::new();
    flate2::read::GzDecoder::new(file)
        .read_to_string(&mut decoded)
        .expect("decode");
    assert!(decoded.starts_with("split,k,BuildTime,TestTime,rmse\n"));
    assert!(decoded.contains("a,,,,"));
}
