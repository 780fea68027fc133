use std::fs;

use common::{
    record::RawResultRecord,
    table::{Cell, read_headers, read_rows},
};
use pgbench::{discover, parse_corpus, run};

const OUTPUT: &str = "\
transaction type: listen.sql
scaling factor: 1
number of clients: 10
number of threads: 2
duration: 60 s
number of transactions actually processed: 6000
number of failed transactions: 0 (0.000%)
latency average = 2.500 ms
initial connection time = 3.25 ms
tps = 100.000000 (without initial connection time)
";

#[test]
fn combines_results_directory() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results");
    fs::create_dir(&results).unwrap();
    fs::write(results.join("listen_unique-c-10-j-2-master-1.txt"), OUTPUT).unwrap();
    fs::write(
        results.join("listen_unique-c-10-j-2-t-100-patch-2.txt"),
        "tps = 120.5 (without initial connection time)\n",
    )
    .unwrap();
    fs::write(results.join("notes.md"), "ignored").unwrap();

    let combined = dir.path().join("combined.csv");
    let table = run(&results, &combined, false).unwrap();
    assert_eq!(table.len(), 2);
    assert!(table.columns().windows(2).all(|w| w[0] < w[1]));
    assert!(table.columns().iter().any(|c| c == "transaction_type"));
    assert_eq!(table.cell(1, "transaction_type"), Some(&Cell::Null));

    let per_file = results.join("listen_unique-c-10-j-2-master-1.csv");
    let headers = read_headers(&per_file).unwrap();
    assert_eq!(headers.first().map(String::as_str), Some("test_type"));
    assert_eq!(headers.last().map(String::as_str), Some("transaction_type"));

    let rows: Vec<RawResultRecord> = read_rows(&combined).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].version, "master");
    assert_eq!(rows[0].tps, Some(100.0));
    assert_eq!(rows[0].latency_avg, Some(2.5));
    assert_eq!(rows[1].version, "patch");
    assert_eq!(rows[1].threshold, Some(100));
    assert_eq!(rows[1].latency_avg, None);
}

#[test]
fn unreadable_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a-c-1-j-1-master-1.txt"), OUTPUT).unwrap();
    fs::write(dir.path().join("b-c-1-j-1-master-1.txt"), [0xff, 0xfe, 0x00]).unwrap();

    let files = discover(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let corpus = parse_corpus(&files, false).unwrap();
    assert_eq!(corpus.records().len(), 1);
    assert_eq!(corpus.skipped, vec![dir.path().join("b-c-1-j-1-master-1.txt")]);
}

#[test]
fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = discover(dir.path()).unwrap_err();
    assert!(err.to_string().contains("No .txt files found"));
    assert!(discover(&dir.path().join("missing")).is_err());
}

#[test]
fn files_with_malformed_numbers_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a-c-1-j-1-master-1.txt"), OUTPUT).unwrap();
    fs::write(
        dir.path().join("a-c-1-j-1-master-2.txt"),
        "latency average = 1.2.3 ms\ntps = 10.0 (without initial connection time)\n",
    )
    .unwrap();

    let files = discover(dir.path()).unwrap();
    let corpus = parse_corpus(&files, false).unwrap();
    assert_eq!(corpus.records().len(), 1);
    assert_eq!(corpus.records()[0].run_number, Some(1));
    assert_eq!(corpus.skipped, vec![dir.path().join("a-c-1-j-1-master-2.txt")]);
}
