use common::{record::ThroughputRow, table::read_rows};
use listen_notify::output::{Measurement, append_measurements};

#[test]
fn appended_rows_read_back_as_throughput() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("benchmark_results.csv");

    for (version, tps) in [("master", 2000.0), ("patch", 2500.126)] {
        let runs = [0, 10]
            .map(|connections| Measurement {
                connections,
                tps,
                version: version.to_owned(),
            })
            .to_vec();
        append_measurements(&path, &runs).unwrap();
    }

    let rows: Vec<ThroughputRow> = read_rows(&path).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].connections, 0.0);
    assert_eq!(rows[1].connections, 10.0);
    assert_eq!(rows[2].version, "patch");
    assert_eq!(rows[3].tps, 2500.13);
}
