use std::{fs::OpenOptions, path::Path};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

pub const HEADER: [&str; 3] = ["connections", "tps", "version"];

/// Round trips per second with a given number of idle listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub connections: usize,
    pub tps: f64,
    pub version: String,
}

impl Measurement {
    fn record(&self) -> [String; 3] {
        [
            self.connections.to_string(),
            format!("{:.2}", self.tps),
            self.version.clone(),
        ]
    }
}

/// Appends measurements to `path`, writing the header only when the file is
/// new or empty.
pub fn append_measurements(path: &Path, measurements: &[Measurement]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }

    let needs_header = !std::fs::metadata(path).is_ok_and(|m| m.len() > 0);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Open {}", path.display()))?;

    let mut writer = csv::Writer::from_writer(file);
    if needs_header {
        writer.write_record(HEADER)?;
    }
    for measurement in measurements {
        writer.write_record(measurement.record())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn measurement(connections: usize, tps: f64) -> Measurement {
        Measurement {
            connections,
            tps,
            version: "PostgreSQL 18devel on x86_64-pc-linux-gnu".to_owned(),
        }
    }

    #[test]
    fn header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("benchmark_results.csv");

        append_measurements(&path, &[measurement(0, 1234.5678)]).unwrap();
        append_measurements(&path, &[measurement(10, 999.0), measurement(100, 0.004)]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "connections,tps,version",
                "0,1234.57,PostgreSQL 18devel on x86_64-pc-linux-gnu",
                "10,999.00,PostgreSQL 18devel on x86_64-pc-linux-gnu",
                "100,0.00,PostgreSQL 18devel on x86_64-pc-linux-gnu",
            ]
        );
    }

    #[test]
    fn empty_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();

        append_measurements(&path, &[measurement(1000, 50.0)]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("connections,tps,version\n1000,50.00,"));
    }

    #[test]
    fn versions_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let row = Measurement {
            connections: 10,
            tps: 1.0,
            version: "PostgreSQL 17.2, compiled by gcc".to_owned(),
        };
        append_measurements(&path, &[row]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("10,1.00,\"PostgreSQL 17.2, compiled by gcc\""));
    }
}
