use std::{fmt, path::PathBuf};

use common::{
    config::Settings,
    plot::{ColorMap, Plot, emit_plot},
    record::ThroughputRow,
    stats::{GroupSummary, PercentChange, group_by_first_appearance},
    table::read_rows,
    util::{log_scale_position, title_case},
};
use eyre::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_INPUT: &str = "benchmark_results.csv";
pub const DEFAULT_OUTPUT: &str = "plot.png";

/// Mean TPS per connection count for every version, on log-log axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionCompare {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Version the others are compared against, `settings.baseline_version`
    /// when unset
    pub baseline: Option<String>,
}

impl Default for VersionCompare {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            baseline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TpsPoint {
    pub connections: f64,
    /// Position on the log axis
    pub x: f64,
    pub mean_tps: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionSeries {
    pub version: String,
    pub color: &'static str,
    pub points: Vec<TpsPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<VersionSeries>,
    pub tick_positions: Vec<f64>,
    pub tick_labels: Vec<String>,
}

/// TPS statistics of one version at one connection count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TpsCell {
    pub mean: f64,
    /// Sample standard deviation, zero for a single run
    pub std: f64,
}

fn sorted_connections(rows: &[ThroughputRow]) -> Vec<f64> {
    rows.iter()
        .map(|r| r.connections)
        .sorted_by(f64::total_cmp)
        .dedup()
        .collect()
}

fn tps_cell(rows: &[ThroughputRow], version: &str, connections: f64) -> Option<TpsCell> {
    let values = rows
        .iter()
        .filter(|r| r.version == version && r.connections == connections)
        .map(|r| r.tps)
        .collect::<Vec<_>>();
    let summary = GroupSummary::from_values(&values)?;
    Some(TpsCell {
        mean: summary.mean,
        std: summary.sample_stddev.unwrap_or(0.0),
    })
}

impl VersionCompare {
    fn baseline<'a>(&'a self, settings: &'a Settings) -> &'a str {
        self.baseline
            .as_deref()
            .unwrap_or(&settings.baseline_version)
    }

    pub fn build(&self, rows: &[ThroughputRow], colors: &mut ColorMap) -> CompareData {
        let series = group_by_first_appearance(rows.iter().cloned(), |r| r.version.clone())
            .into_iter()
            .map(|(version, version_rows)| {
                let points = sorted_connections(&version_rows)
                    .into_iter()
                    .filter_map(|c| {
                        let cell = tps_cell(&version_rows, &version, c)?;
                        Some(TpsPoint {
                            connections: c,
                            x: log_scale_position(c),
                            mean_tps: cell.mean,
                            label: format!("{:.0}", cell.mean),
                        })
                    })
                    .collect();
                VersionSeries {
                    color: colors.color(&version),
                    version,
                    points,
                }
            })
            .collect();

        let connections = sorted_connections(rows);
        CompareData {
            title: "Database Performance Comparison by Version".to_owned(),
            x_label: "Connections (log scale)".to_owned(),
            y_label: "Transactions per Second (TPS) (log scale)".to_owned(),
            series,
            tick_positions: connections.iter().copied().map(log_scale_position).collect(),
            tick_labels: connections.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Per connection count table with the baseline version listed first.
    pub fn table<'a>(&self, rows: &'a [ThroughputRow], baseline: &'a str) -> CompareTable<'a> {
        CompareTable { rows, baseline }
    }
}

pub struct CompareTable<'a> {
    rows: &'a [ThroughputRow],
    baseline: &'a str,
}

impl fmt::Display for CompareTable<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let &CompareTable { rows, baseline } = self;
        let mut versions = rows.iter().map(|r| r.version.as_str()).unique().collect::<Vec<_>>();
        if let Some(idx) = versions.iter().position(|v| *v == baseline) {
            let base = versions.remove(idx);
            versions.insert(0, base);
        }
        let vs = format!("vs {}", title_case(baseline));

        writeln!(out, "Database Performance Comparison")?;
        writeln!(out, "{}", "=".repeat(80))?;
        writeln!(out)?;

        for connections in sorted_connections(rows) {
            writeln!(out, "Connections: {connections}")?;
            writeln!(out, "{}", "-".repeat(60))?;
            writeln!(out, "{:<25} {:<25} {:<20}", "Version", "TPS (mean ± std)", vs)?;
            writeln!(out, "{}", "-".repeat(70))?;

            let base = tps_cell(rows, baseline, connections);
            for version in &versions {
                let Some(cell) = tps_cell(rows, version, connections) else {
                    continue;
                };
                let tps = format!("{:.2} ± {:.2}", cell.mean, cell.std);
                let change = if *version == baseline {
                    "baseline".to_owned()
                } else {
                    base.and_then(|b| PercentChange::propagate(b.mean, b.std, cell.mean, cell.std))
                        .map_or_else(|| "N/A".to_owned(), |c| c.to_string())
                };
                writeln!(out, "{version:<25} {tps:<25} {change:<20}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

#[typetag::serde]
impl Plot for VersionCompare {
    fn name(&self) -> &'static str {
        "compare"
    }

    fn plot(&self, settings: &Settings) -> Result<()> {
        let rows: Vec<ThroughputRow> = read_rows(&settings.output_path(&self.input))?;
        let mut colors = ColorMap::default();
        let data = self.build(&rows, &mut colors);
        debug!("Comparing {} versions", data.series.len());
        emit_plot(settings, &settings.output_path(&self.output), "compare", &data)?;

        println!("\n{}\n", "=".repeat(80));
        print!("{}", self.table(&rows, self.baseline(settings)));
        Ok(())
    }
}
