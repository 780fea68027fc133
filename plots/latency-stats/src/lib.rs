use std::{fmt, path::PathBuf};

use common::{
    config::Settings,
    plot::{Plot, emit_plot},
    record::LatencyRow,
    stats::{MIN_REGRESSION_POINTS, Regression, RowFilter, increasing_phase_len},
    table::read_rows,
};
use eyre::{Result, bail};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_INPUT: &str = "stats.csv";
pub const DEFAULT_OUTPUT: &str = "benchmark_results.png";

/// Latency of a single connection sweep, drawn as four panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyStats {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub title: String,
    pub y_label: String,
    pub series: Vec<Series>,
    /// Lower and upper edges of shaded bands
    pub bands: Vec<(Vec<Option<f64>>, Vec<Option<f64>>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsData {
    pub title: String,
    pub x_label: String,
    pub connections: Vec<f64>,
    pub panels: Vec<Panel>,
    /// Connection count of the peak, set when measurements ramp down after it
    pub peak_connections: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub min_connections: f64,
    pub max_connections: f64,
    pub baseline_ms: f64,
    pub peak_ms: f64,
    pub peak_at: f64,
    pub final_ms: f64,
    pub max_increase_pct: Option<f64>,
    pub regression: Option<Regression>,
    pub increasing_points: usize,
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(out, "\nSummary Statistics:")?;
        writeln!(out, "Minimum connections: {}", self.min_connections)?;
        writeln!(out, "Maximum connections: {}", self.max_connections)?;
        writeln!(out, "Baseline latency: {:.2}ms", self.baseline_ms)?;
        writeln!(
            out,
            "Peak latency: {:.2}ms at {} connections",
            self.peak_ms, self.peak_at
        )?;
        writeln!(out, "Final latency: {:.2}ms", self.final_ms)?;
        match self.max_increase_pct {
            Some(pct) => writeln!(out, "Max latency increase: {pct:.1}%")?,
            None => writeln!(out, "Max latency increase: N/A")?,
        }

        match &self.regression {
            Some(fit) => {
                writeln!(out, "\nLinear regression (increasing phase):")?;
                writeln!(out, "  Slope: {:.3} µs per connection", fit.slope_us())?;
                writeln!(out, "  R²: {:.3}", fit.r_squared)?;
            }
            None => writeln!(
                out,
                "\nInsufficient data for regression ({} points in increasing phase)",
                self.increasing_points
            )?,
        }
        Ok(())
    }
}

fn pct_increase(values: &[f64], baseline: f64) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| (baseline != 0.0).then(|| (v - baseline) / baseline * 100.0))
        .collect()
}

impl LatencyStats {
    /// Rows without an average latency cannot be drawn and are dropped.
    fn usable(rows: &[LatencyRow]) -> Vec<(LatencyRow, f64)> {
        let usable = rows
            .iter()
            .filter_map(|r| Some((r.clone(), r.avg_ms?)))
            .collect::<Vec<_>>();
        if usable.len() < rows.len() {
            warn!("Ignoring {} rows without avg_ms", rows.len() - usable.len());
        }
        usable
    }

    pub fn build(&self, rows: &[LatencyRow]) -> Result<(StatsData, StatsSummary)> {
        let rows = Self::usable(rows);
        let Some(&(_, baseline)) = rows.first() else {
            bail!("No rows with an average latency");
        };

        let connections = rows.iter().map(|(r, _)| r.connections).collect::<Vec<_>>();
        let avg = rows.iter().map(|(_, avg)| *avg).collect::<Vec<_>>();
        let stddev = rows.iter().map(|(r, _)| r.stddev_ms).collect::<Vec<_>>();
        let min = rows.iter().map(|(r, _)| r.min_ms).collect::<Vec<_>>();
        let max = rows.iter().map(|(r, _)| r.max_ms).collect::<Vec<_>>();
        let pct = pct_increase(&avg, baseline);
        let avg_opt = avg.iter().copied().map(Some).collect::<Vec<_>>();

        let lower = avg
            .iter()
            .zip(&stddev)
            .map(|(a, s)| s.map(|s| a - s))
            .collect();
        let upper = avg
            .iter()
            .zip(&stddev)
            .map(|(a, s)| s.map(|s| a + s))
            .collect();

        let peak_len = increasing_phase_len(connections.iter().copied());
        let peak_connections = (peak_len < connections.len())
            .then(|| connections.get(peak_len - 1).copied())
            .flatten();

        let panels = vec![
            Panel {
                title: "Average Latency with Standard Deviation".to_owned(),
                y_label: "Latency (ms)".to_owned(),
                series: vec![Series {
                    label: "Average".to_owned(),
                    values: avg_opt.clone(),
                }],
                bands: vec![(lower, upper)],
            },
            Panel {
                title: "Latency Range (Min/Avg/Max)".to_owned(),
                y_label: "Latency (ms)".to_owned(),
                series: vec![
                    Series {
                        label: "Min".to_owned(),
                        values: min.clone(),
                    },
                    Series {
                        label: "Average".to_owned(),
                        values: avg_opt,
                    },
                    Series {
                        label: "Max".to_owned(),
                        values: max.clone(),
                    },
                ],
                bands: vec![(min, max)],
            },
            Panel {
                title: "Latency Variability (Standard Deviation)".to_owned(),
                y_label: "Standard Deviation (ms)".to_owned(),
                series: vec![Series {
                    label: "StdDev".to_owned(),
                    values: stddev,
                }],
                bands: Vec::new(),
            },
            Panel {
                title: format!("Relative Latency Increase (Baseline: {baseline:.2}ms)"),
                y_label: "% Increase from Baseline".to_owned(),
                series: vec![Series {
                    label: "Increase".to_owned(),
                    values: pct.clone(),
                }],
                bands: Vec::new(),
            },
        ];

        let increasing = RowFilter::IncreasingPhase.apply(&rows, |(r, _)| r.connections);
        let (xs, ys): (Vec<f64>, Vec<f64>) =
            increasing.iter().map(|(r, avg)| (r.connections, *avg)).unzip();
        let regression = if xs.len() < MIN_REGRESSION_POINTS {
            None
        } else {
            Regression::fit(&xs, &ys)
        };

        let (min_connections, max_connections) = connections
            .iter()
            .copied()
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or_default();
        // First maximum wins, matching the peak marker
        let (peak_idx, peak_ms) = avg
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 { (i, v) } else { best }
            });

        let summary = StatsSummary {
            min_connections,
            max_connections,
            baseline_ms: baseline,
            peak_ms,
            peak_at: connections[peak_idx],
            final_ms: avg.last().copied().unwrap_or(baseline),
            max_increase_pct: pct.iter().flatten().copied().reduce(f64::max),
            regression,
            increasing_points: xs.len(),
        };

        let data = StatsData {
            title: "PostgreSQL LISTEN/NOTIFY Performance vs Connection Count".to_owned(),
            x_label: "Number of Connections".to_owned(),
            connections,
            panels,
            peak_connections,
        };
        Ok((data, summary))
    }
}

#[typetag::serde]
impl Plot for LatencyStats {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn plot(&self, settings: &Settings) -> Result<()> {
        let rows: Vec<LatencyRow> = read_rows(&settings.output_path(&self.input))?;
        let (data, summary) = self.build(&rows)?;
        emit_plot(settings, &settings.output_path(&self.output), "stats", &data)?;
        print!("{summary}");
        Ok(())
    }
}
