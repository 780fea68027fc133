use std::{fmt, path::PathBuf};

use common::{
    config::Settings,
    plot::{ColorMap, Plot, emit_plot},
    record::LatencyRow,
    stats::{MIN_REGRESSION_POINTS, Regression, RowFilter, group_by_first_appearance},
    table::read_rows,
    util::shorten_label,
};
use eyre::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_INPUT: &str = "benchmark_results.csv";
pub const DEFAULT_OUTPUT: &str = "candlestick_comparison.png";

/// Latency distribution per connection count, one box per version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandlestickPlot {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Connection range the median regression is fitted on
    pub regression_range: (f64, f64),
    /// Horizontal space shared by the candles of one connection count
    pub candle_width: f64,
}

impl Default for CandlestickPlot {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            regression_range: (100.0, 1000.0),
            candle_width: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub connections: f64,
    pub x: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionLine {
    #[serde(flatten)]
    pub fit: Regression,
    pub slope_us: f64,
    /// End points spanning the plotted connection range
    pub line: [(f64, f64); 2],
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionCandles {
    pub version: String,
    pub color: &'static str,
    pub box_width: f64,
    pub candles: Vec<Candle>,
    pub regression: Option<RegressionLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandlestickData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub legend_title: String,
    pub note: String,
    pub versions: Vec<VersionCandles>,
}

impl CandlestickPlot {
    fn range_label(&self) -> String {
        format!(
            "{}-{} connections",
            self.regression_range.0, self.regression_range.1
        )
    }

    pub fn build(&self, rows: &[LatencyRow], colors: &mut ColorMap) -> CandlestickData {
        let groups = group_by_first_appearance(rows.iter().cloned(), |r| r.version.clone());
        let n = groups.len().max(1) as f64;
        let box_width = self.candle_width * 0.6 / n;
        let (low, high) = self.regression_range;

        let versions = groups
            .into_iter()
            .enumerate()
            .map(|(idx, (version, rows))| {
                let increasing = RowFilter::IncreasingPhase.apply(&rows, |r| r.connections);
                let offset = (idx as f64 - n / 2.0) * box_width;

                let candles = increasing
                    .iter()
                    .filter_map(|r| {
                        Some(Candle {
                            connections: r.connections,
                            x: r.connections + offset,
                            min: r.min_ms?,
                            q1: r.q1_ms?,
                            median: r.median_ms?,
                            q3: r.q3_ms?,
                            max: r.max_ms?,
                        })
                    })
                    .collect::<Vec<_>>();
                if candles.len() < increasing.len() {
                    debug!(
                        "{version}: {} rows without full quartiles",
                        increasing.len() - candles.len()
                    );
                }

                let (xs, ys): (Vec<f64>, Vec<f64>) = candles
                    .iter()
                    .filter(|c| (low..=high).contains(&c.connections))
                    .map(|c| (c.connections, c.median))
                    .unzip();
                let regression = if xs.len() < MIN_REGRESSION_POINTS {
                    warn!("Skipping regression for {version}: {} points in range", xs.len());
                    None
                } else {
                    Regression::fit(&xs, &ys).map(|fit| {
                        let (x0, x1) = candles
                            .iter()
                            .map(|c| c.connections)
                            .minmax()
                            .into_option()
                            .unwrap_or((low, high));
                        RegressionLine {
                            slope_us: fit.slope_us(),
                            line: [(x0, fit.predict(x0)), (x1, fit.predict(x1))],
                            label: format!(
                                "median = {:.3} + {:.3}×10⁻³ × connections (R²={:.3})",
                                fit.intercept,
                                fit.slope_us(),
                                fit.r_squared
                            ),
                            fit,
                        }
                    })
                };

                VersionCandles {
                    color: colors.color(&version),
                    version,
                    box_width,
                    candles,
                    regression,
                }
            })
            .collect();

        CandlestickData {
            title: "PostgreSQL LISTEN/NOTIFY Latency Distribution by Version".to_owned(),
            x_label: "Number of Connections".to_owned(),
            y_label: "Latency (ms)".to_owned(),
            legend_title: format!(
                "PostgreSQL Version and Linear Regression Formula ({})",
                self.range_label()
            ),
            note: format!(
                "Box: Q1-Q3, Black line: Median, Whiskers: Min-Max\nRegression computed from {} only",
                self.range_label()
            ),
            versions,
        }
    }

    /// Regression table, flattest slope first.
    pub fn summary<'a>(&self, data: &'a CandlestickData) -> RegressionSummary<'a> {
        RegressionSummary {
            range: self.range_label(),
            data,
        }
    }
}

pub struct RegressionSummary<'a> {
    range: String,
    data: &'a CandlestickData,
}

impl fmt::Display for RegressionSummary<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data;
        writeln!(out, "\nLinear Regression Summary ({}):", self.range)?;
        writeln!(out, "{}", "-".repeat(100))?;
        writeln!(
            out,
            "{:<50} {:<15} {:<15} {:<10}",
            "Version", "Slope (μs/conn)", "Intercept (ms)", "R²"
        )?;
        writeln!(out, "{}", "-".repeat(100))?;

        let sorted = data
            .versions
            .iter()
            .filter_map(|v| Some((v, v.regression.as_ref()?)))
            .sorted_by(|(_, a), (_, b)| a.slope_us.total_cmp(&b.slope_us));
        for (version, reg) in sorted {
            writeln!(
                out,
                "{:<50} {:>14.3} {:>14.3} {:>9.3}",
                shorten_label(&version.version, " on ", 50),
                reg.slope_us,
                reg.fit.intercept,
                reg.fit.r_squared
            )?;
        }
        for version in data.versions.iter().filter(|v| v.regression.is_none()) {
            writeln!(out, "{:<50} insufficient data", version.version)?;
        }

        writeln!(out, "\n{}", "-".repeat(100))?;
        writeln!(
            out,
            "Note: Lower slope values indicate better performance scaling with connection count."
        )?;
        Ok(())
    }
}

#[typetag::serde]
impl Plot for CandlestickPlot {
    fn name(&self) -> &'static str {
        "candlestick"
    }

    fn plot(&self, settings: &Settings) -> Result<()> {
        let rows: Vec<LatencyRow> = read_rows(&settings.output_path(&self.input))?;
        let mut colors = ColorMap::default();
        let data = self.build(&rows, &mut colors);

        emit_plot(
            settings,
            &settings.output_path(&self.output),
            "candlestick",
            &data,
        )?;
        print!("{}", self.summary(&data));
        Ok(())
    }
}
