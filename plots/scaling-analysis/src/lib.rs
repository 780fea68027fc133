use std::{fmt, path::PathBuf};

use common::{
    config::Settings,
    plot::Plot,
    record::{LatencyMetric, LatencyRow},
    stats::{
        Complexity, DEFAULT_CONSTANT_SLOPE_THRESHOLD_US, MIN_REGRESSION_POINTS, Regression,
        RowFilter, group_by_first_appearance, mean, population_stddev,
    },
    table::read_rows,
    util::shorten_label,
};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_INPUT: &str = "benchmark_results.csv";
const VERSION_WIDTH: usize = 35;

/// Linear regression of latency against connection count, per version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingAnalysis {
    pub input: PathBuf,
    pub filter: RowFilter,
    pub metric: LatencyMetric,
    /// Label each version as constant or linear time
    pub classify: bool,
    pub constant_slope_threshold_us: f64,
}

impl Default for ScalingAnalysis {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            filter: RowFilter::All,
            metric: LatencyMetric::Median,
            classify: false,
            constant_slope_threshold_us: DEFAULT_CONSTANT_SLOPE_THRESHOLD_US,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionScaling {
    pub version: String,
    pub regression: Regression,
    pub mean: f64,
    pub stddev: f64,
    pub cv: Option<f64>,
    pub complexity: Option<Complexity>,
}

impl VersionScaling {
    pub fn slope_us(&self) -> f64 {
        self.regression.slope_us()
    }

    /// The regression formula, or the mean for constant time versions.
    pub fn formula(&self) -> String {
        match self.complexity {
            Some(Complexity::Constant) => format!("{:.3} ms (O(1))", self.mean),
            Some(Complexity::Linear) => format!("{} (O(N))", self.regression.formula()),
            None => self.regression.formula(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ScalingEntry {
    Analyzed(VersionScaling),
    Insufficient { version: String, points: usize },
    /// Every point shares the same connection count
    Degenerate { version: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingReport {
    pub filter: RowFilter,
    pub entries: Vec<ScalingEntry>,
}

impl ScalingReport {
    pub fn analyzed(&self) -> impl Iterator<Item = &VersionScaling> {
        self.entries.iter().filter_map(|e| match e {
            ScalingEntry::Analyzed(v) => Some(v),
            _ => None,
        })
    }

}

impl fmt::Display for ScalingReport {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            out,
            "PostgreSQL LISTEN/NOTIFY Scaling Analysis ({})",
            self.filter.describe()
        )?;
        writeln!(out, "{}", "=".repeat(80))?;
        writeln!(out)?;

        for entry in &self.entries {
            match entry {
                ScalingEntry::Insufficient { version, points } => {
                    writeln!(out, "Insufficient data for {version} ({points} points)")?;
                }
                ScalingEntry::Degenerate { version } => {
                    writeln!(out, "No spread in connections for {version}")?;
                }
                ScalingEntry::Analyzed(v) => {
                    writeln!(out, "Version: {}", v.version)?;
                    writeln!(out, "  Linear regression: {}", v.regression.formula())?;
                    writeln!(out, "  Mean latency: {:.3} ms ± {:.3} ms", v.mean, v.stddev)?;
                    match v.cv {
                        Some(cv) => writeln!(out, "  Coefficient of variation: {:.1}%", cv * 100.0)?,
                        None => writeln!(out, "  Coefficient of variation: N/A")?,
                    }
                    writeln!(out, "  R² value: {:.4}", v.regression.r_squared)?;
                    writeln!(out, "  Slope: {:.3} μs/connection", v.slope_us())?;
                    writeln!(out, "  Intercept: {:.3} ms", v.regression.intercept)?;
                    if let Some(complexity) = v.complexity {
                        writeln!(out, "  Complexity: {complexity}")?;
                    }
                    writeln!(out, "  Data points: {}", v.regression.points)?;
                    writeln!(out)?;
                }
            }
        }

        writeln!(out, "\nSummary Table")?;
        writeln!(out, "{}", "-".repeat(100))?;
        writeln!(
            out,
            "{:<35} {:<18} {:<15} {:<10} Formula",
            "Version", "Slope (μs/conn)", "Intercept (ms)", "R²"
        )?;
        writeln!(out, "{}", "-".repeat(100))?;
        for v in self.analyzed() {
            writeln!(
                out,
                "{:<35} {:>14.3}     {:>11.3}     {:>6.4}     {}",
                shorten_label(&v.version, "(", VERSION_WIDTH),
                v.slope_us(),
                v.regression.intercept,
                v.regression.r_squared,
                v.formula()
            )?;
        }
        writeln!(out, "{}", "-".repeat(100))?;
        Ok(())
    }
}

impl ScalingAnalysis {
    pub fn analyze(&self, rows: &[LatencyRow]) -> ScalingReport {
        let groups = group_by_first_appearance(rows.iter().cloned(), |r| r.version.clone());

        let entries = groups
            .into_iter()
            .map(|(version, rows)| self.analyze_version(version, &rows))
            .collect();

        ScalingReport {
            filter: self.filter,
            entries,
        }
    }

    fn analyze_version(&self, version: String, rows: &[LatencyRow]) -> ScalingEntry {
        let (xs, ys): (Vec<f64>, Vec<f64>) = self
            .filter
            .apply(rows, |r| r.connections)
            .iter()
            .filter_map(|r| Some((r.connections, self.metric.value(r)?)))
            .unzip();

        if xs.len() < MIN_REGRESSION_POINTS {
            warn!("Skipping {version}: only {} data points", xs.len());
            return ScalingEntry::Insufficient {
                version,
                points: xs.len(),
            };
        }
        let Some(regression) = Regression::fit(&xs, &ys) else {
            return ScalingEntry::Degenerate { version };
        };

        let (Some(mean), Some(stddev)) = (mean(&ys), population_stddev(&ys)) else {
            return ScalingEntry::Insufficient { version, points: 0 };
        };
        let complexity = self
            .classify
            .then(|| Complexity::classify(regression.slope_us(), self.constant_slope_threshold_us));
        debug!("{version}: slope {:.3} us/conn", regression.slope_us());

        ScalingEntry::Analyzed(VersionScaling {
            version,
            regression,
            mean,
            stddev,
            cv: (mean != 0.0).then(|| stddev / mean),
            complexity,
        })
    }
}

#[typetag::serde]
impl Plot for ScalingAnalysis {
    fn name(&self) -> &'static str {
        "scaling"
    }

    fn plot(&self, settings: &Settings) -> Result<()> {
        let rows: Vec<LatencyRow> = read_rows(&settings.output_path(&self.input))?;
        let report = self.analyze(&rows);
        print!("{report}");
        Ok(())
    }
}
