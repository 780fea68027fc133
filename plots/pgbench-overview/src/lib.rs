mod markdown;

use std::{
    fs,
    path::{Path, PathBuf},
};

use common::{
    config::Settings,
    error::InputError,
    plot::{ColorMap, Plot, emit_plot},
    record::RawResultRecord,
    table::{read_headers, read_rows},
};
use eyre::{Result, WrapErr};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use markdown::render_markdown;

pub const DEFAULT_MARKDOWN: &str = "performance_overview-v4.md";
pub const DEFAULT_FIXED_CONNECTIONS: u64 = 1000;

/// Columns the combined table must carry. `threshold` is optional, older
/// result files do not encode it.
pub const EXPECTED_COLUMNS: [&str; 15] = [
    "test_type",
    "clients",
    "jobs",
    "version",
    "run_number",
    "scaling_factor",
    "num_clients",
    "num_threads",
    "duration",
    "transactions_processed",
    "failed_transactions",
    "latency_avg",
    "initial_connection_time",
    "tps",
    "transaction_type",
];

const Y_AXIS_PADDING_MIN: f64 = 0.8;
const Y_AXIS_PADDING_MAX: f64 = 1.2;

fn default_layout() -> Vec<Vec<String>> {
    [
        ["listen_unique", "listen_unlisten_unique", "listen_notify_unique"],
        ["listen_common", "listen_unlisten_common", "listen_notify_common"],
    ]
    .iter()
    .map(|row| row.iter().map(|s| (*s).to_owned()).collect())
    .collect()
}

/// TPS overview of the combined pgbench table: a grid of panels per test
/// type and a markdown summary against the baseline version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PgbenchOverview {
    /// Combined CSV, `settings.combined_csv` when unset
    pub input: Option<PathBuf>,
    pub markdown: PathBuf,
    pub fixed_connections: u64,
    /// Directory searched for `<test_type>.sql`
    pub sql_dir: PathBuf,
    pub layout: Vec<Vec<String>>,
    pub baseline: Option<String>,
}

impl Default for PgbenchOverview {
    fn default() -> Self {
        Self {
            input: None,
            markdown: PathBuf::from(DEFAULT_MARKDOWN),
            fixed_connections: DEFAULT_FIXED_CONNECTIONS,
            sql_dir: PathBuf::from("."),
            layout: default_layout(),
            baseline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    /// Runs where every client has its own job, plotted over clients
    ConnectionsEqualJobs,
    /// Runs with a fixed client count, plotted over jobs
    FixedConnections(u64),
}

impl Category {
    pub fn all(fixed_connections: u64) -> [Category; 2] {
        [
            Category::ConnectionsEqualJobs,
            Category::FixedConnections(fixed_connections),
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            Category::ConnectionsEqualJobs => "connections_equal_jobs",
            Category::FixedConnections(_) => "fixed_connections",
        }
    }

    pub fn heading(&self) -> String {
        match self {
            Category::ConnectionsEqualJobs => "Connections = Jobs".to_owned(),
            Category::FixedConnections(c) => format!("Connections = {c}"),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Category::ConnectionsEqualJobs => {
                "pgbench -f $script -c $jobs -j $jobs -T 3 -n".to_owned()
            }
            Category::FixedConnections(c) => format!("pgbench -f $script -c {c} -j $jobs -T 3 -n"),
        }
    }

    pub fn filename(&self) -> String {
        format!("performance_overview_{}-v4.png", self.key())
    }

    /// The x value of a run, `None` when the run is not part of the category.
    pub fn x(&self, record: &RawResultRecord) -> Option<u64> {
        let (clients, jobs) = (record.clients?, record.jobs?);
        match *self {
            Category::ConnectionsEqualJobs => (clients == jobs).then_some(clients),
            Category::FixedConnections(c) => (clients == c).then_some(jobs),
        }
    }
}

/// One measured run that belongs to a category.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub test_type: String,
    pub version: String,
    pub threshold: Option<u64>,
    pub x: u64,
    pub tps: f64,
}

pub fn category_points(records: &[RawResultRecord], category: Category) -> Vec<Point> {
    records
        .iter()
        .filter_map(|r| {
            Some(Point {
                x: category.x(r)?,
                tps: r.tps?,
                test_type: r.test_type.clone(),
                version: r.version.clone(),
                threshold: r.threshold,
            })
        })
        .collect()
}

pub fn combo_label(version: &str, threshold: Option<u64>, baseline: &str) -> String {
    match threshold {
        Some(t) if version != baseline => format!("{version} (t={t})"),
        _ => version.to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComboSeries {
    pub version: String,
    pub threshold: Option<u64>,
    pub label: String,
    pub color: &'static str,
    /// Every run, drawn as scatter points
    pub points: Vec<(u64, f64)>,
    /// Best run per x value, joined by a line
    pub max_line: Vec<(u64, f64)>,
    /// The baseline line is drawn wider
    pub prominent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    pub test_type: String,
    pub row: usize,
    pub col: usize,
    pub title: String,
    pub x_ticks: Vec<u64>,
    pub combos: Vec<ComboSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewData {
    pub category: Category,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub grid: (usize, usize),
    pub y_bounds: Option<(f64, f64)>,
    pub panels: Vec<Panel>,
}

/// Global TPS bounds over the test types in the layout, padded for a log axis.
pub fn tps_bounds(points: &[Point], layout: &[Vec<String>]) -> Option<(f64, f64)> {
    let (min, max) = points
        .iter()
        .filter(|p| layout.iter().flatten().any(|t| *t == p.test_type))
        .map(|p| p.tps)
        .minmax_by(f64::total_cmp)
        .into_option()?;
    Some((min * Y_AXIS_PADDING_MIN, max * Y_AXIS_PADDING_MAX))
}

impl PgbenchOverview {
    fn baseline<'a>(&'a self, settings: &'a Settings) -> &'a str {
        self.baseline
            .as_deref()
            .unwrap_or(&settings.baseline_version)
    }

    fn input_path(&self, settings: &Settings) -> PathBuf {
        settings.output_path(self.input.as_deref().unwrap_or(&settings.combined_csv))
    }

    /// Fails with [`InputError::MissingColumns`] when a required column is absent.
    pub fn validate(path: &Path) -> Result<()> {
        let headers = read_headers(path)?;
        let missing = EXPECTED_COLUMNS
            .iter()
            .filter(|c| !headers.iter().any(|h| h == *c))
            .map(|c| (*c).to_owned())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(InputError::MissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            }
            .into());
        }
        Ok(())
    }

    pub fn build(
        &self,
        records: &[RawResultRecord],
        category: Category,
        baseline: &str,
    ) -> Option<OverviewData> {
        let points = category_points(records, category);
        if points.is_empty() {
            return None;
        }
        let mut colors = ColorMap::default();

        let panels = self
            .layout
            .iter()
            .enumerate()
            .flat_map(|(row, types)| types.iter().enumerate().map(move |(col, t)| (row, col, t)))
            .filter_map(|(row, col, test_type)| {
                let test_points = points
                    .iter()
                    .filter(|p| p.test_type == *test_type)
                    .collect::<Vec<_>>();
                if test_points.is_empty() {
                    return None;
                }

                let combos = test_points
                    .iter()
                    .map(|p| (p.version.clone(), p.threshold))
                    .sorted()
                    .dedup()
                    .map(|(version, threshold)| {
                        let runs = test_points
                            .iter()
                            .filter(|p| p.version == version && p.threshold == threshold)
                            .map(|p| (p.x, p.tps))
                            .sorted_by(|a, b| a.0.cmp(&b.0))
                            .collect::<Vec<_>>();
                        let max_line = runs
                            .iter()
                            .chunk_by(|(x, _)| *x)
                            .into_iter()
                            .map(|(x, group)| {
                                let best = group.map(|(_, tps)| *tps).fold(f64::MIN, f64::max);
                                (x, best)
                            })
                            .collect();
                        let label = combo_label(&version, threshold, baseline);
                        ComboSeries {
                            color: colors.color(&label),
                            prominent: version == baseline,
                            label,
                            version,
                            threshold,
                            points: runs,
                            max_line,
                        }
                    })
                    .collect();

                Some(Panel {
                    test_type: test_type.clone(),
                    row,
                    col,
                    title: format!("$script = {test_type}.sql"),
                    x_ticks: test_points.iter().map(|p| p.x).sorted().dedup().collect(),
                    combos,
                })
            })
            .collect::<Vec<_>>();

        Some(OverviewData {
            category,
            title: category.title(),
            x_label: "$jobs".to_owned(),
            y_label: "TPS".to_owned(),
            grid: (
                self.layout.len(),
                self.layout.iter().map(Vec::len).max().unwrap_or(0),
            ),
            y_bounds: tps_bounds(&points, &self.layout),
            panels,
        })
    }
}

#[typetag::serde]
impl Plot for PgbenchOverview {
    fn name(&self) -> &'static str {
        "overview"
    }

    fn plot(&self, settings: &Settings) -> Result<()> {
        let input = self.input_path(settings);
        Self::validate(&input)?;
        let records: Vec<RawResultRecord> = read_rows(&input)?;
        let baseline = self.baseline(settings);

        info!(
            "Loaded {} rows, test types {:?}, versions {:?}",
            records.len(),
            records.iter().map(|r| r.test_type.as_str()).unique().collect::<Vec<_>>(),
            records.iter().map(|r| r.version.as_str()).unique().collect::<Vec<_>>()
        );

        for category in Category::all(self.fixed_connections) {
            println!("\nCreating performance overview for {}...", category.title());
            let Some(data) = self.build(&records, category, baseline) else {
                println!("No data found for plot type: {}", category.key());
                continue;
            };
            debug!("{}: {} panels", category.key(), data.panels.len());
            emit_plot(
                settings,
                &settings.output_path(Path::new(&category.filename())),
                "overview",
                &data,
            )?;
        }

        let markdown = render_markdown(
            &records,
            self.fixed_connections,
            &settings.output_path(&self.sql_dir),
            baseline,
        );
        let markdown_path = settings.output_path(&self.markdown);
        fs::write(&markdown_path, markdown)
            .wrap_err_with(|| format!("Write {}", markdown_path.display()))?;
        println!("Markdown results summary saved to: {}", markdown_path.display());
        Ok(())
    }
}
