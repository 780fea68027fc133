use candlestick::CandlestickPlot;
use common::plot::Plot;
use latency_stats::LatencyStats;
use pgbench_overview::PgbenchOverview;
use scaling_analysis::ScalingAnalysis;
use serde::{Deserialize, Serialize};
use version_compare::VersionCompare;

/// Every analysis the binary knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlotKind {
    ScalingAnalysis,
    CandlestickPlot,
    LatencyStats,
    VersionCompare,
    PgbenchOverview,
}

impl PlotKind {
    pub const ALL: [PlotKind; 5] = [
        PlotKind::ScalingAnalysis,
        PlotKind::CandlestickPlot,
        PlotKind::LatencyStats,
        PlotKind::VersionCompare,
        PlotKind::PgbenchOverview,
    ];

    /// The analysis with all of its defaults.
    pub fn default_plot(&self) -> Box<dyn Plot> {
        match self {
            PlotKind::ScalingAnalysis => Box::new(ScalingAnalysis::default()),
            PlotKind::CandlestickPlot => Box::new(CandlestickPlot::default()),
            PlotKind::LatencyStats => Box::new(LatencyStats::default()),
            PlotKind::VersionCompare => Box::new(VersionCompare::default()),
            PlotKind::PgbenchOverview => Box::new(PgbenchOverview::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.default_plot().name()
    }

    pub fn description(&self) -> &'static str {
        match self {
            PlotKind::ScalingAnalysis => "Linear regression of latency against connections",
            PlotKind::CandlestickPlot => "Latency quartiles per version and connection count",
            PlotKind::LatencyStats => "Latency panels of a single connection sweep",
            PlotKind::VersionCompare => "Mean TPS per version with change against the baseline",
            PlotKind::PgbenchOverview => "pgbench TPS grid and markdown summary",
        }
    }
}
