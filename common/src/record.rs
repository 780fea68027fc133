use serde::{Deserialize, Serialize};

use crate::table::{Cell, lenient_int};

pub const UNKNOWN_VERSION: &str = "unknown";

/// One pgbench run: parameters decoded from the file name plus the metrics
/// found in the file body. Metrics missing from the body stay `None`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResultRecord {
    pub test_type: String,
    #[serde(deserialize_with = "lenient_int")]
    pub clients: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub jobs: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub threshold: Option<u64>,
    pub version: String,
    #[serde(deserialize_with = "lenient_int")]
    pub run_number: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub scaling_factor: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub num_clients: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub num_threads: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub duration: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub transactions_processed: Option<u64>,
    #[serde(deserialize_with = "lenient_int")]
    pub failed_transactions: Option<u64>,
    pub latency_avg: Option<f64>,
    pub initial_connection_time: Option<f64>,
    pub tps: Option<f64>,
    pub transaction_type: Option<String>,
}

impl RawResultRecord {
    /// Field names and values in declaration order. `transaction_type` is only
    /// present when the source text contained it.
    pub fn fields(&self) -> Vec<(&'static str, Cell)> {
        let mut fields = vec![
            ("test_type", Cell::from(self.test_type.as_str())),
            ("clients", self.clients.into()),
            ("jobs", self.jobs.into()),
            ("threshold", self.threshold.into()),
            ("version", Cell::from(self.version.as_str())),
            ("run_number", self.run_number.into()),
            ("scaling_factor", self.scaling_factor.into()),
            ("num_clients", self.num_clients.into()),
            ("num_threads", self.num_threads.into()),
            ("duration", self.duration.into()),
            ("transactions_processed", self.transactions_processed.into()),
            ("failed_transactions", self.failed_transactions.into()),
            ("latency_avg", self.latency_avg.into()),
            ("initial_connection_time", self.initial_connection_time.into()),
            ("tps", self.tps.into()),
        ];
        if let Some(transaction_type) = &self.transaction_type {
            fields.push(("transaction_type", Cell::from(transaction_type.as_str())));
        }
        fields
    }
}

/// Latency statistics of one measurement point of a connection sweep.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRow {
    pub connections: f64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub avg_ms: Option<f64>,
    #[serde(default)]
    pub stddev_ms: Option<f64>,
    #[serde(default)]
    pub min_ms: Option<f64>,
    #[serde(default)]
    pub q1_ms: Option<f64>,
    #[serde(default)]
    pub median_ms: Option<f64>,
    #[serde(default)]
    pub q3_ms: Option<f64>,
    #[serde(default)]
    pub max_ms: Option<f64>,
}

/// Throughput of one LISTEN/NOTIFY ping-pong measurement.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputRow {
    pub connections: f64,
    pub tps: f64,
    pub version: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatencyMetric {
    #[default]
    Median,
    Average,
}

impl LatencyMetric {
    pub fn value(&self, row: &LatencyRow) -> Option<f64> {
        match self {
            LatencyMetric::Median => row.median_ms,
            LatencyMetric::Average => row.avg_ms,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            LatencyMetric::Median => "median_ms",
            LatencyMetric::Average => "avg_ms",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LatencyMetric::Median => "median",
            LatencyMetric::Average => "average",
        }
    }
}
