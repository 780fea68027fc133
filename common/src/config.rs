use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::plot::Plot;

pub const DEFAULT_COMBINED_CSV: &str = "pgbench_results_combined.csv";
pub const DEFAULT_BASELINE_VERSION: &str = "master";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub plots: Vec<Box<dyn Plot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory of pgbench result files, parsed before any plot runs
    pub results_dir: Option<PathBuf>,
    pub combined_csv: PathBuf,
    pub output_dir: PathBuf,
    pub baseline_version: String,
    pub renderer: Option<RendererConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: None,
            combined_csv: PathBuf::from(DEFAULT_COMBINED_CSV),
            output_dir: PathBuf::from("."),
            baseline_version: DEFAULT_BASELINE_VERSION.to_owned(),
            renderer: None,
        }
    }
}

impl Settings {
    /// Resolves a relative input or output path against `output_dir`.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}

/// External program that turns plot data into images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    pub program: String,
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("plots")
}
