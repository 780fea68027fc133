use std::{fs, path::Path};

use common::config::{Config, Settings};
use eyre::{Context, Result};
use tracing::info;

pub fn load_config(path: &Path) -> Result<Config> {
    let yaml = fs::read_to_string(path).wrap_err_with(|| format!("Read {}", path.display()))?;
    serde_yml::from_str(&yaml).wrap_err_with(|| format!("Parse {}", path.display()))
}

/// Parses the results directory, if one is configured, then runs every plot
/// in order.
pub fn run_config(config: &Config, progress: bool) -> Result<()> {
    info!("Running {}", config.name);
    let settings = &config.settings;
    if !settings.output_dir.exists() {
        fs::create_dir_all(&settings.output_dir)?;
    }

    if let Some(results_dir) = &settings.results_dir {
        parse_results(settings, results_dir, progress)?;
    }

    for plot in &config.plots {
        info!("Running {}", plot.name());
        plot.plot(settings)
            .wrap_err_with(|| format!("Plot {}", plot.name()))?;
    }
    Ok(())
}

pub fn parse_results(settings: &Settings, results_dir: &Path, progress: bool) -> Result<()> {
    let combined = settings.output_path(&settings.combined_csv);
    let table = pgbench::run(results_dir, &combined, progress)?;
    println!(
        "Combined CSV saved to {} ({} rows, {} columns)",
        combined.display(),
        table.len(),
        table.columns().len()
    );
    Ok(())
}
