use core::fmt::Debug;
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use dyn_clone::{DynClone, clone_trait_object};
use eyre::{ContextCompat, Result, WrapErr, bail};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{RendererConfig, Settings};

#[typetag::serde(tag = "type")]
pub trait Plot: Debug + DynClone {
    /// Short name used on the command line and in logs
    fn name(&self) -> &'static str;
    /// Runs the analysis, prints its report and writes the plot data
    ///
    /// Arguments:
    /// * `settings` - The settings from config yaml, paths are resolved against
    ///   [`Settings::output_dir`]
    fn plot(&self, settings: &Settings) -> Result<()>;
}
clone_trait_object!(Plot);

const TAB10: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Assigns palette colors to labels in the order they are first seen, so a
/// version keeps its color across every panel of a figure.
#[derive(Debug, Default, Clone)]
pub struct ColorMap {
    labels: Vec<String>,
}

impl ColorMap {
    pub fn color(&mut self, label: &str) -> &'static str {
        let idx = match self.labels.iter().position(|l| l == label) {
            Some(idx) => idx,
            None => {
                self.labels.push(label.to_owned());
                self.labels.len() - 1
            }
        };
        TAB10[idx % TAB10.len()]
    }
}

/// Serializes `data` next to the image as `plot_data/<stem>.json`.
pub fn write_plot_data<T: Serialize>(image: &Path, data: &T) -> Result<PathBuf> {
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid plot filepath {image:?}"))?;
    let plot_data_dir = image
        .parent()
        .map_or_else(|| PathBuf::from("plot_data"), |p| p.join("plot_data"));
    if !plot_data_dir.exists() {
        fs::create_dir_all(&plot_data_dir)?;
    }

    let data_path = plot_data_dir.join(format!("{stem}.json"));
    fs::write(&data_path, serde_json::to_string(data)?)
        .wrap_err_with(|| format!("Write {}", data_path.display()))?;
    debug!("Wrote plot data to {}", data_path.display());
    Ok(data_path)
}

/// Hands the plot data to `<script_dir>/<script>.py`, passing every argument as
/// `--key value`. Without a renderer only the data file is produced.
pub fn render_external(
    renderer: Option<&RendererConfig>,
    script: &str,
    args: &[(String, String)],
) -> Result<()> {
    let Some(renderer) = renderer else {
        debug!("No renderer configured, skipping {script}");
        return Ok(());
    };

    let script_path = renderer.script_dir.join(format!("{script}.py"));
    let mut cmd = Command::new(&renderer.program);
    cmd.arg(&script_path);
    for (key, value) in args {
        cmd.arg(key).arg(value);
    }
    debug!("Running {cmd:?}");

    let output = cmd
        .output()
        .wrap_err_with(|| format!("Spawn {} {}", renderer.program, script_path.display()))?;
    if !output.status.success() {
        bail!(
            "{} failed ({}): {}",
            script_path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Writes the plot data for `image` and renders it when a renderer is set.
pub fn emit_plot<T: Serialize>(
    settings: &Settings,
    image: &Path,
    script: &str,
    data: &T,
) -> Result<()> {
    let data_path = write_plot_data(image, data)?;
    let args = vec![
        ("--data".to_owned(), data_path.display().to_string()),
        ("--filepath".to_owned(), image.display().to_string()),
    ];
    render_external(settings.renderer.as_ref(), script, &args)?;
    info!("Plot saved as {}", image.display());
    Ok(())
}
