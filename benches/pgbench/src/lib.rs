
use std::{
    fs,
    path::{Path, PathBuf},
};

use common::{
    record::RawResultRecord,
    table::{CombinedTable, write_fields_csv},
    util::plural,
};
use eyre::{Context, ContextCompat, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};
use walkdir::WalkDir;

pub use common::config::DEFAULT_COMBINED_CSV;
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Lists the `*.txt` files directly inside `dir`, sorted by path.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Results directory {} not found", dir.display());
    }

    let files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect::<Vec<_>>();

    if files.is_empty() {
        bail!("No .txt files found in {}", dir.display());
    }
    debug!("Found {} in {}", plural(files.len(), "result file"), dir.display());
    Ok(files)
}

pub fn parse_file(path: &Path) -> Result<RawResultRecord> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid result file name {path:?}"))?;
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("Read {}", path.display()))?;
    result::parse_result(stem, &content).wrap_err_with(|| format!("Parse {}", path.display()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub record: RawResultRecord,
}

/// Records parsed from a results directory, in discovery order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Corpus {
    pub files: Vec<ParsedFile>,
    pub skipped: Vec<PathBuf>,
}

impl Corpus {
    pub fn records(&self) -> Vec<RawResultRecord> {
        self.files.iter().map(|f| f.record.clone()).collect()
    }

    pub fn table(&self) -> CombinedTable {
        CombinedTable::from_rows(self.files.iter().map(|f| f.record.fields()))
    }
}

fn progress_bar(len: usize, show: bool) -> Result<ProgressBar> {
    if !show {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    Ok(bar)
}

/// Parses every file, skipping the ones that fail. It is an error only when
/// nothing could be parsed.
pub fn parse_corpus(paths: &[PathBuf], progress: bool) -> Result<Corpus> {
    let bar = progress_bar(paths.len(), progress)?;
    let mut corpus = Corpus::default();

    for path in paths {
        bar.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        match parse_file(path) {
            Ok(record) => corpus.files.push(ParsedFile {
                path: path.clone(),
                record,
            }),
            Err(err) => {
                error!("Skipping {}: {err:#}", path.display());
                corpus.skipped.push(path.clone());
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if corpus.files.is_empty() {
        bail!("No result files could be parsed");
    }
    Ok(corpus)
}

/// Writes `<file>.csv` beside every parsed file and the combined table to
/// `combined`.
pub fn write_outputs(corpus: &Corpus, combined: &Path) -> Result<CombinedTable> {
    for file in &corpus.files {
        let csv_path = file.path.with_extension("csv");
        write_fields_csv(&csv_path, &file.record.fields())?;
        debug!("Wrote {}", csv_path.display());
    }

    let table = corpus.table();
    if let Some(parent) = combined.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    table.write_csv(combined)?;
    Ok(table)
}

/// Discovers, parses and writes a whole results directory.
pub fn run(results_dir: &Path, combined: &Path, progress: bool) -> Result<CombinedTable> {
    let files = discover(results_dir)?;
    info!("Processing {}", plural(files.len(), "file"));

    let corpus = parse_corpus(&files, progress)?;
    let table = write_outputs(&corpus, combined)?;

    info!(
        "Combined {} into {} ({} skipped)",
        plural(table.len(), "result"),
        combined.display(),
        corpus.skipped.len()
    );
    Ok(table)
}
