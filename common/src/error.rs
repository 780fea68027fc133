use std::path::PathBuf;

use thiserror::Error;

/// Problems with an input file that stop an analysis before it starts.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{0} not found")]
    MissingInput(PathBuf),
    #[error("{0} is empty")]
    EmptyInput(PathBuf),
    #[error("{path} is missing expected columns: {columns:?}")]
    MissingColumns { path: PathBuf, columns: Vec<String> },
}
