use std::{fmt, fs::File, io, path::Path};

use eyre::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Deserializer, de::DeserializeOwned, de::Error as _};
use tracing::debug;

use crate::{error::InputError, record::RawResultRecord};

/// A single value of a result table. `Null` is written as an empty CSV field.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(u64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl From<Option<u64>> for Cell {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Cell::Null, Cell::Int)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Null, Cell::Float)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_owned())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(v) => write!(f, "{v}"),
            // Keep float columns recognisable as floats, 5.0 stays "5.0"
            Cell::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(v) => f.write_str(v),
        }
    }
}

/// Rows gathered from many result files, padded to the union of their columns.
///
/// Columns are kept sorted by name so the serialized table does not depend on
/// the order in which files were discovered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl CombinedTable {
    pub fn from_rows<I, R, K>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, Cell)>,
        K: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(name, cell)| (name.into(), cell))
                    .collect::<Vec<(String, Cell)>>()
            })
            .collect::<Vec<_>>();

        let columns = rows
            .iter()
            .flat_map(|row| row.iter().map(|(name, _)| name.clone()))
            .sorted()
            .dedup()
            .collect::<Vec<_>>();

        let rows = rows
            .into_iter()
            .map(|fields| {
                let mut padded = vec![Cell::Null; columns.len()];
                for (name, cell) in fields {
                    if let Ok(idx) = columns.binary_search(&name) {
                        padded[idx] = cell;
                    }
                }
                padded
            })
            .collect();

        Self { columns, rows }
    }

    pub fn from_records(records: &[RawResultRecord]) -> Self {
        Self::from_rows(records.iter().map(RawResultRecord::fields))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.columns.binary_search_by(|c| c.as_str().cmp(column)).ok()?;
        self.rows.get(row)?.get(idx)
    }

    pub fn write<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).wrap_err_with(|| format!("Create {}", path.display()))?;
        self.write(file)
            .wrap_err_with(|| format!("Write {}", path.display()))?;
        debug!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }
}

/// Writes one record as a two line CSV, keeping the field order given.
pub fn write_fields_csv<K: AsRef<str>>(path: &Path, fields: &[(K, Cell)]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).wrap_err_with(|| format!("Create {}", path.display()))?;
    writer.write_record(fields.iter().map(|(name, _)| name.as_ref()))?;
    writer.write_record(fields.iter().map(|(_, cell)| cell.to_string()))?;
    writer.flush()?;
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(InputError::MissingInput(path.to_path_buf()).into());
    }
    Ok(())
}

pub fn read_headers(path: &Path) -> Result<Vec<String>> {
    ensure_exists(path)?;
    let mut reader =
        csv::Reader::from_path(path).wrap_err_with(|| format!("Open {}", path.display()))?;
    Ok(reader.headers()?.iter().map(str::to_owned).collect())
}

/// Reads every row of a CSV file into `T`. A missing file or a file without
/// data rows is an [`InputError`].
pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    ensure_exists(path)?;
    let mut reader =
        csv::Reader::from_path(path).wrap_err_with(|| format!("Open {}", path.display()))?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .wrap_err_with(|| format!("Parse {}", path.display()))?;
    if rows.is_empty() {
        return Err(InputError::EmptyInput(path.to_path_buf()).into());
    }
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntLike {
    Int(u64),
    Float(f64),
    Text(String),
}

/// Accepts `12`, `12.0` or an empty field for an optional integer column.
/// Tables written by other tools store nullable integer columns as floats.
pub fn lenient_int<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IntLike>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntLike::Int(v)) => Ok(Some(v)),
        Some(IntLike::Float(v)) if v.is_nan() => Ok(None),
        Some(IntLike::Float(v)) if v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as u64)),
        Some(IntLike::Float(v)) => Err(D::Error::custom(format!("expected an integer, got {v}"))),
        Some(IntLike::Text(v)) if v.trim().is_empty() => Ok(None),
        Some(IntLike::Text(v)) => Err(D::Error::custom(format!("expected an integer, got {v:?}"))),
    }
}
