//! The tabular catalog: CSV in, CSV out, rows passed through untouched apart
//! from the status column.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::domain::Doi;
use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let read_err = |message: String| HarvestError::CatalogRead {
            path: path.to_path_buf(),
            message,
        };
        let file = File::open(path).map_err(|err| read_err(err.to_string()))?;
        Self::from_reader(file).map_err(|err| read_err(err.to_string()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Self { headers, rows })
    }

    /// Writes the catalog through a temp file next to `path`, replacing it atomically.
    pub fn save(&self, path: &Path) -> Result<(), HarvestError> {
        let write_err = |message: String| HarvestError::CatalogWrite {
            path: path.to_path_buf(),
            message,
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".doi-harvest-catalog")
            .tempfile_in(parent)
            .map_err(|err| write_err(err.to_string()))?;
        self.to_writer(temp.as_file_mut())
            .map_err(|err| write_err(err.to_string()))?;
        temp.persist(path)
            .map_err(|err| write_err(err.error.to_string()))?;
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Typed view of the DOI column. A missing cell or a blank value becomes
    /// `Err` carrying a description for the row's failure record.
    pub fn dois(&self, column: &str) -> Result<Vec<Result<Doi, String>>, HarvestError> {
        let index = self
            .column_index(column)
            .ok_or_else(|| HarvestError::MissingDoiColumn(column.to_string()))?;
        Ok(self
            .rows
            .iter()
            .map(|row| match row.get(index) {
                None => Err(format!("row has no `{column}` cell")),
                Some(value) => value
                    .parse::<Doi>()
                    .map_err(|_| format!("empty `{column}` value")),
            })
            .collect())
    }

    /// Copy of the catalog with `column` set from `values`. An existing column
    /// of that name is overwritten; otherwise it is appended.
    pub fn with_column(&self, column: &str, values: &[&str]) -> Catalog {
        let mut updated = self.clone();
        let index = match updated.column_index(column) {
            Some(index) => index,
            None => {
                updated.headers.push(column.to_string());
                updated.headers.len() - 1
            }
        };
        for (row, value) in updated.rows.iter_mut().zip(values) {
            if row.len() <= index {
                row.resize(index + 1, String::new());
            }
            row[index] = value.to_string();
        }
        updated
    }
}

/// `<dir>/<stem>_Updated.csv` for `<dir>/<stem>.csv`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog".to_string());
    input.with_file_name(format!("{stem}_Updated.csv"))
}
