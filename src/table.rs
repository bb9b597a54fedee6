//! Delimited-text input and output.
//!
//! Output files are written to a temporary file next to the destination and
//! persisted in one step, so an interrupted write never leaves a truncated
//! table behind.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::batch::CheckpointSink;
use crate::errors::{AppError, AppResult};
use crate::model::{AddressRecord, GeocodeResult, RESULT_COLUMNS};

const COLUMN_SEPARATOR: &str = ", ";

#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    delimiter: u8,
}

impl Table {
    pub fn read(path: &Path, delimiter: u8) -> AppResult<Self> {
        if !path.is_file() {
            return Err(AppError::Input(format!(
                "input file not found: {}",
                path.display()
            )));
        }
        let file = File::open(path)?;
        let table = Self::from_reader(BufReader::new(file), delimiter)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            columns = table.headers.len(),
            "loaded input table"
        );
        Ok(table)
    }

    /// Non-UTF-8 bytes are replaced rather than rejected so spreadsheets
    /// exported in legacy encodings still load.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> AppResult<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers = decode_record(reader.byte_headers()?);
        if headers.iter().all(|header| header.trim().is_empty()) {
            return Err(AppError::Input("input file has no header row".into()));
        }

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            rows.push(decode_record(&record?));
        }

        Ok(Self {
            headers,
            rows,
            delimiter,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Builds one address per row from the selected columns. Several columns
    /// are joined with ", ", skipping blank cells.
    pub fn address_records(&self, columns: &[String]) -> AppResult<Vec<AddressRecord>> {
        if columns.is_empty() {
            return Err(AppError::Input("no address column selected".into()));
        }
        let indexes = columns
            .iter()
            .map(|column| {
                self.headers
                    .iter()
                    .position(|header| header.trim() == column.trim())
                    .ok_or_else(|| {
                        AppError::Input(format!(
                            "column {column:?} not found; available: {}",
                            self.headers.join(", ")
                        ))
                    })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let records = self
            .rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| {
                let cells: Vec<&str> = indexes
                    .iter()
                    .filter_map(|index| row.get(*index).map(String::as_str))
                    .collect();
                let raw = if cells.is_empty() {
                    None
                } else if cells.len() == 1 {
                    Some(cells[0].to_string())
                } else {
                    Some(
                        cells
                            .iter()
                            .map(|cell| cell.trim())
                            .filter(|cell| !cell.is_empty())
                            .collect::<Vec<_>>()
                            .join(COLUMN_SEPARATOR),
                    )
                };
                AddressRecord::new(row_index, raw)
            })
            .collect();
        Ok(records)
    }

    /// Writes the first `results.len()` input rows with the result columns
    /// appended.
    pub fn write_merged(&self, results: &[GeocodeResult], path: &Path) -> AppResult<PathBuf> {
        if results.len() > self.rows.len() {
            return Err(AppError::Input(format!(
                "{} results for {} input rows",
                results.len(),
                self.rows.len()
            )));
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(parent)?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_writer(BufWriter::new(temp));

        let mut header = self.headers.clone();
        header.extend(RESULT_COLUMNS.iter().map(|column| column.to_string()));
        writer.write_record(&header)?;

        for (row, result) in self.rows.iter().zip(results) {
            let mut cells = row.clone();
            // Result columns must line up with the header whatever the row width.
            cells.resize(self.headers.len(), String::new());
            cells.extend(result.to_cells());
            writer.write_record(&cells)?;
        }

        let buffered = writer.into_inner().map_err(|err| {
            AppError::Output(format!("failed to flush csv writer: {}", err.error()))
        })?;
        let temp = buffered.into_inner().map_err(|err| {
            AppError::Output(format!("failed to flush buffer: {}", err.error()))
        })?;
        temp.persist(path).map_err(|err| {
            AppError::Output(format!("failed to persist {}: {}", path.display(), err.error))
        })?;

        debug!(path = %path.display(), rows = results.len(), "table written");
        Ok(path.to_path_buf())
    }
}

fn decode_record(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| match String::from_utf8_lossy(field) {
            Cow::Borrowed(text) => text.to_string(),
            Cow::Owned(text) => text,
        })
        .collect()
}

/// `out/result.csv` checkpointed after 1000 rows -> `out/result_1000.csv`.
pub fn checkpoint_path(output: &Path, processed: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{stem}_{processed}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{processed}"),
    };
    output.with_file_name(name)
}

/// Checkpoint sink that writes partial tables next to the final output.
pub struct TableCheckpoints<'a> {
    table: &'a Table,
    output: PathBuf,
    written: Vec<PathBuf>,
}

impl<'a> TableCheckpoints<'a> {
    pub fn new(table: &'a Table, output: impl Into<PathBuf>) -> Self {
        Self {
            table,
            output: output.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl CheckpointSink for TableCheckpoints<'_> {
    fn write_checkpoint(&mut self, processed: usize, results: &[GeocodeResult]) -> AppResult<()> {
        let path = checkpoint_path(&self.output, processed);
        self.table.write_merged(results, &path)?;
        info!(path = %path.display(), processed, "checkpoint written");
        self.written.push(path);
        Ok(())
    }
}
