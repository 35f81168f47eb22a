// src/export/mod.rs

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::fetch::FetchError;
use crate::month::{join_table_names, MonthTable};
use crate::store::Row;

pub mod attendance;
pub mod center;
pub mod writer;

pub use attendance::{extract_records, AttendanceRecord};
pub use center::ExportCenter;
pub use writer::{CsvOptions, CsvSerializer, OutputColumn, SerializationError};

pub const CSV_MIME: &str = "text/csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// One CSV row per member row, in the chosen columns.
    #[default]
    Standard,
    /// One `(name, date, status)` row per marked attendance cell.
    AttendanceOnly,
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "standard" => Ok(ExportMode::Standard),
            "attendance-only" => Ok(ExportMode::AttendanceOnly),
            other => Err(format!(
                "unknown export mode `{}` (expected standard or attendance-only)",
                other
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("no tables selected")]
    NoTables,

    #[error("no output columns")]
    NoColumns,

    #[error("writing csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("saving {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A row together with the monthly table it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRow {
    pub origin: MonthTable,
    pub row: Row,
}

/// A rendered CSV file, ready to save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvDocument {
    pub file_name: String,
    pub body: String,
    /// Data rows, excluding summary and header.
    pub rows: usize,
    /// Cells that could not be rendered and were left empty.
    pub malformed_cells: usize,
}

impl CsvDocument {
    pub fn mime(&self) -> &'static str {
        CSV_MIME
    }

    /// Write into `dir` under `file_name`. The body goes to a temp file in the
    /// same directory first, then is renamed into place; the temp file is
    /// removed on every failure path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ExportError::Io { path, source }
        };
        fs::create_dir_all(dir).map_err(io_err(dir))?;

        let final_path = dir.join(&self.file_name);
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        let written = tmp.write_all(self.body.as_bytes()).and_then(|_| tmp.flush());
        written.map_err(io_err(tmp.path()))?;
        tmp.persist(&final_path)
            .map_err(|e| io_err(&final_path)(e.error))?;

        info!(path = %final_path.display(), mime = self.mime(), rows = self.rows, "saved csv");
        Ok(final_path)
    }
}

pub fn archive_file_name(table: &MonthTable) -> String {
    format!("archive_{}.csv", table.table_name())
}

pub fn export_file_name(mode: ExportMode, tables: &[MonthTable]) -> String {
    let joined = join_table_names(tables);
    match mode {
        ExportMode::Standard => format!("export_{}.csv", joined),
        ExportMode::AttendanceOnly => format!("attendance_only_{}.csv", joined),
    }
}
