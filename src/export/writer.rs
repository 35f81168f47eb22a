// src/export/writer.rs

use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;
use tracing::{debug, warn};

use super::{AttendanceRecord, CsvDocument, ExportError};
use crate::month::MonthTable;
use crate::normalize::{normalize_gender, normalize_phone, spreadsheet_phone};
use crate::schema::{resolve, scalar_text, MemberField};
use crate::store::Row;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvOptions {
    /// Emit phones as `="0..."` formulas instead of bare digits.
    pub spreadsheet_safe_phones: bool,
}

/// One output column, in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputColumn {
    /// A row column, resolved by exact then normalized key.
    Field(String),
    /// Name of the table the row came from.
    OriginTable,
}

impl OutputColumn {
    pub const ORIGIN_HEADER: &'static str = "Origin Table";

    pub fn header(&self) -> &str {
        match self {
            OutputColumn::Field(name) => name,
            OutputColumn::OriginTable => Self::ORIGIN_HEADER,
        }
    }

    pub fn fields<I, S>(names: I) -> Vec<OutputColumn>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(|n| OutputColumn::Field(n.into()))
            .collect()
    }
}

/// A single cell that could not be rendered. Never aborts an export: the cell
/// is written empty and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}, column `{column}`: {kind} value has no cell form")]
pub struct SerializationError {
    pub row: usize,
    pub column: String,
    pub kind: &'static str,
}

enum CellKind {
    Phone,
    Gender,
    Plain,
}

fn cell_kind(column: &str) -> CellKind {
    match MemberField::from_key(column) {
        Some(f) if f.is_phone() => CellKind::Phone,
        Some(MemberField::Gender) => CellKind::Gender,
        _ => CellKind::Plain,
    }
}

/// Renders rows as CSV: every field quoted, quotes doubled, `\n` between records.
#[derive(Debug, Clone, Default)]
pub struct CsvSerializer {
    options: CsvOptions,
}

impl CsvSerializer {
    pub fn new(options: CsvOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CsvOptions {
        self.options
    }

    fn writer(buf: Vec<u8>) -> csv::Writer<Vec<u8>> {
        WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(buf)
    }

    fn summary_block(summary: &[String]) -> Vec<u8> {
        let mut buf = Vec::new();
        if summary.is_empty() {
            return buf;
        }
        for line in summary {
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        buf.push(b'\n');
        buf
    }

    fn finish(
        mut wtr: csv::Writer<Vec<u8>>,
        file_name: String,
        rows: usize,
        malformed_cells: usize,
    ) -> Result<CsvDocument, ExportError> {
        wtr.flush().map_err(csv::Error::from)?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(CsvDocument {
            file_name,
            body: String::from_utf8(bytes)?,
            rows,
            malformed_cells,
        })
    }

    /// Render one cell of `row` for `column`, applying phone/gender normalization.
    /// A missing column is an empty cell; a non-scalar value is an error.
    pub fn render_cell(
        &self,
        row_number: usize,
        column: &str,
        row: &Row,
    ) -> Result<String, SerializationError> {
        let text = match resolve(row, column) {
            None => String::new(),
            Some(v) => scalar_text(v).ok_or_else(|| SerializationError {
                row: row_number,
                column: column.to_string(),
                kind: if v.is_array() { "array" } else { "object" },
            })?,
        };
        Ok(match cell_kind(column) {
            CellKind::Phone if self.options.spreadsheet_safe_phones => spreadsheet_phone(&text),
            CellKind::Phone => normalize_phone(&text),
            CellKind::Gender => normalize_gender(&text),
            CellKind::Plain => text,
        })
    }

    /// One CSV row per input row, in `columns` order, optionally preceded by a
    /// plain-text `summary` block and a blank line.
    pub fn standard<'a, I>(
        &self,
        file_name: String,
        summary: &[String],
        columns: &[OutputColumn],
        rows: I,
    ) -> Result<CsvDocument, ExportError>
    where
        I: IntoIterator<Item = (&'a Row, Option<&'a MonthTable>)>,
    {
        if columns.is_empty() {
            return Err(ExportError::NoColumns);
        }

        let mut wtr = Self::writer(Self::summary_block(summary));
        wtr.write_record(columns.iter().map(OutputColumn::header))?;

        let mut written = 0;
        let mut malformed = 0;
        for (idx, (row, origin)) in rows.into_iter().enumerate() {
            let mut record = Vec::with_capacity(columns.len());
            for column in columns {
                let cell = match column {
                    OutputColumn::OriginTable => {
                        origin.map(MonthTable::table_name).unwrap_or_default()
                    }
                    OutputColumn::Field(name) => match self.render_cell(idx + 1, name, row) {
                        Ok(cell) => cell,
                        Err(e) => {
                            warn!(error = %e, "writing empty cell");
                            malformed += 1;
                            String::new()
                        }
                    },
                };
                record.push(cell);
            }
            wtr.write_record(&record)?;
            written += 1;
        }

        debug!(file = %file_name, rows = written, malformed, "rendered standard csv");
        Self::finish(wtr, file_name, written, malformed)
    }

    /// `Name,Date,Status`, one row per record, in the order given. An
    /// `Origin Table` column is added when any record knows its table.
    pub fn attendance_only(
        &self,
        file_name: String,
        records: &[AttendanceRecord],
    ) -> Result<CsvDocument, ExportError> {
        let with_origin = records.iter().any(|r| r.origin.is_some());
        let mut wtr = Self::writer(Vec::new());
        let mut header = vec!["Name", "Date", "Status"];
        if with_origin {
            header.push(OutputColumn::ORIGIN_HEADER);
        }
        wtr.write_record(&header)?;

        for rec in records {
            let mut record = vec![
                rec.name.clone(),
                rec.date.to_string(),
                rec.status.as_str().to_string(),
            ];
            if with_origin {
                record.push(rec.origin.as_ref().map(MonthTable::table_name).unwrap_or_default());
            }
            wtr.write_record(&record)?;
        }
        debug!(file = %file_name, rows = records.len(), "rendered attendance csv");
        Self::finish(wtr, file_name, records.len(), 0)
    }
}
