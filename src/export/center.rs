// src/export/center.rs

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    export_file_name, extract_records, CsvDocument, CsvOptions, CsvSerializer, ExportError,
    ExportMode, OutputColumn, TaggedRow,
};
use crate::config::Settings;
use crate::fetch::fetch_all_rows;
use crate::month::MonthTable;
use crate::schema::classify;
use crate::store::{BackingStore, Row};

/// Multi-table export: pick monthly tables, arrange the output columns,
/// preview the merged rows, then render one CSV.
pub struct ExportCenter {
    store: Arc<dyn BackingStore>,
    page_size: usize,
    serializer: CsvSerializer,
    tables: Vec<MonthTable>,
    columns: Vec<String>,
    preview: Option<Vec<TaggedRow>>,
}

impl ExportCenter {
    pub fn new(store: Arc<dyn BackingStore>, settings: &Settings) -> Self {
        Self {
            store,
            page_size: settings.page_size,
            serializer: CsvSerializer::new(CsvOptions {
                spreadsheet_safe_phones: settings.spreadsheet_safe_phones,
            }),
            tables: Vec::new(),
            columns: Vec::new(),
            preview: None,
        }
    }

    pub fn selected(&self) -> &[MonthTable] {
        &self.tables
    }

    /// Returns false if `table` was already selected.
    pub fn select(&mut self, table: MonthTable) -> bool {
        if self.tables.contains(&table) {
            return false;
        }
        self.tables.push(table);
        self.preview = None;
        true
    }

    pub fn deselect(&mut self, table: &MonthTable) -> bool {
        let before = self.tables.len();
        self.tables.retain(|t| t != table);
        let removed = self.tables.len() != before;
        if removed {
            self.preview = None;
        }
        removed
    }

    /// Output column order. Empty means "every column found in the preview".
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn add_column(&mut self, column: impl Into<String>) {
        self.columns.push(column.into());
    }

    pub fn remove_column(&mut self, index: usize) -> Option<String> {
        (index < self.columns.len()).then(|| self.columns.remove(index))
    }

    /// Move the column at `from` so it ends up at index `to`.
    pub fn move_column(&mut self, from: usize, to: usize) -> bool {
        if from >= self.columns.len() || to >= self.columns.len() {
            return false;
        }
        let col = self.columns.remove(from);
        self.columns.insert(to, col);
        true
    }

    /// Fetch every selected table and concatenate the rows in selection order,
    /// each tagged with its table. Cached until the selection changes.
    #[instrument(level = "info", skip(self), fields(tables = self.tables.len()))]
    pub async fn preview(&mut self) -> Result<&[TaggedRow], ExportError> {
        if self.tables.is_empty() {
            return Err(ExportError::NoTables);
        }
        if self.preview.is_none() {
            let store = self.store.as_ref();
            let page_size = self.page_size;
            let fetched = try_join_all(self.tables.iter().map(|t| async move {
                let name = t.table_name();
                fetch_all_rows(store, &name, page_size)
                    .await
                    .map(|rows| (*t, rows))
            }))
            .await?;

            let merged: Vec<TaggedRow> = fetched
                .into_iter()
                .flat_map(|(origin, rows)| rows.into_iter().map(move |row| TaggedRow { origin, row }))
                .collect();
            info!(rows = merged.len(), "preview ready");
            self.preview = Some(merged);
        }
        Ok(self.preview.as_deref().unwrap_or_default())
    }

    fn output_columns(&self, rows: &[TaggedRow]) -> Vec<OutputColumn> {
        let names = if self.columns.is_empty() {
            let plain: Vec<Row> = rows.iter().map(|t| t.row.clone()).collect();
            classify(&plain).export_columns()
        } else {
            self.columns.clone()
        };
        let mut columns = OutputColumn::fields(names);
        columns.push(OutputColumn::OriginTable);
        columns
    }

    /// Render the merged preview. Standard mode writes one row per fetched row
    /// (no de-duplication across tables) plus an origin-table column.
    pub async fn export(&mut self, mode: ExportMode) -> Result<CsvDocument, ExportError> {
        self.preview().await?;
        let rows = self.preview.as_deref().unwrap_or_default();
        let file_name = export_file_name(mode, &self.tables);
        let tagged = rows.iter().map(|t| (&t.row, Some(&t.origin)));

        let doc = match mode {
            ExportMode::Standard => {
                let columns = self.output_columns(rows);
                self.serializer.standard(file_name, &[], &columns, tagged)?
            }
            ExportMode::AttendanceOnly => {
                let records = extract_records(tagged);
                self.serializer.attendance_only(file_name, &records)?
            }
        };
        info!(file = %doc.file_name, rows = doc.rows, "export rendered");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use csv::ReaderBuilder;
    use serde_json::{json, Value};

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    fn parse(body: &str) -> Vec<Vec<String>> {
        ReaderBuilder::new()
            .has_headers(false)
            .from_reader(body.as_bytes())
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new()
                .with_table(
                    "may_2025",
                    vec![
                        row(json!({"Full Name": "Ada", "Gender": "f", "attendance_2025_05_04": "P"})),
                        row(json!({"Full Name": "Bo", "Gender": "m"})),
                    ],
                )
                .with_table(
                    "june_2025",
                    vec![row(json!({"full_name": "Ada", "gender": "F", "attendance_2025_06_01": "A"}))],
                ),
        )
    }

    fn settings() -> Settings {
        Settings {
            page_size: 1,
            ..Settings::default()
        }
    }

    fn center(store: Arc<MemoryStore>) -> ExportCenter {
        let mut c = ExportCenter::new(store, &settings());
        c.select("may_2025".parse().unwrap());
        c.select("june_2025".parse().unwrap());
        c
    }

    #[tokio::test]
    async fn test_preview_concatenates_and_tags() {
        let mut c = center(store());
        let preview = c.preview().await.unwrap();
        assert_eq!(preview.len(), 3);
        let origins: Vec<String> = preview.iter().map(|t| t.origin.table_name()).collect();
        assert_eq!(origins, vec!["may_2025", "may_2025", "june_2025"]);
    }

    #[tokio::test]
    async fn test_standard_export_in_chosen_order() {
        let mut c = center(store());
        c.set_columns(vec!["Gender".into(), "Full Name".into()]);
        c.add_column("Level");
        c.move_column(1, 0);
        assert_eq!(c.remove_column(2), Some("Level".to_string()));
        assert_eq!(c.remove_column(9), None);

        let doc = c.export(ExportMode::Standard).await.unwrap();
        assert_eq!(doc.file_name, "export_may_2025_june_2025.csv");
        assert_eq!(doc.rows, 3);
        assert_eq!(
            parse(&doc.body),
            vec![
                vec!["Full Name", "Gender", "Origin Table"],
                vec!["Ada", "Female", "may_2025"],
                vec!["Bo", "Male", "may_2025"],
                vec!["Ada", "Female", "june_2025"],
            ]
        );
    }

    #[tokio::test]
    async fn test_default_columns_from_preview() {
        let mut c = center(store());
        let doc = c.export(ExportMode::Standard).await.unwrap();
        let header = &parse(&doc.body)[0];
        assert_eq!(
            header,
            &vec![
                "Full Name",
                "Gender",
                "attendance_2025_05_04",
                "attendance_2025_06_01",
                "Origin Table"
            ]
        );
    }

    #[tokio::test]
    async fn test_attendance_only_export() {
        let mut c = center(store());
        let doc = c.export(ExportMode::AttendanceOnly).await.unwrap();
        assert_eq!(doc.file_name, "attendance_only_may_2025_june_2025.csv");
        assert_eq!(
            parse(&doc.body),
            vec![
                vec!["Name", "Date", "Status", "Origin Table"],
                vec!["Ada", "2025-05-04", "Present", "may_2025"],
                vec!["Ada", "2025-06-01", "Absent", "june_2025"],
            ]
        );
    }

    #[tokio::test]
    async fn test_one_failed_table_fails_export() {
        let s = store();
        s.fail_read_at("june_2025", 0, StoreError::Transport("reset".into()));
        let mut c = center(s);
        assert!(matches!(
            c.export(ExportMode::Standard).await,
            Err(ExportError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn test_selection_changes_invalidate_preview() {
        let s = store();
        let mut c = center(s.clone());
        assert_eq!(c.preview().await.unwrap().len(), 3);
        let calls = s.calls().range_selects;

        // cached
        c.preview().await.unwrap();
        assert_eq!(s.calls().range_selects, calls);

        assert!(c.deselect(&"june_2025".parse().unwrap()));
        assert!(!c.select("may_2025".parse().unwrap()));
        assert_eq!(c.preview().await.unwrap().len(), 2);
        assert!(s.calls().range_selects > calls);
    }

    #[tokio::test]
    async fn test_nothing_selected() {
        let mut c = ExportCenter::new(store(), &settings());
        assert!(matches!(
            c.export(ExportMode::Standard).await,
            Err(ExportError::NoTables)
        ));
    }
}
