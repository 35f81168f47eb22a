// src/archive/workflow.rs

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::listener::{ArchiveListener, ArchiveOutcome, Notice};
use super::state::ArchiveState;
use crate::config::Settings;
use crate::export::{archive_file_name, CsvDocument, CsvOptions, CsvSerializer, ExportError, OutputColumn};
use crate::fetch::{fetch_all_rows, FetchError, DEFAULT_PAGE_SIZE};
use crate::month::MonthTable;
use crate::schema::{classify, ClassifiedColumns, MemberField};
use crate::stats::MemberStats;
use crate::store::{BackingStore, Row, StoreError};

/// Knobs for one workflow, taken from `Settings` by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub page_size: usize,
    pub csv: CsvOptions,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            csv: CsvOptions::default(),
        }
    }
}

impl From<&Settings> for ArchiveOptions {
    fn from(s: &Settings) -> Self {
        Self {
            page_size: s.page_size,
            csv: CsvOptions {
                spreadsheet_safe_phones: s.spreadsheet_safe_phones,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("cannot {action} while in {state}")]
    IllegalTransition {
        action: &'static str,
        state: ArchiveState,
    },

    #[error("deleting `{table}` failed: {source}")]
    Delete {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Everything one archive attempt holds on to. Rows and stats are read once
/// at open and reused for every download and delete retry.
#[derive(Debug)]
pub struct ArchiveSession {
    table: MonthTable,
    rows: Vec<Row>,
    columns: ClassifiedColumns,
    stats: MemberStats,
    csv: Option<CsvDocument>,
    downloaded: bool,
    last_download: Option<PathBuf>,
    state: ArchiveState,
    last_error: Option<StoreError>,
}

impl ArchiveSession {
    pub fn table(&self) -> &MonthTable {
        &self.table
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn columns(&self) -> &ClassifiedColumns {
        &self.columns
    }

    pub fn stats(&self) -> &MemberStats {
        &self.stats
    }

    pub fn downloaded(&self) -> bool {
        self.downloaded
    }

    pub fn last_download(&self) -> Option<&Path> {
        self.last_download.as_deref()
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Error of the most recent failed delete, cleared on success.
    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }
}

/// Restores `Confirm` unless disarmed before drop.
struct BackToConfirm<'a> {
    state: &'a mut ArchiveState,
    armed: bool,
}

impl Drop for BackToConfirm<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("delete interrupted, back to confirm");
            *self.state = ArchiveState::Confirm;
        }
    }
}

/// Export-then-delete for one monthly table.
pub struct ArchiveWorkflow {
    store: Arc<dyn BackingStore>,
    serializer: CsvSerializer,
    listener: Arc<dyn ArchiveListener>,
    session: ArchiveSession,
}

impl ArchiveWorkflow {
    /// Start a session in `Summary`: read the whole table and compute its stats.
    /// A failed read means no session; nothing has been written or deleted.
    #[instrument(level = "info", skip(store, options, listener), fields(table = %table))]
    pub async fn open(
        store: Arc<dyn BackingStore>,
        table: MonthTable,
        options: ArchiveOptions,
        listener: Arc<dyn ArchiveListener>,
    ) -> Result<Self, ArchiveError> {
        let rows = fetch_all_rows(store.as_ref(), &table.table_name(), options.page_size).await?;
        let columns = classify(&rows);
        let stats = MemberStats::from_rows(&rows);
        info!(
            rows = rows.len(),
            attendance_columns = columns.attendance_columns.len(),
            "archive session opened"
        );

        Ok(Self {
            store,
            serializer: CsvSerializer::new(options.csv),
            listener,
            session: ArchiveSession {
                table,
                rows,
                columns,
                stats,
                csv: None,
                downloaded: false,
                last_download: None,
                state: ArchiveState::Summary,
                last_error: None,
            },
        })
    }

    pub fn session(&self) -> &ArchiveSession {
        &self.session
    }

    pub fn state(&self) -> ArchiveState {
        self.session.state
    }

    fn transition(&mut self, next: ArchiveState, action: &'static str) -> Result<(), ArchiveError> {
        let state = self.session.state;
        if !state.can_transition_to(next) {
            return Err(ArchiveError::IllegalTransition { action, state });
        }
        debug!(from = %state, to = %next, "transition");
        self.session.state = next;
        Ok(())
    }

    fn render_csv(&self) -> Result<CsvDocument, ArchiveError> {
        let s = &self.session;
        let mut names = s.columns.export_columns();
        if names.is_empty() {
            names = MemberField::ALL.iter().map(|f| f.label().to_string()).collect();
        }
        let title = format!("Archive of {} {}", s.table.month_name(), s.table.year());
        let doc = self.serializer.standard(
            archive_file_name(&s.table),
            &s.stats.summary_lines(&title),
            &OutputColumn::fields(names),
            s.rows.iter().map(|r| (r, Some(&s.table))),
        )?;
        Ok(doc)
    }

    /// The archive CSV, rendered once and cached for the session.
    pub fn csv(&mut self) -> Result<&CsvDocument, ArchiveError> {
        let state = self.session.state;
        if !state.allows_download() {
            return Err(ArchiveError::IllegalTransition {
                action: "generate csv",
                state,
            });
        }
        let doc = match self.session.csv.take() {
            Some(doc) => doc,
            None => self.render_csv()?,
        };
        Ok(self.session.csv.insert(doc))
    }

    /// Save the archive CSV into `dir`. Allowed any number of times in
    /// `Summary` and `Confirm`; does not change the state.
    pub fn download(&mut self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let path = self.csv()?.save(dir)?;
        self.session.downloaded = true;
        self.session.last_download = Some(path.clone());
        Ok(path)
    }

    /// `Summary → Confirm`.
    pub fn request_delete(&mut self) -> Result<(), ArchiveError> {
        self.transition(ArchiveState::Confirm, "request delete")
    }

    /// `Confirm → Summary`.
    pub fn cancel_delete(&mut self) -> Result<(), ArchiveError> {
        match self.session.state {
            ArchiveState::Confirm => self.transition(ArchiveState::Summary, "cancel delete"),
            state => Err(ArchiveError::IllegalTransition {
                action: "cancel delete",
                state,
            }),
        }
    }

    fn complete(&mut self, already_deleted: bool) -> ArchiveOutcome {
        self.session.state = ArchiveState::Done;
        self.session.last_error = None;
        let outcome = ArchiveOutcome {
            table: self.session.table.table_name(),
            rows: self.session.rows.len(),
            downloaded: self.session.downloaded,
            csv_path: self.session.last_download.clone(),
            already_deleted,
        };
        if already_deleted {
            self.listener.notice(&Notice::AlreadyDeleted {
                table: outcome.table.clone(),
            });
        }
        self.listener.archived(&outcome);
        info!(table = %outcome.table, rows = outcome.rows, already_deleted, "archive done");
        outcome
    }

    /// `Confirm → Archiving`, then one delete call.
    ///
    /// On success the session is `Done` and the listener is told. On failure the
    /// table is checked once: if it is gone the delete did land (lost response) and
    /// the archive still completes; otherwise the session returns to `Confirm`
    /// with rows and stats intact, ready for a retry.
    #[instrument(level = "info", skip(self), fields(table = %self.session.table))]
    pub async fn confirm_delete(&mut self) -> Result<ArchiveOutcome, ArchiveError> {
        self.transition(ArchiveState::Archiving, "delete")?;
        let table = self.session.table.table_name();

        if !self.session.downloaded {
            self.listener.notice(&Notice::NotDownloaded {
                table: table.clone(),
            });
        }

        // If this future is dropped mid-call the guard puts the session back
        // in `Confirm`; a retry then finds out whether the delete landed.
        let (result, gone) = {
            let mut guard = BackToConfirm {
                state: &mut self.session.state,
                armed: true,
            };
            let result = self.store.delete_table(&table).await;
            let gone = match &result {
                Ok(()) | Err(StoreError::TableNotFound(_)) => true,
                Err(_) => matches!(
                    self.store.range_select(&table, 0, 1).await,
                    Err(StoreError::TableNotFound(_))
                ),
            };
            guard.armed = false;
            (result, gone)
        };

        match result {
            Ok(()) => Ok(self.complete(false)),
            Err(StoreError::TableNotFound(_)) => Ok(self.complete(true)),
            Err(err) => {
                if gone {
                    warn!(%table, error = %err, "delete reported failure but table is gone");
                    return Ok(self.complete(true));
                }
                self.transition(ArchiveState::Confirm, "recover from failed delete")?;
                self.session.last_error = Some(err.clone());
                self.listener.notice(&Notice::DeleteFailed {
                    table: table.clone(),
                    message: err.to_string(),
                });
                Err(ArchiveError::Delete { table, source: err })
            }
        }
    }

    /// Drop the session. Before `Done` this has no effect on the table.
    pub fn close(self) -> ArchiveState {
        let state = self.session.state;
        if state != ArchiveState::Done {
            info!(table = %self.session.table, %state, "archive session discarded");
        }
        state
    }
}
