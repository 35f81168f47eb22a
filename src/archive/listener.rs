use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of a completed archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    pub table: String,
    pub rows: usize,
    pub downloaded: bool,
    /// Last saved CSV, if any.
    pub csv_path: Option<PathBuf>,
    /// The table was already gone when the delete was confirmed.
    pub already_deleted: bool,
}

/// Non-blocking messages for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Deleting without having saved the CSV first.
    NotDownloaded { table: String },
    DeleteFailed { table: String, message: String },
    /// The delete reported failure, but the table no longer exists.
    AlreadyDeleted { table: String },
}

/// Hooks the workflow calls out to; passed in at construction.
pub trait ArchiveListener: Send + Sync {
    fn archived(&self, outcome: &ArchiveOutcome);

    fn notice(&self, notice: &Notice) {
        let _ = notice;
    }
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ArchiveListener for LogListener {
    fn archived(&self, outcome: &ArchiveOutcome) {
        info!(table = %outcome.table, rows = outcome.rows, "archived");
    }

    fn notice(&self, notice: &Notice) {
        match notice {
            Notice::NotDownloaded { table } => {
                warn!(%table, "deleting without a downloaded copy")
            }
            Notice::DeleteFailed { table, message } => {
                warn!(%table, %message, "delete failed")
            }
            Notice::AlreadyDeleted { table } => {
                warn!(%table, "table was already deleted")
            }
        }
    }
}
