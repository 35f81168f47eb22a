// src/history/mod.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{error, warn};

use crate::archive::{ArchiveListener, ArchiveOutcome, Notice};

const LOG_FILE: &str = "archived.jsonl";

/// One line of the archive log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub table: String,
    pub rows: usize,
    pub downloaded: bool,
    pub csv_path: Option<PathBuf>,
    pub already_deleted: bool,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveEntry {
    pub fn new(outcome: &ArchiveOutcome, archived_at: DateTime<Utc>) -> Self {
        Self {
            table: outcome.table.clone(),
            rows: outcome.rows,
            downloaded: outcome.downloaded,
            csv_path: outcome.csv_path.clone(),
            already_deleted: outcome.already_deleted,
            archived_at,
        }
    }
}

/// Append-only record of archived tables, one JSON object per line.
pub struct ArchiveLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ArchiveLog {
    /// Open the log under `history_dir`, creating the directory if needed.
    pub fn new(history_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = history_dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating history directory {:?}", dir))?;
        Ok(Self {
            path: dir.join(LOG_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, outcome: &ArchiveOutcome) -> Result<ArchiveEntry> {
        let entry = ArchiveEntry::new(outcome, Utc::now());
        let mut line = serde_json::to_string(&entry).context("serializing archive entry")?;
        line.push('\n');

        let _guard = self.lock.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("appending to {:?}", self.path))?;
        Ok(entry)
    }

    /// All entries in write order. A missing log is empty; unreadable lines are
    /// skipped with a warning.
    pub fn load(&self) -> Result<Vec<ArchiveEntry>> {
        let _guard = self.lock.lock().unwrap();
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("opening {:?}", self.path)),
        };

        let mut entries = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading {:?}", self.path))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ArchiveEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = i + 1, error = %e, "skipping bad archive log line"),
            }
        }
        Ok(entries)
    }

    pub fn contains(&self, table: &str) -> Result<bool> {
        Ok(self.load()?.iter().any(|e| e.table == table))
    }
}

/// Writes every completed archive to an `ArchiveLog`.
pub struct HistoryListener {
    log: ArchiveLog,
}

impl HistoryListener {
    pub fn new(log: ArchiveLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &ArchiveLog {
        &self.log
    }
}

impl ArchiveListener for HistoryListener {
    fn archived(&self, outcome: &ArchiveOutcome) {
        if let Err(e) = self.log.record(outcome) {
            error!(table = %outcome.table, error = %e, "failed to record archive");
        }
    }

    fn notice(&self, notice: &Notice) {
        warn!(?notice, "archive notice");
    }
}
