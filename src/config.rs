// src/config.rs

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::fetch::DEFAULT_PAGE_SIZE;

/// Connection details for the hosted platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub url: String,
    pub api_key: String,
    /// Name of the RPC that drops a monthly table.
    pub delete_rpc: String,
    /// Column that gives paged reads a stable order.
    pub order_column: String,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            delete_rpc: "drop_month_table".to_string(),
            order_column: "id".to_string(),
            max_retries: 3,
            backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub page_size: usize,
    /// Write phones as `="0..."` so spreadsheets keep the leading zero.
    pub spreadsheet_safe_phones: bool,
    pub output_dir: PathBuf,
    pub history_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            page_size: DEFAULT_PAGE_SIZE,
            spreadsheet_safe_phones: true,
            output_dir: PathBuf::from("exports"),
            history_dir: PathBuf::from("history"),
        }
    }
}

impl Settings {
    /// Defaults, then the YAML file at `path` if given, then `ROLLCALL_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// `load` with the environment supplied by `lookup`.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match path {
            Some(p) => {
                let text = fs::read_to_string(p).with_context(|| format!("reading {:?}", p))?;
                serde_yaml::from_str(&text).with_context(|| format!("parsing {:?}", p))?
            }
            None => Settings::default(),
        };
        settings.apply_env(lookup)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ROLLCALL_STORE_URL") {
            self.store.url = url;
        }
        if let Some(key) = lookup("ROLLCALL_API_KEY") {
            self.store.api_key = key;
        }
        if let Some(raw) = lookup("ROLLCALL_PAGE_SIZE") {
            self.page_size = raw
                .trim()
                .parse()
                .with_context(|| format!("ROLLCALL_PAGE_SIZE={:?} is not a number", raw))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(anyhow!("page_size must be at least 1"));
        }
        if self.store.delete_rpc.trim().is_empty() {
            return Err(anyhow!("store.delete_rpc must not be empty"));
        }
        if self.store.order_column.trim().is_empty() {
            return Err(anyhow!("store.order_column must not be empty"));
        }
        Ok(())
    }
}
