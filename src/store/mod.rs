// src/store/mod.rs

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod rest;

pub use memory::{DeleteFault, MemoryStore};
pub use rest::RestStore;

/// One member row as the store hands it back: column name → JSON value.
/// Rows are schema-on-read, two rows of the same table may carry different keys.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("table `{0}` does not exist")]
    TableNotFound(String),

    #[error("`{0}` is not a valid table name")]
    InvalidTable(String),

    #[error("store request failed: {0}")]
    Transport(String),

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether retrying the same read could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Equality filter used to target rows in an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

/// The hosted platform, reduced to the three calls the archive pipeline needs.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Read at most `limit` rows of `table` starting at `offset`.
    async fn range_select(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError>;

    /// Merge `patch` into every row matching `filter`.
    async fn update(&self, table: &str, filter: &Filter, patch: &Row) -> Result<(), StoreError>;

    /// Drop `table` entirely. This is the only destructive call.
    async fn delete_table(&self, table: &str) -> Result<(), StoreError>;
}

/// Table names go into URLs and RPC payloads, so only `[A-Za-z0-9_]` is accepted.
pub fn validate_table_name(table: &str) -> Result<(), StoreError> {
    if !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("december_2025").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("dec/../users").is_err());
        assert!(validate_table_name("dec 2025").is_err());
    }

    #[test]
    fn test_filter_matches() {
        let row: Row = json!({"id": 7, "Full Name": "Ada"})
            .as_object()
            .cloned()
            .unwrap();
        assert!(Filter::eq("id", 7).matches(&row));
        assert!(!Filter::eq("id", "7").matches(&row));
        assert!(!Filter::eq("missing", 7).matches(&row));
    }

    #[test]
    fn test_transient_errors() {
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(StoreError::Rejected {
            status: 503,
            message: "busy".into()
        }
        .is_transient());
        assert!(!StoreError::Rejected {
            status: 403,
            message: "denied".into()
        }
        .is_transient());
        assert!(!StoreError::TableNotFound("x".into()).is_transient());
    }
}
