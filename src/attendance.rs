// src/attendance.rs

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use crate::month::MonthTable;
use crate::normalize::AttendanceStatus;
use crate::schema::AttendanceColumn;
use crate::store::{BackingStore, Filter, Row, StoreError};

/// Column that identifies a member row.
pub const MEMBER_ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkError {
    #[error("{date} is not in {table}")]
    OutsideMonth { table: MonthTable, date: NaiveDate },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Set one member's attendance for `date`. `None` clears the mark.
#[instrument(level = "info", skip(store, member), fields(table = %table, %date))]
pub async fn mark(
    store: &dyn BackingStore,
    table: &MonthTable,
    member: Value,
    date: NaiveDate,
    status: Option<AttendanceStatus>,
) -> Result<String, MarkError> {
    if !table.contains(date) {
        return Err(MarkError::OutsideMonth {
            table: *table,
            date,
        });
    }

    let column = AttendanceColumn::canonical_key(date);
    let mut patch = Row::new();
    patch.insert(
        column.clone(),
        status.map_or(Value::Null, |s| Value::from(s.as_str())),
    );

    store
        .update(
            &table.table_name(),
            &Filter::eq(MEMBER_ID_COLUMN, member),
            &patch,
        )
        .await?;
    info!(%column, status = status.map_or("unmarked", |s| s.as_str()), "attendance marked");
    Ok(column)
}
