// src/schema/classify.rs

use std::collections::BTreeSet;
use tracing::debug;

use super::types::{AttendanceColumn, MemberField};
use crate::store::Row;

/// Columns of a row set, split into fixed member fields, attendance dates and
/// anything else (ids, timestamps, ...), which is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedColumns {
    /// Member fields present under any naming convention, in `MemberField` order.
    pub fixed_fields: Vec<MemberField>,
    /// Ascending, which is chronological.
    pub attendance_columns: Vec<AttendanceColumn>,
    /// Ascending by key.
    pub passthrough: Vec<String>,
}

impl ClassifiedColumns {
    pub fn attendance_keys(&self) -> Vec<&str> {
        self.attendance_columns
            .iter()
            .map(|c| c.key.as_str())
            .collect()
    }

    /// Output columns covering every classified column: fixed field labels,
    /// then attendance keys, then pass-through keys.
    pub fn export_columns(&self) -> Vec<String> {
        self.fixed_fields
            .iter()
            .map(|f| f.label().to_string())
            .chain(self.attendance_columns.iter().map(|c| c.key.clone()))
            .chain(self.passthrough.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fixed_fields.len() + self.attendance_columns.len() + self.passthrough.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classify the union of keys over *all* rows; rows are sparse, so the first
/// row alone would miss attendance dates recorded only for some members.
pub fn classify(rows: &[Row]) -> ClassifiedColumns {
    let keys: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();

    let mut fixed: BTreeSet<MemberField> = BTreeSet::new();
    let mut attendance = Vec::new();
    let mut passthrough = Vec::new();

    for key in keys {
        if let Some(col) = AttendanceColumn::parse(key) {
            attendance.push(col);
        } else if let Some(field) = MemberField::from_key(key) {
            fixed.insert(field);
        } else {
            passthrough.push(key.to_string());
        }
    }
    attendance.sort();

    debug!(
        fixed = fixed.len(),
        attendance = attendance.len(),
        passthrough = passthrough.len(),
        "classified columns"
    );

    ClassifiedColumns {
        fixed_fields: fixed.into_iter().collect(),
        attendance_columns: attendance,
        passthrough,
    }
}
