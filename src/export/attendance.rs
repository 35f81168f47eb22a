use tracing::debug;

use crate::month::MonthTable;
use crate::normalize::AttendanceStatus;
use crate::schema::{resolve_text, AttendanceColumn, AttendanceDate, MemberField};
use crate::store::Row;

/// One marked attendance cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: AttendanceDate,
    pub status: AttendanceStatus,
    /// Table the mark came from, when known.
    pub origin: Option<MonthTable>,
}

/// Pull every present/absent mark out of `rows`, sorted by member name, then date.
/// Unmarked cells (null, empty, placeholders) are skipped, never defaulted.
pub fn extract_records<'a, I>(rows: I) -> Vec<AttendanceRecord>
where
    I: IntoIterator<Item = (&'a Row, Option<&'a MonthTable>)>,
{
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (row, origin) in rows {
        let name = resolve_text(row, MemberField::FullName.label());
        for (key, value) in row {
            let Some(column) = AttendanceColumn::parse(key) else {
                continue;
            };
            match AttendanceStatus::from_value(value) {
                Some(status) => records.push(AttendanceRecord {
                    name: name.clone(),
                    date: column.date.resolve(origin),
                    status,
                    origin: origin.copied(),
                }),
                None => skipped += 1,
            }
        }
    }

    records.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.date.cmp(&b.date))
            .then(a.origin.cmp(&b.origin))
    });
    debug!(records = records.len(), unmarked = skipped, "extracted attendance");
    records
}
