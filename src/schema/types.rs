// src/schema/types.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use super::resolve::normalize_key;
use crate::month::MonthTable;

static CANONICAL_ATTENDANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^attendance_(\d{4})_(\d{2})_(\d{2})$").unwrap());
static LEGACY_ATTENDANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^attendance (\d{1,2})$").unwrap());

/// The fixed member columns every monthly table carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberField {
    FullName,
    Gender,
    PhoneNumber,
    Age,
    Level,
    ParentName,
    ParentPhone,
}

impl MemberField {
    pub const ALL: [MemberField; 7] = [
        MemberField::FullName,
        MemberField::Gender,
        MemberField::PhoneNumber,
        MemberField::Age,
        MemberField::Level,
        MemberField::ParentName,
        MemberField::ParentPhone,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MemberField::FullName => "Full Name",
            MemberField::Gender => "Gender",
            MemberField::PhoneNumber => "Phone Number",
            MemberField::Age => "Age",
            MemberField::Level => "Level",
            MemberField::ParentName => "Parent Name",
            MemberField::ParentPhone => "Parent Phone",
        }
    }

    /// Matches either naming convention, e.g. `Full Name` or `full_name`.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = normalize_key(key);
        Self::ALL
            .into_iter()
            .find(|f| normalize_key(f.label()) == key)
    }

    pub fn is_phone(&self) -> bool {
        matches!(self, MemberField::PhoneNumber | MemberField::ParentPhone)
    }
}

/// Date encoded in an attendance column name.
/// Calendar dates order before bare day numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttendanceDate {
    Calendar { year: u32, month: u32, day: u32 },
    /// Legacy `Attendance <n>` column whose month is only known from its table.
    Day(u32),
}

impl AttendanceDate {
    /// Fill in the month of a bare day number when the origin table is known.
    pub fn resolve(self, table: Option<&MonthTable>) -> Self {
        match (self, table) {
            (AttendanceDate::Day(day), Some(t)) if t.date_for_day(day).is_some() => {
                AttendanceDate::Calendar {
                    year: t.year() as u32,
                    month: t.month(),
                    day,
                }
            }
            (date, _) => date,
        }
    }
}

impl fmt::Display for AttendanceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceDate::Calendar { year, month, day } => {
                write!(f, "{:04}-{:02}-{:02}", year, month, day)
            }
            AttendanceDate::Day(day) => write!(f, "Day {}", day),
        }
    }
}

/// A column whose key encodes a service date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttendanceColumn {
    pub date: AttendanceDate,
    pub key: String,
}

impl AttendanceColumn {
    /// `Some` iff `key` is `attendance_YYYY_MM_DD` or `Attendance <day>`.
    pub fn parse(key: &str) -> Option<Self> {
        if let Some(caps) = CANONICAL_ATTENDANCE.captures(key) {
            return Some(Self {
                date: AttendanceDate::Calendar {
                    year: caps[1].parse().ok()?,
                    month: caps[2].parse().ok()?,
                    day: caps[3].parse().ok()?,
                },
                key: key.to_string(),
            });
        }
        let caps = LEGACY_ATTENDANCE.captures(key)?;
        Some(Self {
            date: AttendanceDate::Day(caps[1].parse().ok()?),
            key: key.to_string(),
        })
    }

    pub fn canonical_key(date: chrono::NaiveDate) -> String {
        date.format("attendance_%Y_%m_%d").to_string()
    }
}
