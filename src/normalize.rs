use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Case-insensitive: `m`/`male` and `f`/`female`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" => Some(Gender::Male),
            "f" | "female" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

/// Recognized attendance marks. Anything else is unmarked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    /// `true`/`"Present"`/`"P"` and `false`/`"Absent"`/`"A"`, strings in any case.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(AttendanceStatus::Present),
            Value::Bool(false) => Some(AttendanceStatus::Absent),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "present" | "p" => Some(AttendanceStatus::Present),
                "absent" | "a" => Some(AttendanceStatus::Absent),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digits only, with a leading `0`. Empty in, empty out.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.starts_with('0') {
        digits
    } else {
        format!("0{}", digits)
    }
}

/// `normalize_phone`, wrapped as a text formula so spreadsheets keep the zero.
pub fn spreadsheet_phone(raw: &str) -> String {
    let phone = normalize_phone(raw);
    if phone.is_empty() {
        phone
    } else {
        format!("=\"{}\"", phone)
    }
}

/// `Male`/`Female` for recognized values, otherwise the input unchanged.
pub fn normalize_gender(raw: &str) -> String {
    match Gender::parse(raw) {
        Some(g) => g.as_str().to_string(),
        None => raw.to_string(),
    }
}
