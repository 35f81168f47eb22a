use serde_json::{Number, Value};

use crate::store::Row;

/// Lowercase, trimmed, spaces → underscores: `Full Name` → `full_name`.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(' ', "_")
}

/// Look `column` up in `row`, in order:
///  1. the exact key
///  2. the normalized key
///  3. any row key whose normalized form equals the normalized column
///
/// `None` means the row has no such column; callers render it as empty.
pub fn resolve<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
    if let Some(v) = row.get(column) {
        return Some(v);
    }
    let normalized = normalize_key(column);
    if let Some(v) = row.get(&normalized) {
        return Some(v);
    }
    row.iter()
        .find(|(k, _)| normalize_key(k) == normalized)
        .map(|(_, v)| v)
}

/// Text of a scalar cell. `None` for objects and arrays, which have no cell form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_text(n)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Integral floats lose their `.0`, so `8035550102.0` stays a phone number.
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// Resolved scalar text, trimmed; empty when missing or not a scalar.
pub fn resolve_text(row: &Row, column: &str) -> String {
    resolve(row, column)
        .and_then(scalar_text)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
