pub mod classify;
pub mod resolve;
pub mod types;

pub use classify::{classify, ClassifiedColumns};
pub use resolve::{normalize_key, resolve, resolve_text, scalar_text};
pub use types::{AttendanceColumn, AttendanceDate, MemberField};
