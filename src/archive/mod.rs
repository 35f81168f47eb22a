pub mod listener;
pub mod state;
pub mod workflow;

pub use listener::{ArchiveListener, ArchiveOutcome, LogListener, Notice};
pub use state::ArchiveState;
pub use workflow::{ArchiveError, ArchiveOptions, ArchiveSession, ArchiveWorkflow};
