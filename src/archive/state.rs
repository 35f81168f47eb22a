use std::fmt;

/// Where an archive session stands. Moves forward only through
/// `Summary → Confirm → Archiving → Done`, with `Confirm → Summary` on cancel and
/// `Archiving → Confirm` when the delete fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveState {
    Summary,
    Confirm,
    Archiving,
    Done,
}

impl ArchiveState {
    pub fn as_str(&self) -> &str {
        match self {
            ArchiveState::Summary => "summary",
            ArchiveState::Confirm => "confirm",
            ArchiveState::Archiving => "archiving",
            ArchiveState::Done => "done",
        }
    }

    /// Whether the CSV may be generated and saved in this state.
    pub fn allows_download(&self) -> bool {
        matches!(self, ArchiveState::Summary | ArchiveState::Confirm)
    }

    pub fn can_transition_to(&self, next: ArchiveState) -> bool {
        use ArchiveState::*;
        matches!(
            (self, next),
            (Summary, Confirm)
                | (Confirm, Summary)
                | (Confirm, Archiving)
                | (Archiving, Done)
                | (Archiving, Confirm)
        )
    }
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
