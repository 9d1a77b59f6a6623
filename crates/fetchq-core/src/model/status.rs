//! Download status and the legal transitions between states.

use serde::{Deserialize, Serialize};

/// Discrete lifecycle state of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Tracked but not scheduled until resumed.
    Added,
    Queued,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Failed,
    Removed,
    Deleted,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Added => "added",
            Status::Queued => "queued",
            Status::Downloading => "downloading",
            Status::Paused => "paused",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
            Status::Failed => "failed",
            Status::Removed => "removed",
            Status::Deleted => "deleted",
        }
    }

    /// Parse a stored status string. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let status = match s {
            "added" => Status::Added,
            "queued" => Status::Queued,
            "downloading" => Status::Downloading,
            "paused" => Status::Paused,
            "completed" => Status::Completed,
            "cancelled" => Status::Cancelled,
            "failed" => Status::Failed,
            "removed" => Status::Removed,
            "deleted" => Status::Deleted,
            _ => return None,
        };
        Some(status)
    }

    /// Terminal states never transition again except to removal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Removed | Status::Deleted)
    }

    /// True while a strategy may be writing bytes for this download.
    pub fn is_active(self) -> bool {
        matches!(self, Status::Queued | Status::Downloading)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Anything not listed here is rejected; callers treat a rejected
    /// transition as a silent no-op.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        match (self, next) {
            (Added, Queued) => true,
            (Queued, Downloading) => true,
            (Queued | Added, Paused) => true,
            (Downloading, Paused | Completed | Failed) => true,
            // network wait, auto retry and crash recovery put work back in line
            (Downloading, Queued) => true,
            (Paused, Queued) => true,
            (Failed | Cancelled, Queued) => true,
            (from, Cancelled) => from != Cancelled && !from.is_terminal(),
            (Removed | Deleted, Removed | Deleted) => false,
            (_, Removed | Deleted) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
