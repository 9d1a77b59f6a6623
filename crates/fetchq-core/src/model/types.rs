//! Small enums carried on requests and records.

use serde::{Deserialize, Serialize};

/// Scheduling priority; higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn value(self) -> i32 {
        match self {
            Priority::Low => -1,
            Priority::Normal => 0,
            Priority::High => 1,
        }
    }

    pub fn from_value(v: i32) -> Self {
        match v {
            i32::MIN..=-1 => Priority::Low,
            0 => Priority::Normal,
            _ => Priority::High,
        }
    }
}

/// Network a download requires before the scheduler may start it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// Any connection will do.
    #[default]
    All,
    /// Only an unmetered connection (e.g. Wi-Fi, ethernet).
    Unmetered,
}

impl NetworkType {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkType::All => "all",
            NetworkType::Unmetered => "unmetered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(NetworkType::All),
            "unmetered" => Some(NetworkType::Unmetered),
            _ => None,
        }
    }

    /// True if `current` connectivity satisfies this requirement.
    pub fn is_satisfied_by(self, current: Connectivity) -> bool {
        match (self, current) {
            (_, Connectivity::None) => false,
            (NetworkType::All, _) => true,
            (NetworkType::Unmetered, Connectivity::Unmetered) => true,
            (NetworkType::Unmetered, Connectivity::Metered) => false,
        }
    }
}

/// Current connectivity as reported by a network info provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    None,
    Metered,
    Unmetered,
}

impl Connectivity {
    pub fn is_connected(self) -> bool {
        self != Connectivity::None
    }
}

/// What to do when a request maps onto an already tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueAction {
    /// Cancel and delete the existing download and its file, then enqueue.
    ReplaceExisting,
    /// Keep the existing download; enqueue under the next free `name (n).ext`.
    IncrementFileName,
    /// Reject the request.
    DoNotEnqueueIfExisting,
    /// Re-queue the existing download unless it already completed.
    #[default]
    UpdateAccordingly,
}

impl EnqueueAction {
    pub fn as_str(self) -> &'static str {
        match self {
            EnqueueAction::ReplaceExisting => "replace_existing",
            EnqueueAction::IncrementFileName => "increment_file_name",
            EnqueueAction::DoNotEnqueueIfExisting => "do_not_enqueue_if_existing",
            EnqueueAction::UpdateAccordingly => "update_accordingly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "replace_existing" => Some(EnqueueAction::ReplaceExisting),
            "increment_file_name" => Some(EnqueueAction::IncrementFileName),
            "do_not_enqueue_if_existing" => Some(EnqueueAction::DoNotEnqueueIfExisting),
            "update_accordingly" => Some(EnqueueAction::UpdateAccordingly),
            _ => None,
        }
    }
}

/// Tie-break order by creation time among equal priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Earliest created first.
    #[default]
    Asc,
    /// Latest created first.
    Desc,
}
