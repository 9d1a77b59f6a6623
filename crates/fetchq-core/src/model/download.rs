//! Mutable download record and its immutable snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::error::DownloadError;
use super::id::download_id;
use super::request::Request;
use super::status::Status;
use super::types::{EnqueueAction, NetworkType, Priority};

/// Download identifier (see [`download_id`]).
pub type DownloadId = i64;

/// `total` value meaning "length not known yet".
pub const UNKNOWN_TOTAL: i64 = -1;

/// Durable, authoritative state of one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub namespace: String,
    pub url: String,
    pub file: PathBuf,
    pub group: i32,
    pub priority: Priority,
    pub headers: BTreeMap<String, String>,
    pub downloaded: u64,
    pub total: i64,
    pub status: Status,
    pub error: DownloadError,
    pub network_type: NetworkType,
    /// Creation time, Unix milliseconds.
    pub created: i64,
    pub tag: Option<String>,
    pub enqueue_action: EnqueueAction,
    pub download_on_enqueue: bool,
    pub auto_retry_max_attempts: u32,
    pub auto_retry_attempts: u32,
    pub extras: BTreeMap<String, String>,
}

impl DownloadRecord {
    /// Build a fresh record for `request`. Status is `Queued`, or `Added` when the
    /// request opted out of immediate scheduling.
    pub fn from_request(
        request: &Request,
        namespace: &str,
        created: i64,
        default_auto_retry: u32,
    ) -> Self {
        let status = if request.download_on_enqueue {
            Status::Queued
        } else {
            Status::Added
        };
        Self {
            id: download_id(&request.url, &request.file),
            namespace: namespace.to_string(),
            url: request.url.clone(),
            file: request.file.clone(),
            group: request.group,
            priority: request.priority,
            headers: request.headers.clone(),
            downloaded: 0,
            total: UNKNOWN_TOTAL,
            status,
            error: DownloadError::None,
            network_type: request.network_type,
            created,
            tag: request.tag.clone(),
            enqueue_action: request.enqueue_action,
            download_on_enqueue: request.download_on_enqueue,
            auto_retry_max_attempts: request
                .auto_retry_max_attempts
                .unwrap_or(default_auto_retry),
            auto_retry_attempts: 0,
            extras: request.extras.clone(),
        }
    }

    /// Point-in-time view of this record.
    pub fn snapshot(&self) -> Download {
        Download {
            id: self.id,
            namespace: self.namespace.clone(),
            url: self.url.clone(),
            file: self.file.clone(),
            group: self.group,
            priority: self.priority,
            headers: self.headers.clone(),
            downloaded: self.downloaded,
            total: self.total,
            status: self.status,
            error: self.error,
            network_type: self.network_type,
            created: self.created,
            tag: self.tag.clone(),
            enqueue_action: self.enqueue_action,
            auto_retry_attempts: self.auto_retry_attempts,
            extras: self.extras.clone(),
            eta_ms: -1,
            bytes_per_second: 0,
        }
    }

    /// Apply a legal status change. Returns false (and changes nothing) otherwise.
    pub fn transition(&mut self, next: Status) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next != Status::Failed {
            self.error = DownloadError::None;
        }
        true
    }

    /// Copy byte counters reported by a strategy, clamping `downloaded` to a known total.
    pub fn apply_counters(&mut self, downloaded: u64, total: i64) {
        self.total = total;
        self.downloaded = if total >= 0 {
            downloaded.min(total as u64)
        } else {
            downloaded
        };
    }
}

/// Immutable point-in-time view of one transfer, handed to strategies and listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub id: DownloadId,
    pub namespace: String,
    pub url: String,
    pub file: PathBuf,
    pub group: i32,
    pub priority: Priority,
    pub headers: BTreeMap<String, String>,
    pub downloaded: u64,
    pub total: i64,
    pub status: Status,
    pub error: DownloadError,
    pub network_type: NetworkType,
    pub created: i64,
    pub tag: Option<String>,
    pub enqueue_action: EnqueueAction,
    pub auto_retry_attempts: u32,
    pub extras: BTreeMap<String, String>,
    /// Estimated time remaining in milliseconds, -1 when unknown.
    pub eta_ms: i64,
    pub bytes_per_second: i64,
}

impl Download {
    pub fn is_total_known(&self) -> bool {
        self.total >= 0
    }

    /// Percent complete in `0..=100`, or -1 while the total is unknown.
    pub fn progress(&self) -> i32 {
        if self.total < 1 {
            return if self.total == 0 && self.status == Status::Completed {
                100
            } else {
                -1
            };
        }
        if self.downloaded >= self.total as u64 {
            return 100;
        }
        ((self.downloaded as f64 / self.total as f64) * 100.0) as i32
    }

    /// Copy of this snapshot with new byte counters.
    pub fn with_counters(&self, downloaded: u64, total: i64) -> Download {
        let mut next = self.clone();
        next.total = total;
        next.downloaded = if total >= 0 {
            downloaded.min(total as u64)
        } else {
            downloaded
        };
        next
    }

    /// Copy of this snapshot carrying throughput figures.
    pub fn with_rate(&self, eta_ms: i64, bytes_per_second: i64) -> Download {
        let mut next = self.clone();
        next.eta_ms = eta_ms;
        next.bytes_per_second = bytes_per_second;
        next
    }
}
