//! Control operations. Each returns only the downloads whose transition was
//! legal; everything else is skipped silently.

use std::io;
use std::path::Path;

use tracing::{info, warn};

use super::gate::NETWORK_PAUSE_KEY;
use super::{stop_and_emit, Fetch};
use crate::listener::FetchEvent;
use crate::model::{Download, DownloadId, DownloadRecord, Status};
use crate::storage::{self, SideFiles};

impl Fetch {
    /// Stop downloads and keep their progress for `resume`.
    pub fn pause(&self, ids: &[DownloadId]) -> Vec<Download> {
        let paused = self.transition_each(ids, Status::Paused, |_| true);
        stop_and_emit(&self.core, &self.manager, paused, FetchEvent::Paused)
    }

    /// Queue paused (or added) downloads again.
    pub fn resume(&self, ids: &[DownloadId]) -> Vec<Download> {
        let resumed = self.transition_each(ids, Status::Queued, |r| {
            matches!(r.status, Status::Paused | Status::Added)
        });
        self.emit_each(&resumed, FetchEvent::Resumed);
        self.processor.wake();
        resumed
    }

    /// Stop downloads for good. Bytes on disk are kept so `retry` can resume.
    pub fn cancel(&self, ids: &[DownloadId]) -> Vec<Download> {
        let cancelled = self.transition_each(ids, Status::Cancelled, |_| true);
        stop_and_emit(&self.core, &self.manager, cancelled, FetchEvent::Cancelled)
    }

    /// Queue failed or cancelled downloads again with a fresh retry budget.
    pub fn retry(&self, ids: &[DownloadId]) -> Vec<Download> {
        let retried = self.transition_each(ids, Status::Queued, |r| {
            if !matches!(r.status, Status::Failed | Status::Cancelled) {
                return false;
            }
            r.auto_retry_attempts = 0;
            true
        });
        self.emit_each(&retried, FetchEvent::Queued);
        self.processor.wake();
        retried
    }

    /// Stop tracking downloads. Destination files are kept.
    pub fn remove(&self, ids: &[DownloadId]) -> Vec<Download> {
        self.drop_each(ids, Status::Removed)
    }

    /// Stop tracking downloads and delete their files.
    pub fn delete(&self, ids: &[DownloadId]) -> Vec<Download> {
        self.drop_each(ids, Status::Deleted)
    }

    pub fn pause_group(&self, group: i32) -> Vec<Download> {
        self.pause(&self.group_ids(group))
    }

    pub fn resume_group(&self, group: i32) -> Vec<Download> {
        self.resume(&self.group_ids(group))
    }

    pub fn cancel_group(&self, group: i32) -> Vec<Download> {
        self.cancel(&self.group_ids(group))
    }

    pub fn retry_group(&self, group: i32) -> Vec<Download> {
        self.retry(&self.group_ids(group))
    }

    pub fn remove_group(&self, group: i32) -> Vec<Download> {
        self.remove(&self.group_ids(group))
    }

    pub fn delete_group(&self, group: i32) -> Vec<Download> {
        self.delete(&self.group_ids(group))
    }

    pub fn pause_all(&self) -> Vec<Download> {
        self.pause(&self.all_ids())
    }

    pub fn resume_all(&self) -> Vec<Download> {
        self.resume(&self.all_ids())
    }

    pub fn cancel_all(&self) -> Vec<Download> {
        self.cancel(&self.all_ids())
    }

    pub fn retry_all(&self) -> Vec<Download> {
        self.retry(&self.all_ids())
    }

    pub fn remove_all(&self) -> Vec<Download> {
        self.remove(&self.all_ids())
    }

    pub fn delete_all(&self) -> Vec<Download> {
        self.delete(&self.all_ids())
    }

    fn group_ids(&self, group: i32) -> Vec<DownloadId> {
        ids_of(self.core.query("group", self.core.store.get_by_group(group)))
    }

    fn all_ids(&self) -> Vec<DownloadId> {
        ids_of(self.core.query("all", self.core.store.get_all()))
    }

    /// Move every record in `ids` that `eligible` accepts to `next`. An
    /// explicit transition also drops any pause the network gate recorded.
    fn transition_each(
        &self,
        ids: &[DownloadId],
        next: Status,
        eligible: impl Fn(&mut DownloadRecord) -> bool,
    ) -> Vec<Download> {
        ids.iter()
            .filter_map(|&id| {
                self.core.modify(id, |r| {
                    if !r.status.can_transition_to(next) || !eligible(r) {
                        return None;
                    }
                    r.extras.remove(NETWORK_PAUSE_KEY);
                    r.transition(next).then(|| r.snapshot())
                })
            })
            .collect()
    }

    fn emit_each(&self, changed: &[Download], event: fn(Download) -> FetchEvent) {
        for d in changed {
            self.core.emit(event(d.clone()));
        }
    }

    fn drop_each(&self, ids: &[DownloadId], next: Status) -> Vec<Download> {
        let mut dropped = Vec::new();
        for &id in ids {
            let legal = self
                .core
                .get(id)
                .is_some_and(|r| r.status.can_transition_to(next));
            if !legal {
                continue;
            }
            self.manager.cancel(id);

            let record = {
                let _guard = self.core.lock();
                let Some(record) = self.core.get(id) else {
                    continue;
                };
                if !record.status.can_transition_to(next) {
                    continue;
                }
                if let Err(e) = self.core.store.delete(id) {
                    warn!(id, error = %e, "deleting record failed");
                    continue;
                }
                record
            };

            let side = SideFiles::new(&self.core.settings.temp_dir, id);
            if let Err(e) = side.clear() {
                warn!(id, error = %e, "clearing slice files failed");
            }
            if next == Status::Deleted {
                remove_if_present(&record.file);
                remove_if_present(&storage::temp_path(&record.file));
            }

            let mut d = record.snapshot();
            d.status = next;
            info!(id, status = %next, file = %d.file.display(), "download dropped");
            self.core.emit(if next == Status::Deleted {
                FetchEvent::Deleted(d.clone())
            } else {
                FetchEvent::Removed(d.clone())
            });
            dropped.push(d);
        }
        dropped
    }
}

fn ids_of(records: Vec<DownloadRecord>) -> Vec<DownloadId> {
    records.into_iter().map(|r| r.id).collect()
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "removing file failed"),
    }
}
