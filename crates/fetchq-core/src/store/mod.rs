//! Persistence of download records.
//!
//! The engine only needs per-call atomic CRUD over [`DownloadRecord`]s; two
//! backends are provided: [`MemoryStore`] and the SQLite-backed [`SqliteStore`].

mod memory;
mod sqlite;

use std::path::Path;

use anyhow::Result;

use crate::model::{DownloadId, DownloadRecord, Status};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub trait DownloadStore: Send + Sync {
    /// Insert a new record. Returns false if the id is already stored.
    fn insert(&self, record: &DownloadRecord) -> Result<bool>;

    /// Overwrite an existing record. Missing ids are ignored.
    fn update(&self, record: &DownloadRecord) -> Result<()>;

    fn delete(&self, id: DownloadId) -> Result<()>;

    fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>>;

    /// Records for `ids` that exist, in the order given.
    fn get_many(&self, ids: &[DownloadId]) -> Result<Vec<DownloadRecord>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.get(*id)? {
                out.push(r);
            }
        }
        Ok(out)
    }

    /// Every record, oldest first.
    fn get_all(&self) -> Result<Vec<DownloadRecord>>;

    /// Records in any of `statuses`, oldest first.
    fn get_by_status(&self, statuses: &[Status]) -> Result<Vec<DownloadRecord>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|r| statuses.contains(&r.status))
            .collect())
    }

    fn get_by_group(&self, group: i32) -> Result<Vec<DownloadRecord>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|r| r.group == group)
            .collect())
    }

    /// The record writing to `file`, if any.
    fn get_by_file(&self, file: &Path) -> Result<Option<DownloadRecord>> {
        Ok(self.get_all()?.into_iter().find(|r| r.file == file))
    }

    /// Put records stranded in `Downloading` (process died mid-transfer) back
    /// in the queue. Returns how many were reset.
    fn recover_interrupted(&self) -> Result<u64> {
        let mut n = 0;
        for mut r in self.get_by_status(&[Status::Downloading])? {
            if r.transition(Status::Queued) {
                self.update(&r)?;
                n += 1;
            }
        }
        Ok(n)
    }
}

impl<S: DownloadStore + ?Sized> DownloadStore for std::sync::Arc<S> {
    fn insert(&self, record: &DownloadRecord) -> Result<bool> {
        (**self).insert(record)
    }

    fn update(&self, record: &DownloadRecord) -> Result<()> {
        (**self).update(record)
    }

    fn delete(&self, id: DownloadId) -> Result<()> {
        (**self).delete(id)
    }

    fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>> {
        (**self).get(id)
    }

    fn get_many(&self, ids: &[DownloadId]) -> Result<Vec<DownloadRecord>> {
        (**self).get_many(ids)
    }

    fn get_all(&self) -> Result<Vec<DownloadRecord>> {
        (**self).get_all()
    }

    fn get_by_status(&self, statuses: &[Status]) -> Result<Vec<DownloadRecord>> {
        (**self).get_by_status(statuses)
    }

    fn get_by_group(&self, group: i32) -> Result<Vec<DownloadRecord>> {
        (**self).get_by_group(group)
    }

    fn get_by_file(&self, file: &Path) -> Result<Option<DownloadRecord>> {
        (**self).get_by_file(file)
    }

    fn recover_interrupted(&self) -> Result<u64> {
        (**self).recover_interrupted()
    }
}
