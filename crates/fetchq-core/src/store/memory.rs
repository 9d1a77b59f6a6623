use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use super::DownloadStore;
use crate::model::{DownloadId, DownloadRecord};

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<DownloadId, DownloadRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<DownloadId, DownloadRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DownloadStore for MemoryStore {
    fn insert(&self, record: &DownloadRecord) -> Result<bool> {
        let mut records = self.records();
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(record.id, record.clone());
        Ok(true)
    }

    fn update(&self, record: &DownloadRecord) -> Result<()> {
        if let Some(slot) = self.records().get_mut(&record.id) {
            *slot = record.clone();
        }
        Ok(())
    }

    fn delete(&self, id: DownloadId) -> Result<()> {
        self.records().remove(&id);
        Ok(())
    }

    fn get(&self, id: DownloadId) -> Result<Option<DownloadRecord>> {
        Ok(self.records().get(&id).cloned())
    }

    fn get_all(&self) -> Result<Vec<DownloadRecord>> {
        let mut all: Vec<_> = self.records().values().cloned().collect();
        all.sort_by_key(|r| (r.created, r.id));
        Ok(all)
    }
}
