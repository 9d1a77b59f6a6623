//! Per-download side files kept next to a parallel transfer:
//!
//! - `<id>.meta.txt`: slice count the partial state was produced with
//! - `<id>.<position>.txt`: bytes finished for one slice
//! - `<id>.<position>.tmp`: chunk body (chunked strategy only)
//!
//! All of them live in one directory shared by every download.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::DownloadId;

#[derive(Debug, Clone)]
pub struct SideFiles {
    dir: PathBuf,
    id: DownloadId,
}

impl SideFiles {
    pub fn new(dir: &Path, id: DownloadId) -> Self {
        Self {
            dir: dir.to_path_buf(),
            id,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{}.meta.txt", self.id))
    }

    pub fn progress_path(&self, position: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.txt", self.id, position))
    }

    pub fn chunk_path(&self, position: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.tmp", self.id, position))
    }

    /// Slice count recorded by an earlier run, if any.
    pub fn read_slice_count(&self) -> Option<usize> {
        read_number(&self.meta_path()).map(|n| n as usize)
    }

    pub fn write_slice_count(&self, count: usize) -> io::Result<()> {
        fs::write(self.meta_path(), count.to_string())
    }

    /// Bytes finished for a slice; 0 when there is no readable record.
    pub fn read_slice_progress(&self, position: usize) -> u64 {
        read_number(&self.progress_path(position)).unwrap_or(0)
    }

    pub fn write_slice_progress(&self, position: usize, downloaded: u64) -> io::Result<()> {
        fs::write(self.progress_path(position), downloaded.to_string())
    }

    /// Current length of a chunk temp file (0 if missing).
    pub fn chunk_len(&self, position: usize) -> u64 {
        fs::metadata(self.chunk_path(position))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Make sure the recorded slice count matches `count`. A mismatch (or no
    /// record at all) throws away every side file of this download and records
    /// the new count. Returns true if old state was kept.
    pub fn reconcile_slice_count(&self, count: usize) -> io::Result<bool> {
        self.ensure_dir()?;
        if self.read_slice_count() == Some(count) {
            return Ok(true);
        }
        self.clear()?;
        self.write_slice_count(count)?;
        Ok(false)
    }

    /// Remove every side file belonging to this download.
    pub fn clear(&self) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let prefix = format!("{}.", self.id);
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

fn read_number(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
