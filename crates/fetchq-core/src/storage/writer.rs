//! Positional writer shared by every worker of one download.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::OutputResource;

/// Writer for a download's output file. Cheap to clone; each `write_at` is an
/// independent positional write, so slice workers can share one handle.
#[derive(Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    path: PathBuf,
}

impl StorageWriter {
    pub(crate) fn from_file_and_path(file: File, path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            path,
        }
    }

    /// Open (creating if needed) without truncating, so bytes from an earlier
    /// run stay in place.
    pub fn open_or_create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::from_file_and_path(file, path.to_path_buf()))
    }

    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(data, offset)
    }

    #[cfg(windows)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut written = 0;
        while written < data.len() {
            let n = self
                .file
                .seek_write(&data[written..], offset + written as u64)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "short write"));
            }
            written += n;
        }
        Ok(())
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the file to `final_path`, consuming the writer. Both paths must
    /// be on the same filesystem.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let path = self.path.clone();
        drop(self.file);
        std::fs::rename(&path, final_path)
    }
}

impl OutputResource for StorageWriter {
    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        StorageWriter::write_at(self, offset, data)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        StorageWriter::set_len(self, len)
    }

    fn flush(&self) -> io::Result<()> {
        self.sync()
    }
}
