//! Creating and preallocating output files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::writer::StorageWriter;

/// Builder for an output file. Call `preallocate` then `build` to get a
/// `StorageWriter` that supports concurrent `write_at`.
pub struct StorageWriterBuilder {
    file: File,
    path: PathBuf,
}

impl StorageWriterBuilder {
    /// Create `path`, truncating whatever is there.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open `path` keeping existing contents (resume).
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Make the file exactly `size` bytes. Existing bytes below `size` are kept.
    /// On Linux, blocks are reserved with `posix_fallocate` first; `set_len`
    /// covers other platforms and shrinks oversized leftovers.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::io::AsRawFd;
            if size > 0 {
                let fd = self.file.as_raw_fd();
                // SAFETY: fd is owned by self.file and open for writing.
                let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
                if r == libc::ENOSPC {
                    return Err(io::Error::from_raw_os_error(r));
                }
                if r != 0 {
                    tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
                }
            }
        }
        if self.file.metadata()?.len() != size {
            self.file.set_len(size)?;
        }
        Ok(())
    }

    pub fn build(self) -> StorageWriter {
        StorageWriter::from_file_and_path(self.file, self.path)
    }
}
