//! Disk I/O for transfers: positional writes into the destination, side files
//! that let slices resume independently, and the chunk merge with its atomic
//! `.part` rename.

mod builder;
mod merge;
mod side;
mod writer;

use std::io;
use std::path::{Path, PathBuf};

pub use builder::StorageWriterBuilder;
pub use merge::merge_chunks;
pub use side::SideFiles;
pub use writer::StorageWriter;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// `file.iso` → `file.iso.part`
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Length of a file on disk, 0 when it does not exist.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Destination a parallel strategy can write slices into. The default is the
/// destination file itself; a transport may hand out its own.
pub trait OutputResource: Send + Sync {
    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Called once with the total length before any slice writes.
    fn set_len(&self, _len: u64) -> io::Result<()> {
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Create the parent directory of `file` if it is missing.
pub fn ensure_parent(file: &Path) -> io::Result<()> {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
