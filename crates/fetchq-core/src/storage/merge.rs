//! Concatenation of chunk temp files into the destination.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use super::side::SideFiles;
use super::{temp_path, StorageWriterBuilder};
use crate::retry::TransferError;
use crate::segmenter::Slice;

/// Concatenate the chunk temp files of `slices` (in position order) into
/// `dest`, then delete them.
///
/// Each temp file must be exactly its chunk's length and the merged file must
/// be exactly `total` bytes; a mismatch fails the merge and leaves the temp
/// files untouched so a retry can pick them up.
pub fn merge_chunks(
    slices: &[Slice],
    side: &SideFiles,
    dest: &Path,
    total: u64,
) -> Result<(), TransferError> {
    let mut ordered: Vec<&Slice> = slices.iter().collect();
    ordered.sort_by_key(|s| s.position);

    for s in &ordered {
        let on_disk = side.chunk_len(s.position);
        if on_disk != s.len() {
            return Err(TransferError::Merge(format!(
                "chunk {} has {} of {} bytes",
                s.position,
                on_disk,
                s.len()
            )));
        }
    }

    let part = temp_path(dest);
    let writer = StorageWriterBuilder::create(&part)?.build();
    {
        let mut out = File::options().write(true).open(writer.path())?;
        for s in &ordered {
            let mut chunk = File::open(side.chunk_path(s.position))?;
            io::copy(&mut chunk, &mut out)?;
        }
    }
    writer.sync()?;
    let merged = writer.len()?;
    if merged != total {
        let _ = fs::remove_file(&part);
        return Err(TransferError::Merge(format!(
            "merged {merged} bytes, expected {total}"
        )));
    }
    writer.finalize(dest)?;

    for s in &ordered {
        if let Err(e) = fs::remove_file(side.chunk_path(s.position)) {
            tracing::debug!(position = s.position, error = %e, "leaving chunk temp behind");
        }
    }
    Ok(())
}
