//! Slice type and range planning.

use crate::model::DownloadId;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// One contiguous byte range `[start, end)` of a download, fetched by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    /// Owning download.
    pub id: DownloadId,
    /// Zero-based index in the plan; also keys the slice's side files.
    pub position: usize,
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
    /// Bytes of this slice already on disk.
    pub downloaded: u64,
}

impl Slice {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.downloaded)
    }

    pub fn is_done(&self) -> bool {
        self.downloaded >= self.len()
    }

    /// Absolute offset of the next byte to fetch.
    pub fn next_offset(&self) -> u64 {
        self.start + self.downloaded.min(self.len())
    }

    /// HTTP Range header value for the bytes still missing (inclusive end).
    pub fn range_header_value(&self) -> String {
        if self.is_done() {
            format!("bytes={}-{}", self.end.saturating_sub(1), self.end.saturating_sub(1))
        } else {
            format!("bytes={}-{}", self.next_offset(), self.end - 1)
        }
    }
}

/// Default slice count by content length: one slice under 1 MiB, two under
/// 1 GiB, four above.
pub fn slice_count_for_length(total: u64) -> usize {
    if total < MIB {
        1
    } else if total < GIB {
        2
    } else {
        4
    }
}

/// Partition `[0, total)` into at most `count` contiguous slices of
/// `ceil(total / count)` bytes; the last slice takes what is left.
///
/// Empty tails are dropped, so fewer than `count` slices come back when
/// `count` does not divide evenly into tiny totals. A zero total or count
/// yields no slices.
pub fn plan_slices(id: DownloadId, total: u64, count: usize) -> Vec<Slice> {
    if total == 0 || count == 0 {
        return Vec::new();
    }
    let count = (count as u64).min(total);
    let per_slice = total.div_ceil(count);

    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total && (out.len() as u64) < count {
        let last = out.len() as u64 == count - 1;
        let end = if last { total } else { (offset + per_slice).min(total) };
        out.push(Slice {
            id,
            position: out.len(),
            start: offset,
            end,
            downloaded: 0,
        });
        offset = end;
    }
    out
}
