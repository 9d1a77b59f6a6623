//! Stable download ids derived from url + destination path.

use std::path::Path;

use super::download::DownloadId;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Id for a (url, file) pair. Stable across processes and always positive.
pub fn download_id(url: &str, file: &Path) -> DownloadId {
    let mut hash = fnv1a(FNV_OFFSET, url.as_bytes());
    hash = fnv1a(hash, &[0]);
    hash = fnv1a(hash, file.as_os_str().to_string_lossy().as_bytes());
    (hash & (i64::MAX as u64)) as i64
}
