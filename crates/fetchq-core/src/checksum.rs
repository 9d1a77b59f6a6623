//! SHA-256 content checksums, computed on demand after a transfer finishes.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// SHA-256 of a file as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Lowercase and trim a checksum so server-supplied values compare cleanly.
pub fn normalize(checksum: &str) -> String {
    checksum.trim().to_ascii_lowercase()
}

/// True if the file's SHA-256 equals `expected` (case-insensitive hex).
pub fn file_matches(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha256_path(path)? == normalize(expected))
}
