//! Checksum command: compute SHA-256 of a file.

use std::path::Path;

use anyhow::{bail, Result};
use fetchq_core::checksum;

/// Compute and print SHA-256 of the given file; compare when `expect` is set.
pub fn run_checksum(path: &Path, expect: Option<&str>) -> Result<()> {
    let digest = checksum::sha256_path(path)?;
    println!("{}  {}", digest, path.display());
    if let Some(expected) = expect {
        if checksum::normalize(expected) != digest {
            bail!("checksum mismatch for {}", path.display());
        }
    }
    Ok(())
}
