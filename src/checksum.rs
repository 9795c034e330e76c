//! SHA-256 sidecar files.
//!
//! Sidecars use the `sha256sum` text format, `<hash>  <name>` with two
//! spaces, so users can verify downloads with `sha256sum -c`.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Suffix appended to an artifact's file name to name its sidecar.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Write `<path>.sha256` recording `path` as the checksummed name.
pub fn checksum(path: &Path) -> Result<PathBuf> {
    checksum_named(path, path)
}

/// Write `<path>.sha256`, recording `recorded_name` in the sidecar.
///
/// The recorded name is what `sha256sum -c` will look for, so callers pass
/// the path relative to the directory users download into.
pub fn checksum_named(path: &Path, recorded_name: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        bail!("cannot checksum missing file {}", path.display());
    }

    let hash = sha256_file(path)?;
    let sidecar = sidecar_path(path);
    let content = format!("{}  {}\n", hash, recorded_name.display());
    fs::write(&sidecar, content)
        .with_context(|| format!("writing checksum {}", sidecar.display()))?;
    Ok(sidecar)
}

/// `path` with [`CHECKSUM_SUFFIX`] appended (not substituted).
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

/// Lower-case hex SHA-256 of a file, streamed in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
