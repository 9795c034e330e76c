//! Preflight checks run before anything is uploaded.
//!
//! These are refuse-to-run conditions: a deploy outside CI, or one
//! that would fail to register the release after uploading its assets, must
//! stop before the first upload.
//!
//! ```rust
//! use release_deploy::preflight::{require_ci, require_curl};
//!
//! let ci = std::env::var("CI").ok();
//! if require_ci(ci.as_deref()).is_ok() {
//!     require_curl("curl").ok();
//! }
//! ```

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;
use tracing::Span;

use crate::process::Cmd;

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Uploads need curl; dry runs never call it so only releases check.
pub fn require_curl(program: &str) -> Result<()> {
    if !command_exists(program) {
        bail!("{program} not found; cannot upload release assets");
    }
    Ok(())
}

/// Refuse to run unless the environment declares a CI execution context.
pub fn require_ci(marker: Option<&str>) -> Result<()> {
    if marker.is_none() {
        bail!("CI environment variable unset; refusing to run");
    }
    Ok(())
}

/// Refuse to run if the release registrar is missing.
///
/// Checked up front so assets are never uploaded for a release that cannot
/// be created afterwards.
pub fn require_release_cli(program: &str) -> Result<()> {
    if !command_exists(program) {
        bail!("{program} not found");
    }
    Ok(())
}

/// Log `uname -a` and `/etc/os-release` for post-hoc debugging.
pub fn log_host_info(span: &Span) {
    match Cmd::new("uname").arg("-a").allow_fail().run() {
        Ok(result) if result.success() => {
            tracing::info!(parent: span, "uname: {}", result.stdout.trim());
        }
        _ => tracing::debug!(parent: span, "uname unavailable"),
    }

    let os_release = Path::new("/etc/os-release");
    if let Ok(contents) = fs::read_to_string(os_release) {
        tracing::info!(parent: span, "{}:", os_release.display());
        for (i, line) in contents.lines().enumerate() {
            tracing::info!(parent: span, " {}: {}", i + 1, line);
        }
    }
}
