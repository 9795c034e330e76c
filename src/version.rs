//! Release version resolution.
//!
//! The registry's generic packages only accept `MAJOR.MINOR.PATCH` versions,
//! while development snapshots carry free-form version strings. Snapshots are
//! published under `0.0.<commit as decimal>` so they never collide with a
//! real release.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::process::Cmd;

fn strict_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("static regex"))
}

/// Whether `version` is a stable `MAJOR.MINOR.PATCH` release.
pub fn is_strict_version(version: &str) -> bool {
    strict_pattern().is_match(version)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Version as produced by the build.
    pub release: String,
    /// Version namespace in the package registry.
    pub package: String,
    /// Only real releases are uploaded for real and registered.
    pub is_real_release: bool,
}

impl ResolvedVersion {
    /// Derive the package version from the release version.
    ///
    /// `commit_sha` is only consulted for non-release versions.
    pub fn resolve(release: &str, commit_sha: Option<&str>) -> Result<Self> {
        let release = release.trim();
        if release.is_empty() {
            bail!("release version is empty");
        }

        if is_strict_version(release) {
            return Ok(Self {
                release: release.to_string(),
                package: release.to_string(),
                is_real_release: true,
            });
        }

        let sha = commit_sha
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .with_context(|| {
                format!("CI_COMMIT_SHA is required to version non-release build '{release}'")
            })?;
        let n = hex_to_decimal(sha)
            .with_context(|| format!("deriving package version from commit '{sha}'"))?;

        Ok(Self {
            release: release.to_string(),
            package: format!("0.0.{n}"),
            is_real_release: false,
        })
    }

    /// Release version with the major component zero-padded to two digits,
    /// so lexical order matches numeric order on the download page.
    pub fn padded(&self) -> Result<String> {
        let (major, rest) = match self.release.split_once('.') {
            Some((major, rest)) => (major, Some(rest)),
            None => (self.release.as_str(), None),
        };
        let major: u64 = major
            .parse()
            .with_context(|| format!("malformed version string '{}'", self.release))?;
        Ok(match rest {
            Some(rest) => format!("{major:02}.{rest}"),
            None => format!("{major:02}"),
        })
    }
}

/// Run the version script once and return its trimmed output.
pub fn run_version_script(python: &str, script: &Path, cwd: &Path) -> Result<String> {
    let result = Cmd::new(python)
        .arg_path(script)
        .current_dir(cwd)
        .error_msg(format!("running version script {}", script.display()))
        .run()?;
    let version = result.stdout.trim().to_string();
    if version.is_empty() {
        bail!("version script {} printed nothing", script.display());
    }
    Ok(version)
}

/// Exact decimal rendering of an arbitrarily long hexadecimal number.
fn hex_to_decimal(hex: &str) -> Result<String> {
    const BASE: u64 = 1_000_000_000;

    // little-endian base 1e9 limbs
    let mut limbs: Vec<u64> = vec![0];
    for c in hex.chars() {
        let digit = c
            .to_digit(16)
            .with_context(|| format!("'{c}' is not a hexadecimal digit"))?;
        let mut carry = u64::from(digit);
        for limb in limbs.iter_mut() {
            let value = *limb * 16 + carry;
            *limb = value % BASE;
            carry = value / BASE;
        }
        while carry > 0 {
            limbs.push(carry % BASE);
            carry /= BASE;
        }
    }

    let mut out = String::new();
    let mut iter = limbs.iter().rev();
    if let Some(top) = iter.next() {
        out.push_str(&top.to_string());
    }
    for limb in iter {
        out.push_str(&format!("{limb:09}"));
    }
    Ok(out)
}
