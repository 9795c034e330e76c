//! Discovery of publishable files under the deploy root.

use anyhow::{bail, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::Span;
use walkdir::WalkDir;

use crate::artifact::{classify_artifact, Artifact};
use crate::checksum::CHECKSUM_SUFFIX;
use crate::logging::Logger;

/// Bits stripped from every package before upload: o-rwx, g-wx.
pub const PERMISSION_MASK: u32 = 0o037;

/// File names of the two canonical source archives for `version`.
pub fn source_archive_names(version: &str) -> [String; 2] {
    [
        format!("graphviz-{version}.tar.gz"),
        format!("graphviz-{version}.tar.xz"),
    ]
}

/// Remove group write/execute and all "other" permissions from `path`.
///
/// Idempotent: a second call leaves the mode unchanged.
pub fn normalize_permissions(path: &Path) -> Result<u32> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("reading metadata '{}'", path.display()))?
        .permissions();
    let current = perms.mode() & 0o7777;
    let mode = current & !PERMISSION_MASK;
    if mode != current {
        perms.set_mode(mode);
        fs::set_permissions(path, perms)
            .with_context(|| format!("setting permissions '{}'", path.display()))?;
    }
    Ok(mode)
}

/// A sidecar this run will regenerate: `X.sha256` next to an existing
/// standalone macOS or Windows package `X`. Any other checksum in the tree was
/// shipped by the build and is published as-is.
fn is_regenerated_sidecar(path: &Path, display: &Path) -> bool {
    let primary = match path.to_str().and_then(|p| p.strip_suffix(CHECKSUM_SUFFIX)) {
        Some(primary) => Path::new(primary),
        None => return false,
    };
    let primary_display = display.with_extension("");
    primary.is_file() && classify_artifact(&primary_display).is_standalone()
}

pub struct ArtifactScanner {
    root: PathBuf,
    packages_dir: PathBuf,
    span: Span,
}

impl ArtifactScanner {
    /// `packages_dir` is relative to `root`.
    pub fn new(root: &Path, packages_dir: &Path, logger: &Logger) -> Self {
        Self {
            root: root.to_path_buf(),
            packages_dir: packages_dir.to_path_buf(),
            span: logger.component("scanner"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Both source archives. A missing archive means the release is
    /// incomplete and is fatal.
    pub fn source_archives(&self, version: &str) -> Result<Vec<Artifact>> {
        let mut archives = Vec::new();
        for name in source_archive_names(version) {
            let path = self.root.join(&name);
            if !path.is_file() {
                bail!("source {} not found", path.display());
            }
            tracing::info!(parent: &self.span, "found source archive {}", name);
            archives.push(Artifact::source(path, PathBuf::from(name)));
        }
        Ok(archives)
    }

    /// Every file under the packages tree, in file-name order.
    pub fn package_artifacts(&self) -> Result<Vec<Artifact>> {
        let packages_root = self.root.join(&self.packages_dir);
        if !packages_root.is_dir() {
            tracing::warn!(
                parent: &self.span,
                "packages directory {} not found",
                packages_root.display()
            );
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in WalkDir::new(&packages_root).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("walking packages tree '{}'", packages_root.display()))?;
            // symlinked files are published under the link's own name
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }

            let path = entry.path().to_path_buf();
            let rel = path
                .strip_prefix(&packages_root)
                .with_context(|| {
                    format!(
                        "'{}' is outside packages tree '{}'",
                        path.display(),
                        packages_root.display()
                    )
                })?
                .to_path_buf();
            let shown = self.packages_dir.join(&rel);
            if is_regenerated_sidecar(&path, &shown) {
                tracing::debug!(parent: &self.span, "skipping stale sidecar {}", shown.display());
                continue;
            }

            let artifact = Artifact::package(path.clone(), shown, rel.display().to_string());
            tracing::debug!(
                parent: &self.span,
                "classified {} as {:?} ({})",
                artifact.display.display(),
                artifact.classification,
                artifact.format
            );
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}
