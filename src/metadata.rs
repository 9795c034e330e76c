//! Data feeding the website's download page.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::version::ResolvedVersion;

/// One downloadable file on the download page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDownloadEntry {
    pub format: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u8>,
    /// URL of the checksum sidecar, keyed by the sidecar's extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl WebDownloadEntry {
    pub fn new(format: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            url: url.into(),
            bits: None,
            sha256: None,
        }
    }
}

/// Serialized to `graphviz-<version>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    pub name: String,
    /// Release version with a two-digit major component.
    pub version: String,
    pub sources: Vec<WebDownloadEntry>,
    pub windows: Vec<WebDownloadEntry>,
}

#[derive(Debug)]
pub struct ReleaseMetadataBuilder {
    release: String,
    metadata: ReleaseMetadata,
}

impl ReleaseMetadataBuilder {
    pub fn new(version: &ResolvedVersion) -> Result<Self> {
        Ok(Self {
            release: version.release.clone(),
            metadata: ReleaseMetadata {
                name: format!("graphviz-{}", version.release),
                version: version.padded()?,
                sources: Vec::new(),
                windows: Vec::new(),
            },
        })
    }

    pub fn add_source(&mut self, entry: WebDownloadEntry) {
        self.metadata.sources.push(entry);
    }

    pub fn add_windows(&mut self, entry: WebDownloadEntry) {
        self.metadata.windows.push(entry);
    }

    pub fn metadata(&self) -> &ReleaseMetadata {
        &self.metadata
    }

    /// The download page needs at least one Windows installer.
    pub fn ensure_windows(&self) -> Result<()> {
        if self.metadata.windows.is_empty() {
            bail!("no Windows artifacts found");
        }
        Ok(())
    }

    /// Output file name, `graphviz-<version>.json`.
    pub fn file_name(&self) -> String {
        format!("graphviz-{}.json", self.release)
    }

    /// Write the pretty-printed JSON into `dir` and return its path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let mut json = serde_json::to_string_pretty(&self.metadata)
            .context("serializing release metadata")?;
        json.push('\n');
        fs::write(&path, json)
            .with_context(|| format!("writing release metadata '{}'", path.display()))?;
        Ok(path)
    }
}
