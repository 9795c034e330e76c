//! Ledger of every asset uploaded during a run.

use anyhow::{bail, Result};

/// Release pages truncate asset lists beyond this count, hiding the rest.
pub const MAX_VIEWABLE_ASSETS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub url: String,
    /// Final URL segment; used as the release link name.
    pub name: String,
}

impl UploadedAsset {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = url.rsplit('/').next().unwrap_or(&url).to_string();
        Self { url, name }
    }
}

/// Uploaded assets in append order.
#[derive(Debug, Default)]
pub struct AssetLedger {
    assets: Vec<UploadedAsset>,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accrue(&mut self, url: impl Into<String>) -> &UploadedAsset {
        self.assets.push(UploadedAsset::new(url));
        &self.assets[self.assets.len() - 1]
    }

    pub fn count(&self) -> usize {
        self.assets.len()
    }

    pub fn assets(&self) -> &[UploadedAsset] {
        &self.assets
    }

    /// Fail if more assets were uploaded than a release page will show.
    pub fn validate(&self) -> Result<()> {
        if self.count() > MAX_VIEWABLE_ASSETS {
            let listing = self
                .assets
                .iter()
                .enumerate()
                .map(|(i, a)| format!("  {:3}: {}", i + 1, a.url))
                .collect::<Vec<_>>()
                .join("\n");
            bail!(
                "upload has {} assets, which will result in some of them being \
                 unviewable in web page lists (limit {}):\n{}",
                self.count(),
                MAX_VIEWABLE_ASSETS,
                listing
            );
        }
        Ok(())
    }
}
