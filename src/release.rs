//! Registration of a tagged release binding the uploaded assets.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::Span;

use crate::ledger::UploadedAsset;
use crate::logging::Logger;
use crate::process::Cmd;

pub const RELEASE_DESCRIPTION: &str =
    "See the [CHANGELOG](https://gitlab.com/graphviz/graphviz/-/blob/main/CHANGELOG.md).";

/// Argument of one `--assets-link` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub name: String,
    pub tag_name: String,
    pub description: String,
    pub assets: Vec<AssetLink>,
}

impl ReleaseRequest {
    /// A release named and tagged `version`, linking every asset.
    pub fn new(version: &str, assets: &[UploadedAsset]) -> Self {
        Self {
            name: version.to_string(),
            tag_name: version.to_string(),
            description: RELEASE_DESCRIPTION.to_string(),
            assets: assets
                .iter()
                .map(|a| AssetLink {
                    name: a.name.clone(),
                    url: a.url.clone(),
                })
                .collect(),
        }
    }

    /// `create ...` arguments for the release registrar.
    pub fn to_args(&self) -> Result<Vec<String>> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--tag-name".to_string(),
            self.tag_name.clone(),
            "--description".to_string(),
            self.description.clone(),
        ];
        for link in &self.assets {
            args.push("--assets-link".to_string());
            args.push(
                serde_json::to_string(link)
                    .with_context(|| format!("encoding asset link {}", link.url))?,
            );
        }
        Ok(args)
    }
}

/// Creates a named, tagged release.
pub trait ReleaseRegistrar {
    fn create_release(&self, request: &ReleaseRequest) -> Result<()>;
}

/// [`ReleaseRegistrar`] implemented by invoking release-cli.
pub struct ReleaseCli {
    program: String,
    span: Span,
}

impl ReleaseCli {
    pub fn new(program: impl Into<String>, logger: &Logger) -> Self {
        Self {
            program: program.into(),
            span: logger.component("release-cli"),
        }
    }
}

impl ReleaseRegistrar for ReleaseCli {
    fn create_release(&self, request: &ReleaseRequest) -> Result<()> {
        let cmd = Cmd::new(&self.program)
            .args(request.to_args()?)
            .error_msg(format!("creating release {}", request.tag_name));
        tracing::info!(parent: &self.span, "running {}", cmd.display());
        let result = cmd.run()?;
        for line in result.stdout.lines().chain(result.stderr.lines()) {
            tracing::info!(parent: &self.span, " {}", line);
        }
        Ok(())
    }
}
