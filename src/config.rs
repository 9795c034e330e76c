//! Command-line flags and the CI environment the deploy step runs in.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::logging::{LogConfig, LogFormat};

/// Publish release artifacts to the project's generic package registry.
#[derive(Debug, Clone, Parser)]
#[command(name = "release-deploy", version, about)]
pub struct DeployArgs {
    /// Directory holding the source archives and the packages tree.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Packages tree, relative to `--root`.
    #[arg(long, default_value = "Packages")]
    pub packages_dir: PathBuf,

    /// Script printing the release version, run once from `--root`.
    #[arg(long, default_value = "gen_version.py")]
    pub version_script: PathBuf,

    /// Interpreter for `--version-script`.
    #[arg(long, default_value = "python3")]
    pub python: String,

    /// Use this release version instead of running the version script.
    #[arg(long)]
    pub release_version: Option<String>,

    #[arg(long, default_value = "curl")]
    pub curl: String,

    #[arg(long, default_value = "release-cli")]
    pub release_cli: String,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// `text` or `json`.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Set by every CI runner; the deploy step refuses to run without it.
    #[arg(long, env = "CI", hide = true)]
    pub ci: Option<String>,

    #[arg(long, env = "CI_API_V4_URL")]
    pub api_url: Option<String>,

    #[arg(long, env = "CI_PROJECT_ID")]
    pub project_id: Option<String>,

    #[arg(long, env = "CI_JOB_TOKEN", hide_env_values = true)]
    pub job_token: Option<String>,

    /// Commit being released; seeds the package version of dev snapshots.
    #[arg(long, env = "CI_COMMIT_SHA")]
    pub commit_sha: Option<String>,
}

impl DeployArgs {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }

    /// Registry coordinates. Only called after the CI marker was checked.
    pub fn ci_context(&self) -> Result<CiContext> {
        Ok(CiContext {
            api_url: required(&self.api_url, "CI_API_V4_URL")?
                .trim_end_matches('/')
                .to_string(),
            project_id: required(&self.project_id, "CI_PROJECT_ID")?.to_string(),
            job_token: required(&self.job_token, "CI_JOB_TOKEN")?.to_string(),
            commit_sha: self.commit_sha.clone(),
        })
    }
}

fn required<'a>(value: &'a Option<String>, var: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{var} environment variable unset; refusing to run"))
}

/// Values provided by the CI job.
#[derive(Clone)]
pub struct CiContext {
    pub api_url: String,
    pub project_id: String,
    pub job_token: String,
    pub commit_sha: Option<String>,
}

impl std::fmt::Debug for CiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiContext")
            .field("api_url", &self.api_url)
            .field("project_id", &self.project_id)
            .field("job_token", &"<redacted>")
            .field("commit_sha", &self.commit_sha)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> DeployArgs {
        let mut argv = vec!["release-deploy"];
        argv.extend_from_slice(extra);
        DeployArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.root, PathBuf::from("."));
        assert_eq!(args.packages_dir, PathBuf::from("Packages"));
        assert_eq!(args.release_cli, "release-cli");
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_ci_context_from_flags() {
        let args = parse(&[
            "--api-url",
            "https://gitlab.example.com/api/v4/",
            "--project-id",
            "42",
            "--job-token",
            "secret",
        ]);
        let ctx = args.ci_context().unwrap();
        assert_eq!(ctx.api_url, "https://gitlab.example.com/api/v4");
        assert_eq!(ctx.project_id, "42");
        assert!(!format!("{ctx:?}").contains("secret"));
    }

    #[test]
    fn test_ci_context_requires_token() {
        let mut args = parse(&["--api-url", "https://x/api/v4", "--project-id", "1"]);
        args.job_token = None;
        let err = args.ci_context().unwrap_err();
        assert!(err.to_string().contains("CI_JOB_TOKEN"));
    }
}
