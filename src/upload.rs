//! Uploads to the project's generic package registry.
//!
//! Target URLs are a pure function of the registry coordinates, the package
//! version, and the escaped file name, so re-running a deploy addresses the
//! same files. The transfer itself is behind [`Transfer`]; production uses
//! curl, which handles encodings, headers, and transient-failure retries.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::Span;

use crate::config::CiContext;
use crate::logging::Logger;
use crate::process::Cmd;

/// Generic package all release assets are stored under.
pub const PACKAGE_NAME: &str = "graphviz-releases";

/// Acknowledgment message of a successful upload.
pub const CREATED_MESSAGE: &str = "201 Created";

/// Attempts curl makes on transient network failures.
pub const TRANSFER_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("transfer of {path} exited with {}", describe_code(.code))]
    Transfer {
        path: String,
        code: Option<i32>,
        transcript: String,
    },

    #[error("upload of {path} returned no response")]
    EmptyResponse { path: String },

    #[error("upload of {path} returned malformed acknowledgment: {line}")]
    Parse {
        path: String,
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("upload failed: {line}")]
    Rejected { line: String, message: String },
}

impl UploadError {
    /// Exit status of the transfer command, when that is what failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Transfer { code, .. } => code.filter(|c| *c != 0),
            _ => None,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Body of the registry's reply to an upload.
#[derive(Debug, Deserialize)]
pub struct Acknowledgment {
    pub message: String,
}

/// One file to push to one URL.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub path: &'a Path,
    pub target: &'a str,
}

/// What the transfer mechanism reported.
#[derive(Debug, Clone)]
pub struct TransferResponse {
    /// `None` if the transfer was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, response headers included.
    pub output: String,
}

impl TransferResponse {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Moves a local file to a remote URL.
pub trait Transfer {
    fn transfer(&self, request: &TransferRequest<'_>) -> Result<TransferResponse>;
}

/// [`Transfer`] implemented by invoking curl.
#[derive(Clone)]
pub struct CurlTransfer {
    program: String,
    job_token: String,
}

impl CurlTransfer {
    pub fn new(program: impl Into<String>, job_token: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            job_token: job_token.into(),
        }
    }

    fn command(&self, request: &TransferRequest<'_>) -> Cmd {
        Cmd::new(&self.program)
            .args(["--silent", "--include", "--stderr", "-"])
            .args(["--retry", &TRANSFER_RETRIES.to_string()])
            .args(["--header", &format!("JOB-TOKEN: {}", self.job_token)])
            .arg("--upload-file")
            .arg_path(request.path)
            .arg(request.target)
            .error_msg(format!("running {} to upload {}", self.program, request.path.display()))
            .allow_fail()
    }
}

impl Transfer for CurlTransfer {
    fn transfer(&self, request: &TransferRequest<'_>) -> Result<TransferResponse> {
        let result = self.command(request).run()?;
        let mut output = result.stdout;
        output.push_str(&result.stderr);
        Ok(TransferResponse {
            exit_code: result.status.code(),
            output,
        })
    }
}

/// Registry coordinates that prefix every target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoint {
    pub api_url: String,
    pub project_id: String,
}

impl RegistryEndpoint {
    pub fn from_ci(ctx: &CiContext) -> Self {
        Self {
            api_url: ctx.api_url.clone(),
            project_id: ctx.project_id.clone(),
        }
    }

    /// URL for `safe_name` inside the release package at `version`.
    pub fn target_url(&self, version: &str, safe_name: &str) -> String {
        format!(
            "{}/projects/{}/packages/generic/{}/{}/{}",
            self.api_url, self.project_id, PACKAGE_NAME, version, safe_name
        )
    }
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Z0-9.\-]").expect("static regex"))
}

/// Replace every character the registry's file-name field rejects with `_`.
pub fn escape_name(name: &str) -> String {
    unsafe_chars().replace_all(name, "_").into_owned()
}

pub struct Uploader<T> {
    endpoint: RegistryEndpoint,
    transfer: T,
    span: Span,
}

impl<T: Transfer> Uploader<T> {
    pub fn new(endpoint: RegistryEndpoint, transfer: T, logger: &Logger) -> Self {
        Self {
            endpoint,
            transfer,
            span: logger.component("uploader"),
        }
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    /// Upload `path` as `name` (default: the path itself) and return its URL.
    ///
    /// With `dry_run` nothing leaves the machine; the URL is still computed.
    pub fn upload(
        &self,
        dry_run: bool,
        version: &str,
        path: &Path,
        name: Option<&str>,
    ) -> Result<String> {
        let shown = path.display().to_string();
        let name = name.unwrap_or(shown.as_str());

        let safe = escape_name(name);
        tracing::info!(parent: &self.span, "escaped name {} to {}", name, safe);

        let target = self.endpoint.target_url(version, &safe);

        if dry_run {
            tracing::info!(parent: &self.span, "skipping upload due to 'dry_run' flag");
            return Ok(target);
        }

        tracing::info!(parent: &self.span, "uploading {} to {}", shown, target);
        let response = self.transfer.transfer(&TransferRequest {
            path,
            target: &target,
        })?;

        tracing::info!(parent: &self.span, "transfer response:");
        for (i, line) in response.output.split('\n').enumerate() {
            tracing::info!(parent: &self.span, " {:3}: {}", i + 1, line);
        }

        check_acknowledgment(&shown, &response)?;
        Ok(target)
    }
}

/// Success requires a zero exit and a final JSON line of `201 Created`.
fn check_acknowledgment(path: &str, response: &TransferResponse) -> Result<(), UploadError> {
    if !response.success() {
        return Err(UploadError::Transfer {
            path: path.to_string(),
            code: response.exit_code,
            transcript: response.output.clone(),
        });
    }

    // curl leaves the body last; ignore a trailing newline after it
    let line = response
        .output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| UploadError::EmptyResponse {
            path: path.to_string(),
        })?;

    let ack: Acknowledgment =
        serde_json::from_str(line).map_err(|source| UploadError::Parse {
            path: path.to_string(),
            line: line.to_string(),
            source,
        })?;

    if ack.message != CREATED_MESSAGE {
        return Err(UploadError::Rejected {
            line: line.to_string(),
            message: ack.message,
        });
    }
    Ok(())
}
