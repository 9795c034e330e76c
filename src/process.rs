//! Thin wrapper around [`std::process::Command`] for subordinate tools.
//!
//! Every external program the deploy step talks to (curl, release-cli, the
//! version script, uname) goes through [`Cmd`], so failures carry the program
//! name, its exit code, and whatever it printed.

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;

/// A subordinate command exited unsuccessfully.
#[derive(Debug, Error)]
#[error("{program} exited with {status}{}", render_output(.output))]
pub struct CommandFailed {
    pub program: String,
    pub status: ExitStatus,
    pub output: String,
}

impl CommandFailed {
    /// Exit code to propagate, if the process exited normally.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

fn render_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CmdResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Builder for a single command invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            dir: None,
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Context attached to the error when the command cannot be run or fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result even when the exit status is non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Program name plus arguments, for logging.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn run(self) -> Result<CmdResult> {
        let program = self.program.to_string_lossy().into_owned();
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let context = self
            .error_msg
            .clone()
            .unwrap_or_else(|| format!("running {program}"));
        let output = command.output().with_context(|| context.clone())?;

        let result = CmdResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.success() || self.allow_fail {
            return Ok(result);
        }

        let mut combined = result.stdout;
        combined.push_str(&result.stderr);
        Err(anyhow::Error::new(CommandFailed {
            program,
            status: result.status,
            output: combined,
        })
        .context(context))
    }
}

/// Exit code carried by the first [`CommandFailed`] in an error chain.
pub fn propagated_exit_code(err: &anyhow::Error) -> Option<i32> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CommandFailed>())
        .and_then(CommandFailed::code)
        .filter(|code| *code != 0)
}
