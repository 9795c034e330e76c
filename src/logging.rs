//! Logging context handed to every pipeline component.
//!
//! The subscriber is installed as the thread's scoped default and torn down
//! when the [`Logger`] is dropped, so nothing outside `main` owns logging state.

use std::str::FromStr;

use anyhow::{bail, Result};
use tracing::dispatcher::DefaultGuard;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("unsupported log format '{other}' (expected 'text' or 'json')"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

/// Explicit logging context. Created at process start, closed on drop.
pub struct Logger {
    root: Span,
    _guard: Option<DefaultGuard>,
}

impl Logger {
    /// Install a stderr subscriber for the current thread.
    pub fn init(config: &LogConfig) -> Self {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

        let guard = match config.format {
            LogFormat::Json => tracing::subscriber::set_default(
                tracing_subscriber::registry().with(filter).with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                ),
            ),
            LogFormat::Text => tracing::subscriber::set_default(
                tracing_subscriber::registry().with(filter).with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                ),
            ),
        };

        let root = tracing::info_span!("deploy");
        Self {
            root,
            _guard: Some(guard),
        }
    }

    /// A logger that records nothing. Used by tests and library callers that
    /// bring their own subscriber.
    pub fn detached() -> Self {
        Self {
            root: Span::none(),
            _guard: None,
        }
    }

    /// Child span for one component; events logged with it as parent are
    /// tagged with the component name.
    pub fn component(&self, name: &'static str) -> Span {
        tracing::info_span!(parent: &self.root, "component", component = name)
    }
}
