//! Tracing subscriber setup for the `hatch` binary.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// JSON lines instead of the human format
    pub json: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl LogOptions {
    /// `HATCH_LOG_JSON=1` turns on JSON output even without `--log-json`.
    pub fn with_env(mut self) -> Self {
        if std::env::var("HATCH_LOG_JSON").unwrap_or_default() == "1" {
            self.json = true;
        }
        self
    }
}

/// Directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "hatch=debug" } else { "hatch=info" }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Logs go to stderr so stdout stays machine-readable.
///
/// The returned guard flushes the file writer on drop and must live until exit.
pub fn init_tracing(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.verbose)));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());
    layers.push(if options.json {
        stderr.json().boxed()
    } else {
        stderr.boxed()
    });

    let mut guard = None;
    if let Some(path) = &options.file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let (writer, worker) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, name));
        let file = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        layers.push(if options.json {
            file.json().boxed()
        } else {
            file.boxed()
        });
        guard = Some(worker);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to initialise logging")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "hatch=info");
        assert_eq!(default_directive(true), "hatch=debug");
    }

    #[test]
    fn test_options_default_to_human_stderr() {
        let options = LogOptions::default();
        assert!(!options.json);
        assert!(options.file.is_none());
    }
}
