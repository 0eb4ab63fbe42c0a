//! Log output for the bridge.
//!
//! The console shows what the user asked for. A per-run log file keeps the
//! full request trail of our own crates, which is what a failed cast session
//! needs for diagnosis; hyper's connection chatter is kept at `info` there.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the log file, replaced on every run.
pub const LOG_FILE_NAME: &str = "castline-last-run.log";

/// Directives for the log file regardless of the console level.
const FILE_DIRECTIVES: &str =
    "castline_core=trace,castline_web=trace,castline=trace,tower_http=debug,hyper=info,info";

/// Where the log file lands for `logs_dir`, `./logs` when unset.
pub fn log_file_path(logs_dir: Option<&Path>) -> PathBuf {
    logs_dir.unwrap_or_else(|| Path::new("logs")).join(LOG_FILE_NAME)
}

/// Installs the global subscriber: console at `console_level` (or `RUST_LOG`)
/// plus the per-run log file under `logs_dir`.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - The log directory or file could not be
///   created, or a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = log_file_path(logs_dir);
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let file = File::create(&path)?;

    tracing_subscriber::registry()
        .with(console_layer(console_level))
        .with(file_layer(file))
        .try_init()?;

    tracing::info!(
        "Logging to console at {} and to {}",
        console_level,
        path.display()
    );
    Ok(())
}

fn console_layer<S>(level: Level) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    // RUST_LOG wins over the CLI flag when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    fmt::layer().with_target(true).compact().with_filter(filter)
}

fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(file)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES))
}

/// Console verbosity selectable with `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Failed requests and server errors
    Error,
    /// Also rejected tokens and address fallbacks
    Warn,
    /// Also session start and stop
    Info,
    /// Also every request and range served
    Debug,
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use castline_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}
