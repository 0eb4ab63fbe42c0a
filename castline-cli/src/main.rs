//! Castline CLI - Command-line interface
//!
//! Serves local audio files to cast receivers on the LAN.

mod commands;

use std::path::PathBuf;

use castline_core::tracing_setup::{CliLogLevel, init_tracing};
use clap::Parser;

#[derive(Parser)]
#[command(name = "castline")]
#[command(about = "Stream local audio files to network playback devices")]
struct Cli {
    /// Console log level; RUST_LOG takes precedence when set
    #[arg(long, value_enum, global = true, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the full trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "castline",
            "serve",
            "a.mp3",
            "--log-level",
            "debug",
            "--logs-dir",
            "/tmp/castline-logs",
        ])
        .unwrap();

        assert_eq!(cli.log_level, CliLogLevel::Debug);
        assert_eq!(cli.logs_dir, Some(PathBuf::from("/tmp/castline-logs")));
    }

    #[test]
    fn test_serve_requires_a_file() {
        assert!(Cli::try_parse_from(["castline", "serve"]).is_err());
    }
}
