//! CLI command implementations

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use castline_core::{
    AddressResolver, BridgeConfig, CastlineError, FileLocator, FsResolver, LocatorError,
    LocatorResolver,
};
use castline_web::{RemoteSessionState, ServerInfo, SessionController, StreamBridge};
use clap::Subcommand;
use serde::Serialize;
use tokio::signal;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve files until interrupted
    Serve {
        /// Interface to bind to
        #[arg(long)]
        host: Option<IpAddr>,
        /// Port to bind to, 0 picks a free one
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to put in URLs instead of the detected one
        #[arg(long)]
        advertise_ip: Option<Ipv4Addr>,
        /// Album art to register alongside the tracks
        #[arg(long)]
        artwork: Option<PathBuf>,
        /// Print URLs as JSON
        #[arg(long)]
        json: bool,
        /// Audio files to register
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the address remote devices would be given
    Address {
        /// Address to use instead of the detected one
        #[arg(long)]
        advertise_ip: Option<Ipv4Addr>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve {
            host,
            port,
            advertise_ip,
            artwork,
            json,
            files,
        } => {
            let config = build_config(BridgeConfig::from_env(), host, port, advertise_ip);
            serve(config, files, artwork, json).await
        }
        Commands::Address { advertise_ip, json } => {
            let config = build_config(BridgeConfig::from_env(), None, None, advertise_ip);
            show_address(&config, json)
        }
    }
}

/// Applies command-line flags on top of the environment configuration.
fn build_config(
    mut config: BridgeConfig,
    host: Option<IpAddr>,
    port: Option<u16>,
    advertise_ip: Option<Ipv4Addr>,
) -> BridgeConfig {
    if let Some(host) = host {
        config.server.bind_host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if advertise_ip.is_some() {
        config.network.advertise_ip = advertise_ip;
    }
    config
}

#[derive(Debug, Serialize)]
struct RegisteredFile {
    path: PathBuf,
    url: String,
}

#[derive(Debug, Serialize)]
struct ServeReport {
    server: ServerInfo,
    files: Vec<RegisteredFile>,
    artwork: Option<RegisteredFile>,
}

/// Start the bridge, register files and serve until a shutdown signal
///
/// # Errors
/// - `CastlineError::Locator` - A file is missing or not a regular file
/// - `BridgeError::Bind` - The listener could not be bound
async fn serve(
    config: BridgeConfig,
    files: Vec<PathBuf>,
    artwork: Option<PathBuf>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = FsResolver::new();

    // Reject bad paths before anything listens
    let mut locators = Vec::with_capacity(files.len());
    for path in &files {
        let locator = checked_locator(&resolver, path)
            .await
            .inspect_err(report_file_error)?;
        locators.push((path.clone(), locator));
    }
    let artwork = match artwork {
        Some(path) => {
            let locator = checked_locator(&resolver, &path)
                .await
                .inspect_err(report_file_error)?;
            Some((path, locator))
        }
        None => None,
    };

    let bridge = Arc::new(StreamBridge::new(config, Arc::new(resolver)));
    let controller = SessionController::new(Arc::clone(&bridge));
    controller.handle(RemoteSessionState::Started).await?;

    let mut registered = Vec::with_capacity(locators.len());
    for (path, locator) in locators {
        let url = bridge.register_file(locator)?;
        registered.push(RegisteredFile { path, url });
    }
    let artwork = match artwork {
        Some((path, locator)) => Some(RegisteredFile {
            url: bridge.register_artwork(locator)?,
            path,
        }),
        None => None,
    };

    let report = ServeReport {
        server: bridge.server_info().ok_or(castline_web::BridgeError::NotRunning)?,
        files: registered,
        artwork,
    };
    print_report(&report, json)?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    controller.handle(RemoteSessionState::Ended).await?;
    Ok(())
}

/// Resolves a path to an absolute locator, failing if it is not a readable file.
async fn checked_locator(
    resolver: &FsResolver,
    path: &Path,
) -> Result<FileLocator, CastlineError> {
    let absolute = tokio::fs::canonicalize(path).await.map_err(|e| {
        LocatorError::from_io(&FileLocator::new(path.to_string_lossy()), e)
    })?;
    let locator = FileLocator::new(absolute.to_string_lossy());

    resolver.content_length(&locator).await?;
    Ok(locator)
}

fn report_file_error(error: &CastlineError) {
    if error.is_user_error() {
        eprintln!("{}", error.user_message());
    } else {
        tracing::error!("Cannot serve file: {}", error);
    }
}

fn print_report(report: &ServeReport, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Serving on {}", report.server.listen_addr);
    println!("{:-<60}", "");
    for file in &report.files {
        println!("{}", file.path.display());
        println!("  {}", file.url);
    }
    if let Some(artwork) = &report.artwork {
        println!("{} (artwork)", artwork.path.display());
        println!("  {}", artwork.url);
    }
    println!("\nPress Ctrl+C to stop.");
    Ok(())
}

/// Print the resolved advertise address and where it came from
///
/// # Errors
/// - `serde_json::Error` - JSON output could not be produced
fn show_address(config: &BridgeConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let resolved = AddressResolver::new(config.network.advertise_ip).resolve();

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("{} ({})", resolved.ip, resolved.source);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_environment() {
        let env = BridgeConfig::from_lookup(|key| match key {
            "CASTLINE_PORT" => Some("9000".to_string()),
            "CASTLINE_ADVERTISE_IP" => Some("10.0.0.2".to_string()),
            _ => None,
        });

        let config = build_config(
            env.clone(),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Some(9100),
            None,
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.network.advertise_ip, Some(Ipv4Addr::new(10, 0, 0, 2)));

        let config = build_config(env, None, None, Some(Ipv4Addr::new(10, 0, 0, 3)));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.network.advertise_ip, Some(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[tokio::test]
    async fn test_checked_locator_rejects_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = checked_locator(&FsResolver::new(), &dir.path().join("nope.mp3")).await;

        assert!(matches!(
            result,
            Err(CastlineError::Locator(LocatorError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_checked_locator_makes_paths_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        tokio::fs::write(&path, b"ID3").await.unwrap();

        let locator = checked_locator(&FsResolver::new(), &path).await.unwrap();
        assert!(Path::new(locator.as_str()).is_absolute());

        // Empty files cannot be served with a length but are still accepted
        let empty = dir.path().join("empty.mp3");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert!(checked_locator(&FsResolver::new(), &empty).await.is_ok());
    }
}
