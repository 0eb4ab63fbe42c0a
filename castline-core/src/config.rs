//! Centralized configuration for Castline.
//!
//! All tunable parameters of the streaming bridge are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Central configuration for the streaming bridge.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub network: NetworkConfig,
}

/// Listener configuration for the embedded HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface the listener binds to
    pub bind_host: IpAddr,
    /// Listening port, 0 lets the OS pick an ephemeral port
    pub port: u16,
    /// How long `stop()` waits for in-flight responses before aborting them
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Response body and content type settings.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Read buffer size used when streaming response bodies
    pub chunk_size: usize,
    /// Content type for audio whose type the resolver cannot determine
    pub fallback_audio_mime: &'static str,
    /// Content type for every artwork resource
    pub artwork_mime: &'static str,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024, // 64 KiB
            fallback_audio_mime: "audio/mpeg",
            artwork_mime: "image/jpeg",
        }
    }
}

/// Address advertisement settings.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Address embedded in registration URLs instead of the detected one
    pub advertise_ip: Option<Ipv4Addr>,
}

impl BridgeConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = parsed_var::<IpAddr, _>(&lookup, "CASTLINE_BIND_HOST") {
            config.server.bind_host = host;
        }

        if let Some(port) = parsed_var::<u16, _>(&lookup, "CASTLINE_PORT") {
            config.server.port = port;
        }

        if let Some(millis) = parsed_var::<u64, _>(&lookup, "CASTLINE_SHUTDOWN_GRACE_MS") {
            config.server.shutdown_grace = Duration::from_millis(millis);
        }

        if let Some(size) = parsed_var::<usize, _>(&lookup, "CASTLINE_CHUNK_SIZE") {
            if size > 0 {
                config.streaming.chunk_size = size;
            }
        }

        if let Some(ip) = parsed_var::<Ipv4Addr, _>(&lookup, "CASTLINE_ADVERTISE_IP") {
            config.network.advertise_ip = Some(ip);
        }

        config
    }

    /// Creates a configuration for tests: loopback only, fast shutdown.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
                shutdown_grace: Duration::from_millis(200),
            },
            network: NetworkConfig {
                advertise_ip: Some(Ipv4Addr::LOCALHOST),
            },
            ..Default::default()
        }
    }
}

fn parsed_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}
