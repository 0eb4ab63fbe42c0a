//! Shared setup for integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use castline_core::{BridgeConfig, FsResolver};
use castline_web::StreamBridge;
use tempfile::TempDir;

/// A started bridge serving files from a temporary directory.
pub struct TestBridge {
    pub bridge: Arc<StreamBridge>,
    pub client: reqwest::Client,
    dir: TempDir,
}

impl TestBridge {
    /// Starts a loopback bridge with the filesystem resolver.
    pub async fn start() -> Self {
        Self::start_with(BridgeConfig::for_testing()).await
    }

    pub async fn start_with(config: BridgeConfig) -> Self {
        let bridge = Arc::new(StreamBridge::new(config, Arc::new(FsResolver::new())));
        bridge.start().await.expect("bridge should start");

        Self {
            bridge,
            client: client(),
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    /// Writes a file into the temporary directory.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write test file");
        path
    }

    /// Writes and registers an audio file, returning its URL.
    pub fn serve_audio(&self, name: &str, contents: &[u8]) -> String {
        let path = self.write_file(name, contents);
        self.bridge
            .register_file(path.to_string_lossy().into_owned())
            .expect("register file")
    }

    /// Writes and registers an artwork file, returning its URL.
    pub fn serve_artwork(&self, name: &str, contents: &[u8]) -> String {
        let path = self.write_file(name, contents);
        self.bridge
            .register_artwork(path.to_string_lossy().into_owned())
            .expect("register artwork")
    }

    pub async fn get(&self, url: &str) -> reqwest::Response {
        self.client.get(url).send().await.expect("request failed")
    }

    pub async fn get_range(&self, url: &str, range: &str) -> reqwest::Response {
        self.client
            .get(url)
            .header(reqwest::header::RANGE, range)
            .send()
            .await
            .expect("request failed")
    }
}

/// HTTP client that talks to loopback directly, ignoring proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("http client")
}

/// Deterministic payload where byte `i` is `i % 251`.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    castline_core::locator::test_fixtures::patterned_bytes(len)
}

/// Replaces the session token segment of a registration URL.
pub fn with_token(url: &str, token: &str) -> String {
    let mut parts: Vec<&str> = url.rsplitn(3, '/').collect();
    // rsplitn yields id, token, prefix
    parts[1] = token;
    format!("{}/{}/{}", parts[2], parts[1], parts[0])
}

/// Replaces the kind segment of a registration URL.
pub fn with_kind(url: &str, kind: &str) -> String {
    let mut parts: Vec<&str> = url.rsplitn(4, '/').collect();
    // rsplitn yields id, token, kind, prefix
    parts[2] = kind;
    format!("{}/{}/{}/{}", parts[3], parts[2], parts[1], parts[0])
}

/// Replaces the registration ID segment of a URL.
pub fn with_id(url: &str, id: &str) -> String {
    let (prefix, _) = url.rsplit_once('/').expect("url has an id segment");
    format!("{prefix}/{id}")
}
