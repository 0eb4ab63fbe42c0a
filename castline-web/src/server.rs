//! Lifecycle of the embedded HTTP server.
//!
//! A [`StreamBridge`] owns the registry and session token for its whole
//! lifetime; the listener comes and goes with `start()` and `stop()` as remote
//! sessions begin and end.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use castline_core::{
    AddressResolver, BridgeConfig, FileLocator, FileRegistry, LocatorResolver, ResourceKind,
    SessionToken,
};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::responder::ContentResponder;
use crate::router::{BridgeState, create_router};

/// Errors from server lifecycle and registration.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("streaming server is not running")]
    NotRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a running server listens and how remote devices reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub listen_addr: SocketAddr,
    pub base_url: String,
}

struct RunningServer {
    info: ServerInfo,
    /// Stops accepting and asks connections to finish their current response
    drain: CancellationToken,
    /// Drops whatever connections are left
    close: CancellationToken,
    /// The accept loop and every connection it spawned
    tasks: TaskTracker,
}

/// Local HTTP bridge that exposes registered files to remote devices.
pub struct StreamBridge {
    config: BridgeConfig,
    registry: Arc<FileRegistry>,
    token: Arc<SessionToken>,
    responder: Arc<ContentResponder>,
    address: AddressResolver,
    running: Mutex<Option<RunningServer>>,
    // Serializes start and stop across their awaits
    lifecycle: tokio::sync::Mutex<()>,
}

impl StreamBridge {
    /// Creates a stopped bridge with a fresh session token.
    pub fn new(config: BridgeConfig, resolver: Arc<dyn LocatorResolver>) -> Self {
        let address = AddressResolver::new(config.network.advertise_ip);
        let responder = Arc::new(ContentResponder::new(resolver, config.streaming.clone()));

        Self {
            config,
            registry: Arc::new(FileRegistry::new()),
            token: Arc::new(SessionToken::generate()),
            responder,
            address,
            running: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the address resolver used for registration URLs.
    pub fn with_address_resolver(mut self, address: AddressResolver) -> Self {
        self.address = address;
        self
    }

    /// Starts listening, or returns the running server's info.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Bind` - The configured address could not be bound
    /// - `BridgeError::Io` - The bound socket could not report its address
    pub async fn start(&self) -> Result<ServerInfo, BridgeError> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(info) = self.server_info() {
            return Ok(info);
        }

        let address = SocketAddr::new(self.config.server.bind_host, self.config.server.port);
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| BridgeError::Bind { address, source })?;
        let listen_addr = listener.local_addr()?;

        let app = create_router(BridgeState {
            registry: Arc::clone(&self.registry),
            token: Arc::clone(&self.token),
            responder: Arc::clone(&self.responder),
        });

        let drain = CancellationToken::new();
        let close = CancellationToken::new();
        let tasks = TaskTracker::new();
        tasks.spawn(accept_loop(
            listener,
            app,
            tasks.clone(),
            drain.clone(),
            close.clone(),
        ));

        let info = ServerInfo {
            listen_addr,
            base_url: self.base_url_for(listen_addr.port()),
        };
        tracing::info!(
            "Streaming bridge listening on {}, reachable at {}",
            listen_addr,
            info.base_url
        );

        *self.running.lock() = Some(RunningServer {
            info: info.clone(),
            drain,
            close,
            tasks,
        });
        Ok(info)
    }

    /// Stops the server. A no-op when already stopped.
    ///
    /// The listener closes at once. In-flight responses get
    /// `server.shutdown_grace` to finish, then their connections are closed.
    /// Returns once every connection is gone.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let Some(server) = self.running.lock().take() else {
            return;
        };

        server.drain.cancel();
        server.tasks.close();
        let grace = self.config.server.shutdown_grace;

        if tokio::time::timeout(grace, server.tasks.wait()).await.is_err() {
            tracing::warn!(
                "{} connections still open after {:?}, closing them",
                server.tasks.len(),
                grace
            );
            server.close.cancel();
            server.tasks.wait().await;
        }
        tracing::info!("Streaming bridge on {} stopped", server.info.listen_addr);
    }

    /// Whether the server is accepting connections.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Info for the running server.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.running.lock().as_ref().map(|server| server.info.clone())
    }

    /// Base URL for registrations, resolving the LAN address now.
    ///
    /// # Errors
    ///
    /// - `BridgeError::NotRunning` - The server has not been started
    pub fn base_url(&self) -> Result<String, BridgeError> {
        let port = self
            .running
            .lock()
            .as_ref()
            .map(|server| server.info.listen_addr.port())
            .ok_or(BridgeError::NotRunning)?;
        Ok(self.base_url_for(port))
    }

    fn base_url_for(&self, port: u16) -> String {
        format!("http://{}:{}", self.address.resolve().ip, port)
    }

    /// Exposes an audio file and returns its URL.
    ///
    /// # Errors
    ///
    /// - `BridgeError::NotRunning` - The server has not been started
    pub fn register_file(&self, locator: impl Into<FileLocator>) -> Result<String, BridgeError> {
        self.register(locator.into(), ResourceKind::Audio)
    }

    /// Exposes an artwork image and returns its URL.
    ///
    /// # Errors
    ///
    /// - `BridgeError::NotRunning` - The server has not been started
    pub fn register_artwork(&self, locator: impl Into<FileLocator>) -> Result<String, BridgeError> {
        self.register(locator.into(), ResourceKind::Artwork)
    }

    fn register(&self, locator: FileLocator, kind: ResourceKind) -> Result<String, BridgeError> {
        let base_url = self.base_url()?;
        let id = self.registry.register(locator, kind);
        Ok(format!(
            "{}/{}/{}/{}",
            base_url,
            kind.path_segment(),
            self.token.as_str(),
            id
        ))
    }

    /// Drops every registration; their URLs answer 404 from now on.
    pub fn clear_registered_files(&self) {
        self.registry.clear();
        tracing::info!("Cleared registered files");
    }

    /// Number of live registrations.
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// Token embedded in every registration URL.
    pub fn session_token(&self) -> &SessionToken {
        &self.token
    }
}

/// Accepts connections until `drain` is cancelled.
async fn accept_loop(
    listener: TcpListener,
    app: Router,
    tasks: TaskTracker,
    drain: CancellationToken,
    close: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("Accepted connection from {}", peer);
                    tasks.spawn(serve_connection(
                        stream,
                        app.clone(),
                        drain.clone(),
                        close.clone(),
                    ));
                }
                Err(e) => tracing::debug!("Accept error: {}", e),
            },
            _ = drain.cancelled() => break,
        }
    }
}

/// Serves one connection, finishing gracefully on `drain` and dropping it
/// outright on `close`.
///
/// Dropping the connection future closes the socket and the response body
/// with it, even when the client has stopped reading.
async fn serve_connection(
    stream: TcpStream,
    app: Router,
    drain: CancellationToken,
    close: CancellationToken,
) {
    let service = TowerToHyperService::new(app.into_service());
    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    let mut connection = std::pin::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = drain.cancelled() => {
            connection.as_mut().graceful_shutdown();
            tokio::select! {
                result = connection.as_mut() => result,
                _ = close.cancelled() => {
                    tracing::debug!("Closed connection still streaming at shutdown");
                    return;
                }
            }
        }
    };

    if let Err(e) = result {
        tracing::debug!("Connection error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use async_trait::async_trait;
    use castline_core::locator::test_fixtures::InMemoryResolver;
    use castline_core::{LocatorError, LocatorStream};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};

    use super::*;

    /// Resolver serving an effectively endless file and counting open readers.
    #[derive(Default)]
    struct EndlessResolver {
        open: Arc<AtomicUsize>,
    }

    struct ZeroReader {
        open: Arc<AtomicUsize>,
    }

    impl AsyncRead for ZeroReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let zeros = [0u8; 8192];
            let n = buf.remaining().min(zeros.len());
            buf.put_slice(&zeros[..n]);
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for ZeroReader {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl LocatorResolver for EndlessResolver {
        async fn content_length(&self, _: &FileLocator) -> Result<Option<u64>, LocatorError> {
            Ok(Some(1 << 30))
        }

        async fn open(&self, _: &FileLocator) -> Result<LocatorStream, LocatorError> {
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ZeroReader {
                open: Arc::clone(&self.open),
            }))
        }

        fn mime_type(&self, _: &FileLocator) -> Option<String> {
            None
        }
    }

    fn bridge() -> StreamBridge {
        StreamBridge::new(
            BridgeConfig::for_testing(),
            Arc::new(InMemoryResolver::new()),
        )
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let bridge = bridge();

        let first = bridge.start().await.unwrap();
        let second = bridge.start().await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.listen_addr.port(), 0);
        assert!(bridge.is_running());

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let bridge = bridge();
        bridge.stop().await;

        bridge.start().await.unwrap();
        bridge.stop().await;
        bridge.stop().await;

        assert!(!bridge.is_running());
        assert!(bridge.server_info().is_none());
    }

    #[tokio::test]
    async fn test_register_requires_running_server() {
        let bridge = bridge();

        assert!(matches!(
            bridge.register_file("/music/a.mp3"),
            Err(BridgeError::NotRunning)
        ));
        assert!(matches!(bridge.base_url(), Err(BridgeError::NotRunning)));
        assert_eq!(bridge.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_registration_url_shape() {
        let bridge = bridge();
        let info = bridge.start().await.unwrap();

        let url = bridge.register_file("/music/a.mp3").unwrap();
        let art = bridge.register_artwork("/music/cover.jpg").unwrap();

        let prefix = format!("http://127.0.0.1:{}/", info.listen_addr.port());
        let audio_rest = url.strip_prefix(&prefix).unwrap();
        let segments: Vec<&str> = audio_rest.split('/').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], "audio");
        assert_eq!(segments[1], bridge.session_token().as_str());

        assert!(art.starts_with(&format!("{prefix}artwork/")));
        assert_eq!(bridge.registered_count(), 2);

        bridge.clear_registered_files();
        assert_eq!(bridge.registered_count(), 0);

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_token_survives_restart() {
        let bridge = bridge();
        let token = bridge.session_token().clone();

        bridge.start().await.unwrap();
        bridge.stop().await;
        bridge.start().await.unwrap();

        assert_eq!(bridge.session_token(), &token);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_configured_address_in_base_url() {
        let bridge = bridge()
            .with_address_resolver(AddressResolver::new(Some(Ipv4Addr::new(192, 168, 7, 3))));
        let info = bridge.start().await.unwrap();

        assert_eq!(
            info.base_url,
            format!("http://192.168.7.3:{}", info.listen_addr.port())
        );
        assert_eq!(bridge.base_url().unwrap(), info.base_url);

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = bridge();
        let info = first.start().await.unwrap();

        let mut config = BridgeConfig::for_testing();
        config.server.port = info.listen_addr.port();
        let second = StreamBridge::new(config, Arc::new(InMemoryResolver::new()));

        assert!(matches!(
            second.start().await,
            Err(BridgeError::Bind { .. })
        ));
        assert!(!second.is_running());

        first.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_connection_of_stalled_client() {
        let resolver = Arc::new(EndlessResolver::default());
        let open = Arc::clone(&resolver.open);
        let mut config = BridgeConfig::for_testing();
        config.server.shutdown_grace = Duration::from_millis(100);
        let bridge = StreamBridge::new(config, resolver);

        let info = bridge.start().await.unwrap();
        let url = bridge.register_file("endless.flac").unwrap();
        let path = url.strip_prefix(&info.base_url).unwrap();

        let mut client = TcpStream::connect(info.listen_addr).await.unwrap();
        client
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: receiver\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut head = [0u8; 512];
        let read = client.read(&mut head).await.unwrap();
        assert!(head[..read].starts_with(b"HTTP/1.1 200"));

        // The client stops reading with most of the body still to come
        for _ in 0..100 {
            if open.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(open.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(5), bridge.stop())
            .await
            .unwrap();

        assert_eq!(open.load(Ordering::SeqCst), 0);

        // The socket is closed: draining what the kernel buffered reaches the end
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match client.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn test_stop_waits_for_idle_keep_alive_connections() {
        let resolver = Arc::new(EndlessResolver::default());
        let bridge = StreamBridge::new(BridgeConfig::for_testing(), resolver);
        let info = bridge.start().await.unwrap();

        // Connected but never sends a request
        let mut idle = TcpStream::connect(info.listen_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(5), bridge.stop())
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), idle.read(&mut buf))
            .await
            .unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
