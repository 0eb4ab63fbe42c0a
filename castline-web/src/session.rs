//! Drives the bridge from remote playback session events.
//!
//! Cast frameworks report session progress as a stream of state changes. The
//! bridge only needs to run while a session is live, and every registration
//! belongs to exactly one session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::server::{BridgeError, StreamBridge};

/// State of the connection to a remote playback device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSessionState {
    Starting,
    Started,
    StartFailed,
    Ending,
    Ended,
    Resuming,
    Resumed,
    ResumeFailed,
    Suspended,
}

impl RemoteSessionState {
    fn is_active(self) -> bool {
        matches!(self, RemoteSessionState::Started | RemoteSessionState::Resumed)
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            RemoteSessionState::Ended
                | RemoteSessionState::StartFailed
                | RemoteSessionState::ResumeFailed
        )
    }
}

/// Starts and stops a [`StreamBridge`] as sessions come and go.
pub struct SessionController {
    bridge: Arc<StreamBridge>,
    casting: AtomicBool,
}

impl SessionController {
    pub fn new(bridge: Arc<StreamBridge>) -> Self {
        Self {
            bridge,
            casting: AtomicBool::new(false),
        }
    }

    /// Applies a session state change.
    ///
    /// Active states start the bridge. Ending states stop it and drop every
    /// registration so the next session starts empty. Transitional states
    /// leave everything as is.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Bind` - The bridge could not start listening
    /// - `BridgeError::Io` - The bound socket could not report its address
    pub async fn handle(&self, state: RemoteSessionState) -> Result<(), BridgeError> {
        tracing::debug!("Remote session state: {:?}", state);

        if state.is_active() {
            let info = self.bridge.start().await?;
            self.casting.store(true, Ordering::SeqCst);
            tracing::info!("Casting session active, serving at {}", info.base_url);
        } else if state.is_terminal() {
            self.casting.store(false, Ordering::SeqCst);
            self.bridge.stop().await;
            self.bridge.clear_registered_files();
            tracing::info!("Casting session over after {:?}", state);
        }

        Ok(())
    }

    /// Whether the last session event left a session active.
    pub fn is_casting(&self) -> bool {
        self.casting.load(Ordering::SeqCst)
    }

    pub fn bridge(&self) -> &Arc<StreamBridge> {
        &self.bridge
    }
}

#[cfg(test)]
mod tests {
    use castline_core::BridgeConfig;
    use castline_core::locator::test_fixtures::InMemoryResolver;

    use super::*;

    fn controller() -> SessionController {
        let bridge = StreamBridge::new(
            BridgeConfig::for_testing(),
            Arc::new(InMemoryResolver::new()),
        );
        SessionController::new(Arc::new(bridge))
    }

    #[tokio::test]
    async fn test_started_then_ended() {
        let controller = controller();

        controller.handle(RemoteSessionState::Started).await.unwrap();
        assert!(controller.is_casting());
        assert!(controller.bridge().is_running());

        controller.bridge().register_file("/a.mp3").unwrap();

        controller.handle(RemoteSessionState::Ended).await.unwrap();
        assert!(!controller.is_casting());
        assert!(!controller.bridge().is_running());
        assert_eq!(controller.bridge().registered_count(), 0);
    }

    #[tokio::test]
    async fn test_transitional_states_are_noops() {
        let controller = controller();

        for state in [
            RemoteSessionState::Starting,
            RemoteSessionState::Ending,
            RemoteSessionState::Resuming,
            RemoteSessionState::Suspended,
        ] {
            controller.handle(state).await.unwrap();
            assert!(!controller.bridge().is_running(), "{state:?}");
        }

        controller.handle(RemoteSessionState::Resumed).await.unwrap();
        controller.handle(RemoteSessionState::Suspended).await.unwrap();
        assert!(controller.is_casting());
        assert!(controller.bridge().is_running());

        controller.handle(RemoteSessionState::Ended).await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_stop_and_clear() {
        for failure in [RemoteSessionState::StartFailed, RemoteSessionState::ResumeFailed] {
            let controller = controller();
            controller.handle(RemoteSessionState::Started).await.unwrap();
            controller.bridge().register_artwork("/cover.jpg").unwrap();

            controller.handle(failure).await.unwrap();

            assert!(!controller.bridge().is_running());
            assert_eq!(controller.bridge().registered_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_rapid_transitions_keep_one_server() {
        let controller = controller();

        controller.handle(RemoteSessionState::Started).await.unwrap();
        let port = controller.bridge().server_info().unwrap().listen_addr.port();
        controller.handle(RemoteSessionState::Resumed).await.unwrap();
        controller.handle(RemoteSessionState::Started).await.unwrap();

        assert_eq!(
            controller.bridge().server_info().unwrap().listen_addr.port(),
            port
        );

        controller.handle(RemoteSessionState::Ended).await.unwrap();
        controller.handle(RemoteSessionState::Ended).await.unwrap();
        assert!(!controller.is_casting());
    }
}
