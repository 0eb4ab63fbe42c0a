//! Full casting session driven through the session controller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use castline_core::{BridgeConfig, FsResolver};
use castline_web::{RemoteSessionState, SessionController, StreamBridge};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use tempfile::TempDir;

struct Library {
    dir: TempDir,
}

impl Library {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn add(&self, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let data = castline_core::locator::test_fixtures::patterned_bytes(len);
        let path = self.dir.path().join(name);
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }
}

fn receiver() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn locator(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_cast_session_from_start_to_resume() {
    let library = Library::new();
    let (first_path, first_data) = library.add("01 - Opening.flac", 300_000);
    let (second_path, _) = library.add("02 - Interlude.mp3", 50_000);
    let (cover_path, cover_data) = library.add("cover.jpg", 2_048);

    let bridge = Arc::new(StreamBridge::new(
        BridgeConfig::for_testing(),
        Arc::new(FsResolver::new()),
    ));
    let controller = SessionController::new(Arc::clone(&bridge));
    let client = receiver();

    // Framework connects to the receiver
    controller.handle(RemoteSessionState::Starting).await.unwrap();
    assert!(!bridge.is_running());
    controller.handle(RemoteSessionState::Started).await.unwrap();
    assert!(controller.is_casting());

    // Host loads its queue
    let first_url = bridge.register_file(locator(&first_path)).unwrap();
    let second_url = bridge.register_file(locator(&second_path)).unwrap();
    let cover_url = bridge.register_artwork(locator(&cover_path)).unwrap();

    // Receiver shows the artwork
    let cover = client.get(&cover_url).send().await.unwrap();
    assert_eq!(cover.status(), StatusCode::OK);
    assert_eq!(cover.headers()[CONTENT_TYPE], "image/jpeg");
    assert_eq!(cover.bytes().await.unwrap().to_vec(), cover_data);

    // Receiver opens the track, then seeks into the middle
    let initial = client
        .get(&first_url)
        .header(RANGE, "bytes=0-")
        .send()
        .await
        .unwrap();
    assert_eq!(initial.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(initial.headers()[CONTENT_TYPE], "audio/flac");
    assert_eq!(initial.headers()[CONTENT_RANGE], "bytes 0-299999/300000");
    drop(initial);

    let seek = client
        .get(&first_url)
        .header(RANGE, "bytes=150000-")
        .send()
        .await
        .unwrap();
    assert_eq!(seek.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        seek.bytes().await.unwrap().to_vec(),
        first_data[150_000..].to_vec()
    );

    // Pausing on the framework side keeps everything up
    controller.handle(RemoteSessionState::Suspended).await.unwrap();
    let next = client.get(&second_url).send().await.unwrap();
    assert_eq!(next.status(), StatusCode::OK);
    assert_eq!(next.headers()[CONTENT_TYPE], "audio/mpeg");

    // Session ends: server down, queue forgotten
    controller.handle(RemoteSessionState::Ending).await.unwrap();
    assert!(bridge.is_running());
    controller.handle(RemoteSessionState::Ended).await.unwrap();
    assert!(!controller.is_casting());
    assert!(!bridge.is_running());
    assert_eq!(bridge.registered_count(), 0);
    assert!(client.get(&first_url).send().await.is_err());

    // A resumed session starts empty with the same token
    controller.handle(RemoteSessionState::Resumed).await.unwrap();
    let base = bridge.base_url().unwrap();
    let old_id = first_url.rsplit('/').next().unwrap();
    let token = bridge.session_token().as_str().to_string();

    let stale = client
        .get(format!("{base}/audio/{token}/{old_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::NOT_FOUND);

    let replayed = bridge.register_file(locator(&first_path)).unwrap();
    assert!(replayed.contains(&token));
    let again = client.get(&replayed).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(again.bytes().await.unwrap().len(), 300_000);

    controller.handle(RemoteSessionState::Ended).await.unwrap();
}

#[tokio::test]
async fn test_failed_session_start_leaves_nothing_served() {
    let library = Library::new();
    let (path, _) = library.add("track.ogg", 1_000);

    let bridge = Arc::new(StreamBridge::new(
        BridgeConfig::for_testing(),
        Arc::new(FsResolver::new()),
    ));
    let controller = SessionController::new(Arc::clone(&bridge));

    controller.handle(RemoteSessionState::Started).await.unwrap();
    let url = bridge.register_file(locator(&path)).unwrap();

    controller.handle(RemoteSessionState::ResumeFailed).await.unwrap();

    assert!(!bridge.is_running());
    assert_eq!(bridge.registered_count(), 0);
    assert!(receiver().get(&url).send().await.is_err());
}
