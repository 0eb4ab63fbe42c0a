//! Start, stop and restart of the bridge with real connections.

#[cfg(target_os = "linux")]
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use castline_core::{BridgeConfig, FsResolver};
use castline_web::{BridgeError, StreamBridge};
use reqwest::StatusCode;

use crate::common::{TestBridge, client, patterned_bytes};

#[tokio::test]
async fn test_start_twice_keeps_port() {
    let bridge = TestBridge::start().await;
    let first = bridge.bridge.server_info().unwrap();

    let second = bridge.bridge.start().await.unwrap();

    assert_eq!(first.listen_addr.port(), second.listen_addr.port());
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let bridge = TestBridge::start().await;
    let url = bridge.serve_audio("track.mp3", &patterned_bytes(100));
    assert_eq!(bridge.get(&url).await.status(), StatusCode::OK);

    bridge.bridge.stop().await;
    bridge.bridge.stop().await;

    assert!(!bridge.bridge.is_running());
    assert!(bridge.client.get(&url).send().await.is_err());
}

#[tokio::test]
async fn test_register_while_stopped_fails() {
    let bridge = StreamBridge::new(BridgeConfig::for_testing(), Arc::new(FsResolver::new()));

    assert!(matches!(
        bridge.register_file("/music/a.mp3"),
        Err(BridgeError::NotRunning)
    ));
    assert!(matches!(
        bridge.register_artwork("/music/a.jpg"),
        Err(BridgeError::NotRunning)
    ));
    assert_eq!(bridge.registered_count(), 0);
}

#[tokio::test]
async fn test_restart_keeps_token_and_registrations() {
    let bridge = TestBridge::start().await;
    let token = bridge.bridge.session_token().clone();
    let path = bridge.write_file("track.mp3", &patterned_bytes(100));
    let old_url = bridge
        .bridge
        .register_file(path.to_string_lossy().into_owned())
        .unwrap();
    let id = old_url.rsplit('/').next().unwrap().to_string();

    bridge.bridge.stop().await;
    let info = bridge.bridge.start().await.unwrap();

    assert_eq!(bridge.bridge.session_token(), &token);
    let new_url = format!("{}/audio/{}/{}", info.base_url, token.as_str(), id);
    assert_eq!(bridge.get(&new_url).await.status(), StatusCode::OK);
}

/// Descriptors this process holds on `path`.
#[cfg(target_os = "linux")]
fn open_handles(path: &Path) -> usize {
    let target = std::fs::canonicalize(path).unwrap();
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| std::fs::read_link(entry.path()).ok())
        .filter(|link| *link == target)
        .count()
}

#[tokio::test]
async fn test_stop_cuts_off_stalled_download() {
    let mut config = BridgeConfig::for_testing();
    config.server.shutdown_grace = Duration::from_millis(100);
    let bridge = TestBridge::start_with(config).await;

    let total = 32 * 1024 * 1024;
    let path = bridge.write_file("long.flac", &patterned_bytes(total));
    let url = bridge
        .bridge
        .register_file(path.to_string_lossy().into_owned())
        .unwrap();

    let mut response = client().get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut received = response.chunk().await.unwrap().map_or(0, |chunk| chunk.len());

    // The client stops reading while the server still has most of the file
    tokio::time::timeout(Duration::from_secs(5), bridge.bridge.stop())
        .await
        .expect("stop should not wait for the stalled client");
    assert!(!bridge.bridge.is_running());

    // The file is released before the client reads again
    #[cfg(target_os = "linux")]
    {
        let mut handles = open_handles(&path);
        for _ in 0..50 {
            if handles == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            handles = open_handles(&path);
        }
        assert_eq!(handles, 0);
    }

    while let Ok(Some(chunk)) = response.chunk().await {
        received += chunk.len();
    }
    assert!(received < total);
}
