//! Token checks, unknown IDs and malformed paths.

use reqwest::{Method, StatusCode};

use crate::common::{TestBridge, patterned_bytes, with_id, with_token};

#[tokio::test]
async fn test_wrong_token_is_forbidden_even_for_valid_id() {
    let bridge = TestBridge::start().await;
    let url = bridge.serve_audio("track.mp3", &patterned_bytes(100));

    let response = bridge.get(&with_token(&url, "wrong-token")).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.text().await.unwrap(), "Forbidden");
}

#[tokio::test]
async fn test_wrong_token_with_unknown_id_is_forbidden() {
    let bridge = TestBridge::start().await;
    let base = bridge.bridge.base_url().unwrap();

    let response = bridge.get(&format!("{base}/audio/wrong-token/abc")).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_id_is_not_found_for_any_method() {
    let bridge = TestBridge::start().await;
    let url = bridge.serve_audio("track.mp3", &patterned_bytes(100));
    let unknown = with_id(&url, "abc");

    for method in [Method::GET, Method::HEAD, Method::POST, Method::PUT] {
        let response = bridge
            .client
            .request(method.clone(), &unknown)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");
    }
}

#[tokio::test]
async fn test_short_paths_are_not_found() {
    let bridge = TestBridge::start().await;
    let base = bridge.bridge.base_url().unwrap();
    let token = bridge.bridge.session_token().as_str().to_string();

    for path in [String::new(), "/audio".to_string(), format!("/audio/{token}")] {
        let response = bridge.get(&format!("{base}{path}")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {path:?}");
        assert_eq!(response.text().await.unwrap(), "Not found");
    }
}

#[tokio::test]
async fn test_clear_invalidates_urls() {
    let bridge = TestBridge::start().await;
    let url = bridge.serve_audio("track.mp3", &patterned_bytes(100));
    let art = bridge.serve_artwork("cover.jpg", &patterned_bytes(10));
    assert_eq!(bridge.get(&url).await.status(), StatusCode::OK);

    bridge.bridge.clear_registered_files();

    assert_eq!(bridge.get(&url).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(bridge.get(&art).await.status(), StatusCode::NOT_FOUND);

    // New registrations work straight away
    let fresh = bridge.serve_audio("next.mp3", &patterned_bytes(100));
    assert_eq!(bridge.get(&fresh).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_tokens_are_per_bridge() {
    let first = TestBridge::start().await;
    let second = TestBridge::start().await;
    let url = first.serve_audio("track.mp3", &patterned_bytes(100));

    // Same ID, other bridge's token
    let foreign = with_token(&url, second.bridge.session_token().as_str());
    assert_eq!(first.get(&foreign).await.status(), StatusCode::FORBIDDEN);
}
