//! Streaming behaviour over a real socket: full downloads, ranges, HEAD and
//! content types.

use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};

use crate::common::{TestBridge, patterned_bytes, with_kind};

fn header<'a>(response: &'a reqwest::Response, name: reqwest::header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_full_download_declares_length() {
    let bridge = TestBridge::start().await;
    let data = patterned_bytes(1000);
    let url = bridge.serve_audio("track.mp3", &data);

    let response = bridge.get(&url).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_LENGTH), "1000");
    assert_eq!(header(&response, ACCEPT_RANGES), "bytes");
    assert_eq!(header(&response, CONTENT_TYPE), "audio/mpeg");
    assert_eq!(response.bytes().await.unwrap().to_vec(), data);
}

#[tokio::test]
async fn test_open_ended_range() {
    let bridge = TestBridge::start().await;
    let data = patterned_bytes(1000);
    let url = bridge.serve_audio("track.mp3", &data);

    let response = bridge.get_range(&url, "bytes=500-").await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, CONTENT_RANGE), "bytes 500-999/1000");
    assert_eq!(header(&response, CONTENT_LENGTH), "500");
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), 500);
    assert_eq!(body.to_vec(), data[500..].to_vec());
}

#[tokio::test]
async fn test_range_windows_match_file() {
    let bridge = TestBridge::start().await;
    let data = patterned_bytes(200_000);
    let url = bridge.serve_audio("track.flac", &data);

    for (start, end) in [(0u64, 0u64), (1, 1), (65_535, 65_536), (131_072, 199_999), (12_345, 150_000)] {
        let response = bridge
            .get_range(&url, &format!("bytes={start}-{end}"))
            .await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header(&response, CONTENT_RANGE),
            format!("bytes {start}-{end}/200000")
        );

        let body = response.bytes().await.unwrap();
        assert_eq!(body.len() as u64, end - start + 1);
        assert_eq!(body[0], data[start as usize]);
        assert_eq!(body.to_vec(), data[start as usize..=end as usize].to_vec());
    }
}

#[tokio::test]
async fn test_out_of_bounds_ranges_degrade() {
    let bridge = TestBridge::start().await;
    let data = patterned_bytes(1000);
    let url = bridge.serve_audio("track.mp3", &data);

    // End past the file is clamped
    let clamped = bridge.get_range(&url, "bytes=900-5000").await;
    assert_eq!(clamped.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&clamped, CONTENT_RANGE), "bytes 900-999/1000");

    // Start past the file serves everything
    let past_end = bridge.get_range(&url, "bytes=1000-").await;
    assert_eq!(past_end.status(), StatusCode::OK);
    assert_eq!(past_end.bytes().await.unwrap().len(), 1000);

    // Garbage reads from the start
    let garbage = bridge.get_range(&url, "bytes=abc-").await;
    assert_eq!(garbage.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&garbage, CONTENT_RANGE), "bytes 0-999/1000");
}

#[tokio::test]
async fn test_concurrent_disjoint_ranges() {
    let bridge = TestBridge::start().await;
    let data = patterned_bytes(4 * 1024 * 1024);
    let url = bridge.serve_audio("long.flac", &data);

    let first = async {
        let response = bridge.get_range(&url, "bytes=0-1048575").await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        response.bytes().await.unwrap()
    };
    let second = async {
        let response = bridge.get_range(&url, "bytes=3000000-").await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        response.bytes().await.unwrap()
    };

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.to_vec(), data[..1_048_576].to_vec());
    assert_eq!(second.to_vec(), data[3_000_000..].to_vec());
}

#[tokio::test]
async fn test_head_returns_headers_without_body() {
    let bridge = TestBridge::start().await;
    let url = bridge.serve_audio("track.ogg", &patterned_bytes(1000));

    let response = bridge.client.head(&url).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, ACCEPT_RANGES), "bytes");
    assert_eq!(header(&response, CONTENT_TYPE), "audio/ogg");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_content_types_by_kind() {
    let bridge = TestBridge::start().await;
    let art_url = bridge.serve_artwork("cover.png", &patterned_bytes(64));
    let audio_url = bridge.serve_audio("song.m4a", &patterned_bytes(64));

    let art = bridge.get(&art_url).await;
    assert_eq!(header(&art, CONTENT_TYPE), "image/jpeg");

    let audio = bridge.get(&audio_url).await;
    assert_eq!(header(&audio, CONTENT_TYPE), "audio/mp4");

    // Unknown kinds are served like audio
    let video = bridge.get(&with_kind(&audio_url, "video")).await;
    assert_eq!(video.status(), StatusCode::OK);
    assert_eq!(header(&video, CONTENT_TYPE), "audio/mp4");

    // The artwork kind forces the image type whatever was registered
    let forced = bridge.get(&with_kind(&audio_url, "artwork")).await;
    assert_eq!(header(&forced, CONTENT_TYPE), "image/jpeg");
}

#[tokio::test]
async fn test_unknown_extension_falls_back_to_mpeg() {
    let bridge = TestBridge::start().await;
    let url = bridge.serve_audio("recording.bin", &patterned_bytes(16));

    let response = bridge.get(&url).await;
    assert_eq!(header(&response, CONTENT_TYPE), "audio/mpeg");
}

#[tokio::test]
async fn test_deleted_file_is_server_error() {
    let bridge = TestBridge::start().await;
    let path = bridge.write_file("gone.mp3", &patterned_bytes(16));
    let url = bridge
        .bridge
        .register_file(path.to_string_lossy().into_owned())
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    let response = bridge.get(&url).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().starts_with("Error: "));
}
