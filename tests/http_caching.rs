//! Integration tests for HTTP caching
//!
//! Runs the real coordinator and `HttpDownloader` against a local wiremock
//! server.

use clipcache_core::config::{DirectoryRetry, StabilityOptions};
use clipcache_core::download::{DownloadProgress, Downloader, HttpDownloader};
use clipcache_core::{CacheError, CoreConfig, DownloadCoordinator};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(root: &Path) -> CoreConfig {
    CoreConfig {
        stability: StabilityOptions {
            initial_delay_ms: 5,
            max_retries: 5,
            base_delay_ms: 5,
            allow_empty: false,
        },
        directory_retry: DirectoryRetry { attempts: 3, delay_ms: 5 },
        ..CoreConfig::with_root(root)
    }
}

fn video_body() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_download_caches_body_and_reuses_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/videos/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(video_body()))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let coordinator = DownloadCoordinator::new(&test_config(temp_dir.path())).unwrap();
    let url = format!("{}/videos/clip.mp4?token=abc", server.uri());

    let first = coordinator.start_caching(&url).await.unwrap();
    let second = coordinator.start_caching(&url).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.extension().unwrap(), "mp4");
    assert_eq!(tokio::fs::read(&first).await.unwrap(), video_body());
    // expect(1) is verified when the server drops
}

#[tokio::test]
async fn test_concurrent_requests_hit_server_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(video_body())
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let coordinator = DownloadCoordinator::new(&test_config(temp_dir.path())).unwrap();
    let url = format!("{}/slow.mp4", server.uri());

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = coordinator.clone();
            let url = url.clone();
            tokio::spawn(async move { coordinator.start_caching(&url).await })
        })
        .collect();

    let mut paths = Vec::new();
    for task in tasks {
        paths.push(task.await.unwrap().unwrap());
    }

    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn test_server_error_is_wrapped_and_leaves_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let coordinator = DownloadCoordinator::new(&test_config(temp_dir.path())).unwrap();
    let url = format!("{}/missing.mp4", server.uri());

    let err = coordinator.start_caching(&url).await.unwrap_err();

    match &err {
        CacheError::DownloadFailed { url: failed, source } => {
            assert_eq!(failed, &url);
            assert!(matches!(
                **source,
                CacheError::UnexpectedStatusCode { status_code: 404, .. }
            ));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.is_retryable());
    assert_eq!(coordinator.cache_usage().await.unwrap().files, 0);
    assert_eq!(coordinator.sweep_partial_downloads().await.unwrap(), 0);
}

#[tokio::test]
async fn test_downloader_sends_configured_headers_and_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.mp4"))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(video_body()))
        .mount(&server)
        .await;

    let mut config = test_config(Path::new("/unused"));
    config.download.request_headers =
        HashMap::from([("Authorization".to_string(), "Bearer t0ken".to_string())]);
    let downloader = HttpDownloader::new(&config.download).unwrap();

    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("private.mp4.part");
    let seen: Arc<Mutex<Vec<DownloadProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let bytes = downloader
        .download(
            &format!("{}/private.mp4", server.uri()),
            &dest,
            Some(Arc::new(move |p: DownloadProgress| sink.lock().unwrap().push(p))),
        )
        .await
        .unwrap();

    assert_eq!(bytes, 200_000);
    let seen = seen.lock().unwrap();
    let last = seen.last().unwrap();
    assert_eq!(last.bytes_downloaded, 200_000);
    assert_eq!(last.total_bytes, 200_000);
    assert_eq!(last.percent_complete, 100.0);
}
