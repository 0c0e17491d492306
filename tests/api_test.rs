//! API integration tests
//!
//! Drives the router with `oneshot` requests. The yt-dlp capabilities are
//! replaced with in-process fakes so no network or external tools are needed.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use klippd::config::ToolsConfig;
use klippd::pipeline::{ClipFetcher, FetchRequest};
use klippd::resolver::{MediaMetadata, MetadataProbe};
use klippd::scheduler::CleanupPolicy;
use klippd::server::{create_router, AppState};
use klippd::ytdlp::FetchError;
use klippd::{ArtifactStore, CleanupScheduler, ClipPipeline, MediaResolver};
use std::fs::{File, FileTimes};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tower::ServiceExt;

const CLIP_BYTES: &[u8] = b"not really an mp4 but long enough to stream";

struct FakeProbe {
    title: Option<&'static str>,
    fail: bool,
}

#[async_trait]
impl MetadataProbe for FakeProbe {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        if self.fail {
            return Err(FetchError::Failed {
                tool: "yt-dlp".to_string(),
                message: "ERROR: Video unavailable".to_string(),
            });
        }
        Ok(MediaMetadata {
            title: self.title.map(str::to_string),
            webpage_url: Some(url.to_string()),
            duration: Some(600.0),
            extractor: Some("youtube".to_string()),
        })
    }
}

/// Writes a fixed payload to the requested output path
struct FakeFetcher;

#[async_trait]
impl ClipFetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), FetchError> {
        tokio::fs::write(&request.output, CLIP_BYTES)
            .await
            .map_err(|source| FetchError::Launch {
                tool: "fake".to_string(),
                source,
            })
    }
}

fn create_test_app(work_dir: &Path, probe: FakeProbe) -> Router {
    let store = Arc::new(ArtifactStore::new(work_dir));
    let pipeline = ClipPipeline::new(
        MediaResolver::new(Arc::new(probe)),
        Arc::new(FakeFetcher),
        store.clone(),
    );
    let scheduler = CleanupScheduler::new(store, CleanupPolicy::default());
    let tools = ToolsConfig {
        yt_dlp: "klippd-test-missing-yt-dlp".to_string(),
        ffmpeg: "klippd-test-missing-ffmpeg".to_string(),
    };

    create_router(
        AppState::new(Arc::new(pipeline), scheduler, tools),
        &["*".to_string()],
    )
}

fn working_probe() -> FakeProbe {
    FakeProbe {
        title: Some("Rust: The Talk!"),
        fail: false,
    }
}

async fn body_bytes(body: Body) -> Vec<u8> {
    body.collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_root_describes_endpoints() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert!(json["endpoints"]["/clip"].is_string());
    assert!(json["endpoints"]["/voice"].is_string());
    assert!(json["usage"]["clip"].as_str().unwrap().contains("start=HH:MM:SS"));
}

#[tokio::test]
async fn test_clip_streams_mp4() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let response = app
        .oneshot(
            Request::get("/clip?url=https://www.youtube.com/watch?v%3Dabc&start=00:01:00&end=00:01:30")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::CONTENT_LENGTH], CLIP_BYTES.len().to_string().as_str());
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("filename=\"Rust The Talk_clip.mp4\""));

    assert_eq!(body_bytes(response.into_body()).await, CLIP_BYTES);

    // The artifact stays behind until the sweeper removes it
    let files = files_in(tmp.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("_clip.mp4"));
}

#[tokio::test]
async fn test_voice_streams_mp3() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), FakeProbe { title: None, fail: false });

    let response = app
        .oneshot(
            Request::get("/voice?url=https://youtu.be/abc&start=10&end=1:10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("filename=\"audio_voice.mp3\""));
}

#[tokio::test]
async fn test_inverted_range_is_rejected_before_any_work() {
    let tmp = TempDir::new().unwrap();
    let work_dir = tmp.path().join("work");
    let app = create_test_app(&work_dir, working_probe());

    let response = app
        .oneshot(
            Request::get("/clip?url=https://youtu.be/abc&start=00:02:00&end=00:01:00")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["kind"], "invalid_range");
    assert!(json["details"].as_str().unwrap().contains("must be after start"));
    assert!(files_in(&work_dir).is_empty());
}

#[tokio::test]
async fn test_malformed_timestamp_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let response = app
        .oneshot(
            Request::get("/voice?url=https://youtu.be/abc&start=1:xx&end=00:01:00")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["kind"], "malformed_timestamp");
}

#[tokio::test]
async fn test_missing_query_parameter_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let response = app
        .oneshot(
            Request::get("/clip?url=https://youtu.be/abc&start=00:00:10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["kind"], "bad_request");
    assert!(json["details"].as_str().unwrap().contains("end"));
}

#[tokio::test]
async fn test_unresolvable_source_is_server_error_and_leaves_nothing() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), FakeProbe { title: None, fail: true });

    let response = app
        .oneshot(
            Request::get("/clip?url=https://youtu.be/gone&start=0&end=30")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"], "Internal server error");
    assert_eq!(json["kind"], "unresolvable_source");
    assert!(files_in(tmp.path()).is_empty());
}

#[tokio::test]
async fn test_non_http_url_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let response = app
        .oneshot(
            Request::get("/clip?url=file:///etc/passwd&start=0&end=30")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cleanup_endpoint_removes_old_files() {
    let tmp = TempDir::new().unwrap();
    let stale = tmp.path().join("old_clip.mp4");
    File::create(&stale)
        .unwrap()
        .set_times(FileTimes::new().set_modified(SystemTime::now() - Duration::from_secs(2 * 3600)))
        .unwrap();
    std::fs::write(tmp.path().join("new_voice.mp3"), b"fresh").unwrap();

    let app = create_test_app(tmp.path(), working_probe());
    let response = app
        .oneshot(Request::get("/cleanup").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["message"], "Cleanup completed successfully");
    assert_eq!(json["removed"], 1);
    assert_eq!(json["files"][0], "old_clip.mp4");
    assert!(!stale.exists());
    assert!(tmp.path().join("new_voice.mp3").exists());
}

#[tokio::test]
async fn test_status_reports_missing_tools() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let response = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["transcoder"]["available"], false);
    assert_eq!(json["resolver"]["available"], false);
    assert_eq!(json["credentials"]["configured"], false);
    assert_eq!(json["cleanup"]["max_age_secs"], 3600);
    assert_eq!(json["cleanup"]["sweep_interval_secs"], 1800);
}

#[tokio::test]
async fn test_concurrent_clips_get_distinct_files() {
    let tmp = TempDir::new().unwrap();
    let app = create_test_app(tmp.path(), working_probe());

    let mut handles = Vec::new();
    for i in 0..6 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let uri = format!("/voice?url=https://youtu.be/abc&start={}&end={}", i, i + 5);
            app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap()
                .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(files_in(tmp.path()).len(), 6);
}
