//! Request handlers for the clip API.

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::{CookieCredentials, CredentialStatus};
use crate::media::MediaKind;
use crate::pipeline::ClipRequest;
use crate::utils;

/// Query string shared by `/clip` and `/voice`
#[derive(Debug, Deserialize)]
pub struct ClipQuery {
    pub url: String,
    pub start: String,
    pub end: String,
}

/// Download a video clip (MP4)
pub async fn clip(
    State(state): State<AppState>,
    query: Result<Query<ClipQuery>, QueryRejection>,
) -> ApiResult<Response> {
    deliver(state, query, MediaKind::Video).await
}

/// Download an audio clip (MP3)
pub async fn voice(
    State(state): State<AppState>,
    query: Result<Query<ClipQuery>, QueryRejection>,
) -> ApiResult<Response> {
    deliver(state, query, MediaKind::Audio).await
}

async fn deliver(
    state: AppState,
    query: Result<Query<ClipQuery>, QueryRejection>,
    kind: MediaKind,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let request = ClipRequest::new(query.url, query.start, query.end, kind);
    let artifact = state.pipeline.produce_clip(&request).await?;

    let file = tokio::fs::File::open(&artifact.path).await.map_err(|e| {
        tracing::error!(id = %artifact.id, "Finished clip vanished before streaming: {}", e);
        ApiError::internal("Clip file is no longer available")
    })?;

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, kind.mime_type().to_string()),
            (header::CONTENT_LENGTH, artifact.size_bytes.to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&artifact.download_name),
            ),
        ],
        body,
    )
        .into_response())
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

/// Manually trigger cleanup of old files
pub async fn cleanup(State(state): State<AppState>) -> Response {
    match state.scheduler.sweep().await {
        Ok(report) => Json(json!({
            "message": "Cleanup completed successfully",
            "removed": report.removed.len(),
            "failed": report.failed,
            "files": report.removed,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Manual cleanup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Cleanup failed: {}", e) })),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
pub struct ToolStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ToolStatus {
    async fn probe(command: &str, version_flag: &str) -> Self {
        let version = utils::tool_version(command, version_flag).await;
        Self {
            available: version.is_some(),
            version,
        }
    }
}

#[derive(Serialize)]
pub struct CleanupStatus {
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub transcoder: ToolStatus,
    pub resolver: ToolStatus,
    pub credentials: CredentialStatus,
    pub work_dir: String,
    pub cleanup: CleanupStatus,
}

/// Report external tool and credential availability
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (transcoder, resolver, credentials) = tokio::join!(
        ToolStatus::probe(&state.tools.ffmpeg, "-version"),
        ToolStatus::probe(&state.tools.yt_dlp, "--version"),
        CookieCredentials::status(state.pipeline.cookies()),
    );
    let policy = state.scheduler.policy();

    Json(StatusResponse {
        transcoder,
        resolver,
        credentials,
        work_dir: state.pipeline.store().root().display().to_string(),
        cleanup: CleanupStatus {
            max_age_secs: policy.max_age_secs,
            sweep_interval_secs: policy.sweep_interval_secs,
        },
    })
}

/// API documentation
pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Klippd - YouTube Video Clipper API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/clip": "Download video clip (MP4) from YouTube",
            "/voice": "Download audio clip (MP3) from YouTube",
            "/cleanup": "Manual cleanup of temp files",
            "/status": "External tool and credential status"
        },
        "usage": {
            "clip": "/clip?url=YOUTUBE_URL&start=HH:MM:SS&end=HH:MM:SS",
            "voice": "/voice?url=YOUTUBE_URL&start=HH:MM:SS&end=HH:MM:SS"
        },
        "example": {
            "url": "https://www.youtube.com/watch?v=VIDEO_ID",
            "start": "00:01:30",
            "end": "00:02:45"
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("My Talk_clip.mp4"),
            "attachment; filename=\"My Talk_clip.mp4\"; filename*=UTF-8''My%20Talk_clip.mp4"
        );
    }

    #[test]
    fn test_content_disposition_unicode() {
        let value = content_disposition("Café_voice.mp3");
        assert!(value.contains("filename=\"Caf__voice.mp3\""));
        assert!(value.contains("filename*=UTF-8''Caf%C3%A9_voice.mp3"));
        assert!(value.is_ascii());
    }
}
