use chrono::{DateTime, Utc};
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

pub mod fetcher;

pub use fetcher::{ClipFetcher, FetchRequest, TranscodeOptions, YtDlpFetcher};
pub use crate::ytdlp::FetchError;

use crate::auth::CookieCredentials;
use crate::media::MediaKind;
use crate::resolver::MediaResolver;
use crate::store::{ArtifactStore, Reservation};
use crate::timerange::{self, TimeRange};
use crate::utils::format_file_size;
use crate::ClipError;

/// One clip request as received from a caller
#[derive(Debug, Clone)]
pub struct ClipRequest {
    /// Public media URL
    pub url: String,

    /// Start timestamp (`SS`, `MM:SS` or `HH:MM:SS`)
    pub start: String,

    /// End timestamp, same forms as `start`
    pub end: String,

    pub kind: MediaKind,
}

impl ClipRequest {
    pub fn new(
        url: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        kind: MediaKind,
    ) -> Self {
        Self {
            url: url.into(),
            start: start.into(),
            end: end.into(),
            kind,
        }
    }
}

/// A finished clip sitting in the working directory
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,

    pub path: PathBuf,

    pub kind: MediaKind,

    pub created_at: DateTime<Utc>,

    /// Suggested download name: sanitized title + suffix + extension
    pub download_name: String,

    pub size_bytes: u64,
}

/// Orchestrates resolve → fetch/trim → verify for one request at a time
///
/// The pipeline holds no per-request state, so a single instance is shared
/// by every concurrent request.
pub struct ClipPipeline {
    resolver: MediaResolver,
    fetcher: Arc<dyn ClipFetcher>,
    store: Arc<ArtifactStore>,
    cookies: Option<CookieCredentials>,
}

impl ClipPipeline {
    pub fn new(resolver: MediaResolver, fetcher: Arc<dyn ClipFetcher>, store: Arc<ArtifactStore>) -> Self {
        Self {
            resolver,
            fetcher,
            store,
            cookies: None,
        }
    }

    /// Authenticate downloads with `cookies`, falling back to anonymous once if they are rejected
    pub fn with_cookies(mut self, cookies: Option<CookieCredentials>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    pub fn cookies(&self) -> Option<&CookieCredentials> {
        self.cookies.as_ref()
    }

    /// Produce a trimmed artifact for `request`
    ///
    /// Input is validated before anything touches the network. Once a path
    /// has been reserved, every failure removes whatever was written there
    /// before the error is returned.
    #[tracing::instrument(skip_all, fields(kind = %request.kind, start = %request.start, end = %request.end))]
    pub async fn produce_clip(&self, request: &ClipRequest) -> Result<Artifact, ClipError> {
        let range = timerange::to_duration(&request.start, &request.end)?;
        let reservation = self.store.reserve(request.kind).await?;

        match self.produce_reserved(request, range, &reservation).await {
            Ok(artifact) => {
                tracing::info!(
                    id = %artifact.id,
                    size = %format_file_size(artifact.size_bytes),
                    "Clip ready: {}",
                    artifact.download_name
                );
                Ok(artifact)
            }
            Err(e) => {
                tracing::warn!(id = %reservation.id, "Clip failed: {}", e);
                self.store.discard(&reservation).await;
                Err(e)
            }
        }
    }

    async fn produce_reserved(
        &self,
        request: &ClipRequest,
        range: TimeRange,
        reservation: &Reservation,
    ) -> Result<Artifact, ClipError> {
        let media = self.resolver.resolve(&request.url, request.kind).await?;

        let fetch = FetchRequest {
            url: media.stream.url.clone(),
            range,
            kind: request.kind,
            output: reservation.path.clone(),
            cookies: self.cookies.as_ref().map(|c| c.path().to_path_buf()),
        };
        self.fetch_with_auth_fallback(fetch, reservation).await?;

        let size_bytes = verify_output(&reservation.path).await?;
        refresh_timestamps(&reservation.path).await;

        Ok(Artifact {
            id: reservation.id.clone(),
            path: reservation.path.clone(),
            kind: request.kind,
            created_at: Utc::now(),
            download_name: request.kind.download_name(&media.title),
            size_bytes,
        })
    }

    /// Run the fetch, retrying exactly once without cookies if the upstream rejects them
    async fn fetch_with_auth_fallback(
        &self,
        mut fetch: FetchRequest,
        reservation: &Reservation,
    ) -> Result<(), ClipError> {
        match self.fetcher.fetch(&fetch).await {
            Err(FetchError::AuthRejected { message, .. }) if fetch.cookies.is_some() => {
                tracing::warn!("Upstream rejected cookies ({}), retrying without them", message);
                self.store.discard(reservation).await;
                fetch.cookies = None;
                self.fetcher.fetch(&fetch).await.map_err(into_clip_error)
            }
            result => result.map_err(into_clip_error),
        }
    }
}

fn into_clip_error(error: FetchError) -> ClipError {
    match error {
        FetchError::AuthRejected { message, .. } => ClipError::UpstreamAuthFailure(message),
        FetchError::Timeout { timeout, .. } => ClipError::UpstreamTimeout(timeout),
        other => ClipError::TranscodeFailure(other.to_string()),
    }
}

/// A zero exit status does not prove a file was written
async fn verify_output(path: &Path) -> Result<u64, ClipError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Ok(metadata.len()),
        Ok(_) => Err(ClipError::OutputMissing),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ClipError::OutputMissing),
        Err(e) => Err(ClipError::Storage(e)),
    }
}

/// Stamp access and modification times with "now"; failures are only logged
async fn refresh_timestamps(path: &Path) {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        let now = SystemTime::now();
        let file = File::options().write(true).open(&owned)?;
        file.set_times(FileTimes::new().set_accessed(now).set_modified(now))
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Could not update file dates for {}: {}", path.display(), e),
        Err(e) => tracing::warn!("File date update task failed: {}", e),
    }
}
