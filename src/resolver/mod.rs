use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

pub mod ytdlp;

pub use self::ytdlp::YtDlpProbe;

use crate::media::MediaKind;
use crate::ytdlp::FetchError;
use crate::ClipError;

/// Longest title (in characters) used in download file names
pub const MAX_TITLE_CHARS: usize = 50;

/// Metadata returned by a probe, before any cleanup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Title as reported by the host
    pub title: Option<String>,

    /// Canonical page URL, when the host reports one
    pub webpage_url: Option<String>,

    /// Duration in seconds if available
    pub duration: Option<f64>,

    /// Name of the site extractor that handled the URL
    pub extractor: Option<String>,
}

/// Handle the fetch step uses to locate the media again
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescriptor {
    pub url: String,
    pub duration: Option<f64>,
}

/// Per-request view of the source media
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMedia {
    /// Filesystem-safe title, never empty, at most [`MAX_TITLE_CHARS`] characters
    pub title: String,

    pub stream: StreamDescriptor,
}

/// Metadata-only lookup of a media URL (no download)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, FetchError>;
}

/// Turns a source URL into a [`ResolvedMedia`]
#[derive(Clone)]
pub struct MediaResolver {
    probe: Arc<dyn MetadataProbe>,
}

impl MediaResolver {
    pub fn new(probe: Arc<dyn MetadataProbe>) -> Self {
        Self { probe }
    }

    /// Probe `url` and derive the title used for the download name of a `kind` clip
    pub async fn resolve(&self, url: &str, kind: MediaKind) -> Result<ResolvedMedia, ClipError> {
        let unresolvable = |source| ClipError::UnresolvableSource {
            url: url.to_string(),
            source,
        };

        validate_url(url).map_err(unresolvable)?;

        tracing::info!(
            domain = crate::utils::extract_domain(url).as_deref().unwrap_or("unknown"),
            "Resolving media metadata"
        );
        let metadata = self.probe.probe(url).await.map_err(unresolvable)?;

        let title = sanitize_title(metadata.title.as_deref().unwrap_or(""), kind.default_title());
        tracing::debug!(
            title = %title,
            extractor = metadata.extractor.as_deref().unwrap_or("unknown"),
            duration = ?metadata.duration,
            "Resolved media"
        );

        Ok(ResolvedMedia {
            title,
            stream: StreamDescriptor {
                url: metadata.webpage_url.unwrap_or_else(|| url.to_string()),
                duration: metadata.duration,
            },
        })
    }
}

/// Make a title safe for use in a file name
///
/// Keeps alphanumerics, spaces, hyphens and underscores, caps the result at
/// [`MAX_TITLE_CHARS`] characters and drops trailing whitespace. Falls back to
/// `fallback` when nothing usable is left.
pub fn sanitize_title(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(MAX_TITLE_CHARS)
        .collect();

    let cleaned = cleaned.trim_end();
    if cleaned.trim_start().is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Validate that a source URL is an absolute http(s) URL
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(FetchError::InvalidUrl(url.to_string()));
    }

    Ok(parsed)
}
