//! Klippd - trims public videos to a time range and serves the result
//!
//! This library provides the clip extraction pipeline behind the `klippd` HTTP
//! service: timestamp parsing, media metadata resolution through yt-dlp,
//! time-range trimming through yt-dlp + ffmpeg, and a working directory of
//! short-lived artifacts that is swept on a timer.

use std::time::Duration;

pub mod auth;
pub mod cli;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod timerange;
pub mod utils;
pub mod ytdlp;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use media::MediaKind;
pub use pipeline::{Artifact, ClipPipeline, ClipRequest};
pub use resolver::{MediaResolver, ResolvedMedia};
pub use scheduler::CleanupScheduler;
pub use store::ArtifactStore;
pub use timerange::TimeRange;

/// Result type used for application wiring (config, startup, CLI)
pub type Result<T> = anyhow::Result<T>;

/// Failure kinds surfaced by the clip pipeline
#[derive(thiserror::Error, Debug)]
pub enum ClipError {
    #[error("Malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("Invalid range: end ({end}) must be after start ({start})")]
    InvalidRange { start: String, end: String },

    #[error("Could not resolve media from {url}: {source}")]
    UnresolvableSource {
        url: String,
        #[source]
        source: ytdlp::FetchError,
    },

    #[error("Upstream rejected authentication: {0}")]
    UpstreamAuthFailure(String),

    #[error("Upstream did not finish within {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    #[error("Transcoder reported success but produced no output")]
    OutputMissing,

    #[error("Transcode failed: {0}")]
    TranscodeFailure(String),

    #[error("Working directory error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClipError {
    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClipError::MalformedTimestamp(_) => "malformed_timestamp",
            ClipError::InvalidRange { .. } => "invalid_range",
            ClipError::UnresolvableSource { .. } => "unresolvable_source",
            ClipError::UpstreamAuthFailure(_) => "upstream_auth_failure",
            ClipError::UpstreamTimeout(_) => "upstream_timeout",
            ClipError::OutputMissing => "output_missing",
            ClipError::TranscodeFailure(_) => "transcode_failure",
            ClipError::Storage(_) => "storage",
        }
    }

    /// Whether the failure was caused by the caller's input rather than upstream
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClipError::MalformedTimestamp(_)
                | ClipError::InvalidRange { .. }
                | ClipError::UnresolvableSource {
                    source: ytdlp::FetchError::InvalidUrl(_),
                    ..
                }
        )
    }
}
