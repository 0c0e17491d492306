use async_trait::async_trait;
use serde_json::Value;

use super::{MediaMetadata, MetadataProbe};
use crate::auth::CookieCredentials;
use crate::ytdlp::{FetchError, YtDlp};

/// Metadata probe backed by `yt-dlp --dump-json`
pub struct YtDlpProbe {
    yt_dlp: YtDlp,
    cookies: Option<CookieCredentials>,
}

impl YtDlpProbe {
    pub fn new(yt_dlp: YtDlp) -> Self {
        Self {
            yt_dlp,
            cookies: None,
        }
    }

    /// Send cookies with the probe as well as with the download
    pub fn with_cookies(mut self, cookies: Option<CookieCredentials>) -> Self {
        self.cookies = cookies;
        self
    }

    fn args(&self, url: &str, with_cookies: bool) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        if let Some(cookies) = self.cookies.as_ref().filter(|_| with_cookies) {
            args.push("--cookies".to_string());
            args.push(cookies.path().to_string_lossy().into_owned());
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    async fn dump_json(&self, url: &str, with_cookies: bool) -> Result<Value, FetchError> {
        let output = self.yt_dlp.run(self.args(url, with_cookies)).await?;
        parse_dump(self.yt_dlp.binary(), &output.stdout)
    }
}

#[async_trait]
impl MetadataProbe for YtDlpProbe {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        tracing::debug!("Extracting video info for: {}", url);

        let info = match self.dump_json(url, true).await {
            Err(FetchError::AuthRejected { message, .. }) if self.cookies.is_some() => {
                tracing::warn!("Probe rejected cookies ({}), retrying without them", message);
                self.dump_json(url, false).await?
            }
            result => result?,
        };

        Ok(metadata_from_json(&info))
    }
}

fn parse_dump(tool: &str, stdout: &[u8]) -> Result<Value, FetchError> {
    // Only the first document matters; playlists are disabled
    let text = String::from_utf8_lossy(stdout);
    let first = text.lines().find(|l| !l.trim().is_empty()).ok_or_else(|| FetchError::InvalidOutput {
        tool: tool.to_string(),
        message: "no metadata returned".to_string(),
    })?;

    serde_json::from_str(first).map_err(|e| FetchError::InvalidOutput {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Pick the fields the pipeline cares about out of a yt-dlp info document
pub fn metadata_from_json(info: &Value) -> MediaMetadata {
    let text = |key: &str| {
        info[key]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    MediaMetadata {
        title: text("title"),
        webpage_url: text("webpage_url"),
        duration: info["duration"].as_f64(),
        extractor: text("extractor_key").or_else(|| text("extractor")),
    }
}
