use serde::{Deserialize, Serialize};

/// What the caller wants back from a clip request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video with audio, delivered as MP4
    Video,
    /// Audio only, delivered as MP3
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Suffix appended to artifact and download names
    pub fn suffix(&self) -> &'static str {
        match self {
            MediaKind::Video => "clip",
            MediaKind::Audio => "voice",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }

    /// Get MIME type for the delivered file
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mpeg",
        }
    }

    /// Title used when the source has none
    pub fn default_title(&self) -> &'static str {
        self.as_str()
    }

    /// Suggested download name, e.g. `My Talk_clip.mp4`
    pub fn download_name(&self, title: &str) -> String {
        format!("{}_{}.{}", title, self.suffix(), self.extension())
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
