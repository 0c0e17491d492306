use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::TranscodeOptions;
use crate::scheduler::CleanupPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Clip production settings
    pub clip: ClipConfig,

    /// Working directory eviction
    pub cleanup: CleanupPolicy,

    /// External tool locations
    pub tools: ToolsConfig,

    /// Optional upstream authentication
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Directory holding transient clip files
    pub work_dir: PathBuf,

    /// Upper bound for each yt-dlp invocation
    pub timeout_secs: u64,

    /// Bitrate for re-encoded audio
    pub audio_bitrate_kbps: u32,

    /// Frame-accurate cuts (re-encode around cut points) instead of keyframe-snapped remuxing
    pub precise_cuts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp binary name or path
    pub yt_dlp: String,

    /// ffmpeg binary name or path
    pub ffmpeg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Environment variable holding a base64-encoded Netscape cookie file
    pub cookies_env: String,

    /// Where the decoded cookie file is written
    pub cookies_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp"),
            timeout_secs: 900,
            audio_bitrate_kbps: 192,
            precise_cuts: true,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookies_env: "KLIPPD_COOKIES_B64".to_string(),
            cookies_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, or use defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("klippd").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }

        if self.clip.timeout_secs == 0 {
            anyhow::bail!("clip.timeout_secs must be greater than zero");
        }

        if self.clip.audio_bitrate_kbps == 0 {
            anyhow::bail!("clip.audio_bitrate_kbps must be greater than zero");
        }

        if self.cleanup.sweep_interval_secs == 0 || self.cleanup.max_age_secs == 0 {
            anyhow::bail!("cleanup.max_age_secs and cleanup.sweep_interval_secs must be greater than zero");
        }

        if self.cleanup.max_age_secs < self.cleanup.sweep_interval_secs {
            tracing::warn!(
                "cleanup.max_age_secs ({}) is shorter than the sweep interval ({}); files will outlive max age",
                self.cleanup.max_age_secs,
                self.cleanup.sweep_interval_secs
            );
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Listen: {}:{}", self.server.host, self.server.port);
        println!("  CORS Origins: {}", self.server.cors_origins.join(", "));
        println!("  Working Directory: {}", self.clip.work_dir.display());
        println!("  Tool Timeout: {}s", self.clip.timeout_secs);
        println!("  Audio Bitrate: {}k", self.clip.audio_bitrate_kbps);
        println!("  Precise Cuts: {}", self.clip.precise_cuts);
        println!(
            "  Cleanup: files older than {}s, every {}s",
            self.cleanup.max_age_secs, self.cleanup.sweep_interval_secs
        );
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        println!("  Cookies Env Var: {}", self.auth.cookies_env);
    }

    /// Bound for each external tool invocation
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.clip.timeout_secs)
    }

    pub fn transcode_options(&self) -> TranscodeOptions {
        TranscodeOptions {
            audio_bitrate_kbps: self.clip.audio_bitrate_kbps,
            precise_cuts: self.clip.precise_cuts,
            ffmpeg: self.tools.ffmpeg.clone(),
        }
    }

    /// Where decoded cookies are written
    pub fn cookies_path(&self) -> PathBuf {
        if let Some(path) = &self.auth.cookies_path {
            return path.clone();
        }

        dirs::cache_dir()
            .map(|dir| dir.join("klippd").join("cookies.txt"))
            .unwrap_or_else(|| std::env::temp_dir().join("klippd-cookies.txt"))
    }
}
