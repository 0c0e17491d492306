//! Optional session cookies handed to yt-dlp.
//!
//! Deployments that need them supply a base64-encoded Netscape cookie file in
//! an environment variable. It is decoded once at startup and written to a
//! local file that every yt-dlp invocation can point `--cookies` at.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A real Netscape cookies file is at least ~50 bytes.
const MIN_COOKIES_FILE_SIZE: usize = 50;

/// Cookie material available to the fetch step
#[derive(Debug, Clone)]
pub struct CookieCredentials {
    path: PathBuf,
}

/// Credential part of the `/status` report
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub configured: bool,
    pub valid: bool,
}

impl CookieCredentials {
    /// Wrap an existing cookie file
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Decode the blob in `env_var` (if set) and write it to `dest`
    ///
    /// Returns `Ok(None)` when the variable is unset or empty.
    pub fn load_from_env(env_var: &str, dest: &Path) -> Result<Option<Self>> {
        let blob = match std::env::var(env_var) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => {
                tracing::debug!("{} not set, running without cookies", env_var);
                return Ok(None);
            }
        };

        Self::from_base64(&blob, dest)
            .with_context(|| format!("Failed to load cookies from {}", env_var))
            .map(Some)
    }

    /// Decode a base64 cookie blob into `dest`
    pub fn from_base64(blob: &str, dest: &Path) -> Result<Self> {
        let cleaned: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = STANDARD
            .decode(cleaned.as_bytes())
            .context("Cookie blob is not valid base64")?;

        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        write_private(dest, &decoded)
            .with_context(|| format!("Failed to write cookies file {}", dest.display()))?;

        let credentials = Self::from_file(dest);
        if credentials.is_valid() {
            tracing::info!("Loaded cookies for upstream authentication");
        } else {
            tracing::warn!(
                path = %dest.display(),
                "Decoded cookies do not look like a Netscape cookie file"
            );
        }
        Ok(credentials)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file exists and looks like a usable Netscape cookie jar
    pub fn is_valid(&self) -> bool {
        std::fs::read_to_string(&self.path)
            .map(|content| is_usable_cookie_file(&content))
            .unwrap_or(false)
    }

    /// Non-blocking form of [`is_valid`](Self::is_valid) for request handlers
    pub async fn check_valid(&self) -> bool {
        tokio::fs::read_to_string(&self.path)
            .await
            .map(|content| is_usable_cookie_file(&content))
            .unwrap_or(false)
    }

    pub async fn status(credentials: Option<&Self>) -> CredentialStatus {
        let valid = match credentials {
            Some(c) => c.check_valid().await,
            None => false,
        };
        CredentialStatus {
            configured: credentials.is_some(),
            valid,
        }
    }
}

fn is_usable_cookie_file(content: &str) -> bool {
    content.len() >= MIN_COOKIES_FILE_SIZE && is_valid_netscape_cookies(content)
}

/// Write `contents` readable by the owner only, tightening an existing file too
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)
}

/// Validate that cookie text appears to be in Netscape format.
///
/// Netscape cookie files either start with a "# Netscape HTTP Cookie File"
/// header or contain tab-separated lines with at least seven fields.
pub fn is_valid_netscape_cookies(content: &str) -> bool {
    if content.starts_with("# Netscape HTTP Cookie File") || content.starts_with("# HTTP Cookie File") {
        return true;
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| line.split('\t').count() >= 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COOKIES: &str = "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tPREF\tf6=40000000\n";

    #[test]
    fn test_netscape_detection() {
        assert!(is_valid_netscape_cookies(COOKIES));
        assert!(is_valid_netscape_cookies(
            ".example.com\tTRUE\t/\tFALSE\t0\tname\tvalue"
        ));
        assert!(!is_valid_netscape_cookies("{\"cookies\": []}"));
        assert!(!is_valid_netscape_cookies(""));
    }

    #[tokio::test]
    async fn test_from_base64_writes_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("nested").join("cookies.txt");
        let blob = STANDARD.encode(COOKIES);

        let credentials = CookieCredentials::from_base64(&blob, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), COOKIES);
        assert!(credentials.is_valid());

        assert!(credentials.check_valid().await);
        let status = CookieCredentials::status(Some(&credentials)).await;
        assert!(status.configured && status.valid);
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        assert!(CookieCredentials::from_base64("not base64!!", &tmp.path().join("c.txt")).is_err());
    }

    #[test]
    fn test_decoded_but_invalid_content() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("c.txt");
        let credentials = CookieCredentials::from_base64(&STANDARD.encode("hello"), &dest).unwrap();
        assert!(!credentials.is_valid());
    }

    #[tokio::test]
    async fn test_status_without_credentials() {
        let status = CookieCredentials::status(None).await;
        assert!(!status.configured);
        assert!(!status.valid);
    }

    #[cfg(unix)]
    #[test]
    fn test_cookie_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("cookies.txt");
        std::fs::write(&dest, "stale").unwrap();
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o644)).unwrap();

        CookieCredentials::from_base64(&STANDARD.encode(COOKIES), &dest).unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), COOKIES);
    }
}
