use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|host| {
        host.strip_prefix("www.").unwrap_or(host).to_string()
    })
}

/// Check whether the external tools the service shells out to are installed
pub fn check_dependencies(yt_dlp: &str, ffmpeg: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if which::which(yt_dlp).is_err() {
        missing.push(format!("{} - required to resolve and download media", yt_dlp));
    }

    if which::which(ffmpeg).is_err() {
        missing.push(format!("{} - required to trim and transcode clips", ffmpeg));
    }

    missing
}

/// How long a `--version` style query may take before the tool counts as unavailable
pub const TOOL_VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// First line of `<command> <version_flag>` output, or `None` if the command fails
pub async fn tool_version(command: &str, version_flag: &str) -> Option<String> {
    tool_version_within(command, version_flag, TOOL_VERSION_TIMEOUT).await
}

/// [`tool_version`] with an explicit bound; a hung tool is killed and reported as missing
pub async fn tool_version_within(command: &str, version_flag: &str, limit: Duration) -> Option<String> {
    let query = Command::new(command)
        .arg(version_flag)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(limit, query).await {
        Ok(result) => result.ok()?,
        Err(_) => {
            tracing::warn!("{} {} did not answer within {:?}", command, version_flag, limit);
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}
