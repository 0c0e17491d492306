//! Running yt-dlp as a bounded subprocess.
//!
//! Both the metadata probe and the clip download go through [`YtDlp::run`],
//! which enforces a timeout (the child and its process group are killed when
//! it expires) and turns non-zero exits into a classified [`FetchError`].

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Lower-cased stderr fragments that mean the upstream refused our session
const AUTH_FAILURE_SIGNALS: &[&str] = &[
    "cookies are no longer valid",
    "cookies are invalid",
    "invalid cookie",
    "expired cookie",
    "sign in to confirm",
    "login required",
    "authentication required",
    "http error 401",
    "unauthorized",
];

#[cfg(unix)]
const GROUP_EXIT_POLLS: u32 = 100;
#[cfg(unix)]
const GROUP_EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Failure of an external fetch or transcode invocation
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{tool} rejected the supplied credentials: {message}")]
    AuthRejected { tool: String, message: String },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("Failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from {tool}: {message}")]
    InvalidOutput { tool: String, message: String },
}

/// A yt-dlp binary plus the time budget for each invocation
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run yt-dlp with `args`, returning its output only when it exits successfully
    ///
    /// The child leads its own process group on unix, so a timeout also takes
    /// down the ffmpeg processes it spawned for section downloads and merging.
    pub async fn run<I, S>(&self, args: I) -> Result<Output, FetchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let launch_error = |source| FetchError::Launch {
            tool: self.binary.clone(),
            source,
        };

        let mut child = command.spawn().map_err(launch_error)?;
        let group = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let collect = async {
            let (status, stdout, stderr) =
                tokio::try_join!(child.wait(), read_all(stdout), read_all(stderr))?;
            Ok::<_, std::io::Error>(Output { status, stdout, stderr })
        };

        let result = tokio::time::timeout(self.timeout, collect).await;
        let output = match result {
            Ok(result) => result.map_err(launch_error)?,
            Err(_) => {
                terminate(&mut child, group).await;
                tracing::warn!(tool = %self.binary, timeout_secs = self.timeout.as_secs(), "Subprocess timed out, killed");
                return Err(FetchError::Timeout {
                    tool: self.binary.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("{} stderr: {}", self.binary, stderr);
            return Err(classify_failure(&self.binary, &stderr));
        }

        Ok(output)
    }

    /// Installed yt-dlp version, if the binary runs at all
    pub async fn version(&self) -> Option<String> {
        crate::utils::tool_version(&self.binary, "--version").await
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the child and everything in its process group, then wait for them to go away
async fn terminate(child: &mut Child, group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = group {
        kill_group(pgid);
    }

    if let Err(e) = child.kill().await {
        tracing::debug!("Child already gone: {}", e);
    }

    #[cfg(unix)]
    if let Some(pgid) = group {
        wait_for_group_exit(pgid).await;
    }
    #[cfg(not(unix))]
    let _ = group;
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, "Failed to kill process group: {}", e),
    }
}

/// Poll until no process is left in the group, giving up after a couple of seconds
#[cfg(unix)]
async fn wait_for_group_exit(pgid: u32) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    for _ in 0..GROUP_EXIT_POLLS {
        if killpg(Pid::from_raw(pgid as i32), None::<nix::sys::signal::Signal>).is_err() {
            return;
        }
        tokio::time::sleep(GROUP_EXIT_POLL_INTERVAL).await;
    }
    tracing::warn!(pgid, "Process group still present after kill");
}

/// Whether tool stderr points at rejected or expired authentication material
pub fn is_auth_failure(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    AUTH_FAILURE_SIGNALS.iter().any(|signal| lower.contains(signal))
}

/// The most useful single line of tool stderr, preferring `ERROR:` lines
pub fn error_summary(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "Unknown error".to_string())
}

fn classify_failure(tool: &str, stderr: &str) -> FetchError {
    let message = error_summary(stderr);
    if is_auth_failure(stderr) {
        FetchError::AuthRejected {
            tool: tool.to_string(),
            message,
        }
    } else {
        FetchError::Failed {
            tool: tool.to_string(),
            message,
        }
    }
}
