//! The external fetch + trim step.
//!
//! yt-dlp downloads only the requested section (`--download-sections`) and
//! hands the pieces to ffmpeg for merging and audio encoding, so the cut is
//! made at the transcode boundary rather than by slicing bytes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::media::MediaKind;
use crate::timerange::TimeRange;
use crate::ytdlp::{FetchError, YtDlp};

/// Postprocessors whose ffmpeg output args set the audio codec of a video clip
const VIDEO_AUDIO_PROCESSORS: &[&str] = &["Merger", "VideoConvertor"];

/// Everything the fetch step needs to write one clip
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub range: TimeRange,
    pub kind: MediaKind,

    /// Final artifact path; the tool must leave its result exactly here
    pub output: PathBuf,

    /// Cookie file to authenticate with, if any
    pub cookies: Option<PathBuf>,
}

/// Downloads and trims a section of a media URL into a file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), FetchError>;
}

/// Encoding knobs for [`YtDlpFetcher`]
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// Bitrate for the re-encoded audio track, in kbit/s
    pub audio_bitrate_kbps: u32,

    /// Re-encode around the cut points for frame-accurate boundaries
    pub precise_cuts: bool,

    /// ffmpeg binary or directory handed to yt-dlp
    pub ffmpeg: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            audio_bitrate_kbps: 192,
            precise_cuts: true,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// [`ClipFetcher`] that drives yt-dlp with ffmpeg post-processing
pub struct YtDlpFetcher {
    yt_dlp: YtDlp,
    options: TranscodeOptions,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp: YtDlp, options: TranscodeOptions) -> Self {
        Self { yt_dlp, options }
    }

    /// Build the yt-dlp command line for `request`
    pub fn args(&self, request: &FetchRequest) -> Vec<String> {
        fn push(args: &mut Vec<String>, items: &[&str]) {
            args.extend(items.iter().map(|s| s.to_string()));
        }
        let mut args: Vec<String> = Vec::new();

        let section = format!(
            "*{}-{}",
            request.range.start.as_secs(),
            request.range.end().as_secs()
        );
        let bitrate = format!("{}k", self.options.audio_bitrate_kbps);

        push(&mut args, &["--no-playlist", "--no-progress", "--newline"]);
        push(&mut args, &["--download-sections", section.as_str()]);

        match request.kind {
            MediaKind::Video => {
                push(&mut args, &["--format", "bestvideo+bestaudio/best"]);
                push(&mut args, &["--merge-output-format", "mp4", "--recode-video", "mp4"]);
                if self.options.precise_cuts {
                    push(&mut args, &["--force-keyframes-at-cuts"]);
                }
                // Merger only runs for split formats; the convertor covers the single-file fallback
                for processor in VIDEO_AUDIO_PROCESSORS {
                    let pp_args = format!("{}+ffmpeg_o:-c:v copy -c:a aac -b:a {}", processor, bitrate);
                    push(&mut args, &["--postprocessor-args", pp_args.as_str()]);
                }
            }
            MediaKind::Audio => {
                push(&mut args, &["--format", "bestaudio/best", "--extract-audio"]);
                let quality = bitrate.to_uppercase();
                push(&mut args, &["--audio-format", "mp3", "--audio-quality", quality.as_str()]);
            }
        }

        // Bare command names are resolved from PATH by yt-dlp itself
        if self.options.ffmpeg.contains(std::path::MAIN_SEPARATOR) {
            push(&mut args, &["--ffmpeg-location", self.options.ffmpeg.as_str()]);
        }

        if let Some(cookies) = &request.cookies {
            let cookies = cookies.to_string_lossy();
            push(&mut args, &["--cookies", &*cookies]);
        }

        let template = output_template(&request.output);
        push(&mut args, &["--output", template.as_str(), "--", request.url.as_str()]);
        args
    }
}

#[async_trait]
impl ClipFetcher for YtDlpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<(), FetchError> {
        tracing::info!(
            kind = %request.kind,
            range = %request.range,
            with_cookies = request.cookies.is_some(),
            "Downloading clip section"
        );

        self.yt_dlp.run(self.args(request)).await?;
        Ok(())
    }
}

/// yt-dlp output template that lands on `output` once the final extension is applied
fn output_template(output: &Path) -> String {
    output.with_extension("%(ext)s").to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timerange;
    use std::time::Duration;

    fn request(kind: MediaKind, cookies: Option<&str>) -> FetchRequest {
        FetchRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            range: timerange::to_duration("00:01:00", "00:01:30").unwrap(),
            kind,
            output: PathBuf::from("/work/0123_clip.mp4"),
            cookies: cookies.map(PathBuf::from),
        }
    }

    fn fetcher(options: TranscodeOptions) -> YtDlpFetcher {
        YtDlpFetcher::new(YtDlp::new("yt-dlp", Duration::from_secs(60)), options)
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_video_args() {
        let args = fetcher(TranscodeOptions::default()).args(&request(MediaKind::Video, None));

        assert!(has_pair(&args, "--download-sections", "*60-90"));
        assert!(has_pair(&args, "--format", "bestvideo+bestaudio/best"));
        assert!(has_pair(&args, "--merge-output-format", "mp4"));
        assert!(has_pair(&args, "--recode-video", "mp4"));
        assert!(has_pair(&args, "--postprocessor-args", "Merger+ffmpeg_o:-c:v copy -c:a aac -b:a 192k"));
        assert!(has_pair(
            &args,
            "--postprocessor-args",
            "VideoConvertor+ffmpeg_o:-c:v copy -c:a aac -b:a 192k"
        ));
        assert!(has_pair(&args, "--output", "/work/0123_clip.%(ext)s"));
        assert!(args.contains(&"--force-keyframes-at-cuts".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_audio_args() {
        let options = TranscodeOptions {
            audio_bitrate_kbps: 128,
            precise_cuts: true,
            ffmpeg: "/opt/ffmpeg/bin/ffmpeg".to_string(),
        };
        let mut req = request(MediaKind::Audio, Some("/tmp/cookies.txt"));
        req.output = PathBuf::from("/work/0123_voice.mp3");
        let args = fetcher(options).args(&req);

        assert!(has_pair(&args, "--format", "bestaudio/best"));
        assert!(has_pair(&args, "--audio-format", "mp3"));
        assert!(has_pair(&args, "--audio-quality", "128K"));
        assert!(has_pair(&args, "--cookies", "/tmp/cookies.txt"));
        assert!(has_pair(&args, "--ffmpeg-location", "/opt/ffmpeg/bin/ffmpeg"));
        assert!(has_pair(&args, "--output", "/work/0123_voice.%(ext)s"));
        assert!(!args.contains(&"--force-keyframes-at-cuts".to_string()));
    }

    #[test]
    fn test_imprecise_cuts_skip_keyframe_forcing() {
        let options = TranscodeOptions {
            precise_cuts: false,
            ..TranscodeOptions::default()
        };
        let args = fetcher(options).args(&request(MediaKind::Video, None));
        assert!(!args.contains(&"--force-keyframes-at-cuts".to_string()));
    }
}
