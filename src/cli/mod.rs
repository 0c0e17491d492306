use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "klippd",
    about = "Klippd - trim YouTube and other public videos to a time range over HTTP",
    version,
    long_about = "An HTTP service that downloads only the requested section of a public video and returns it as an MP4 clip or an MP3 voice track. Uses yt-dlp and ffmpeg under the hood."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default search path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long, env = "KLIPPD_HOST")]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long, env = "KLIPPD_PORT")]
        port: Option<u16>,

        /// Directory for transient clip files
        #[arg(long, value_name = "DIR", env = "KLIPPD_WORK_DIR")]
        work_dir: Option<PathBuf>,
    },

    /// Run a single cleanup sweep over the working directory and exit
    Cleanup {
        /// Directory for transient clip files
        #[arg(long, value_name = "DIR", env = "KLIPPD_WORK_DIR")]
        work_dir: Option<PathBuf>,

        /// Delete files older than this many seconds
        #[arg(long, value_name = "SECS")]
        max_age_secs: Option<u64>,
    },

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(short, long, conflicts_with = "init")]
        show: bool,

        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}
