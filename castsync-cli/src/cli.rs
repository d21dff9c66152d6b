use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "castsync",
    author,
    version,
    about = "Keep a local library of course videos in sync with the online catalog",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub settings: Settings,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every missing episode listed in a catalog file
    Sync {
        /// Catalog JSON produced by the crawler
        catalog: PathBuf,

        /// Only these series (by slug)
        #[arg(short, long, value_delimiter = ',')]
        series: Vec<String>,

        /// Only these episode numbers
        #[arg(short, long, value_delimiter = ',')]
        episodes: Vec<u32>,
    },

    /// Download a single video through the manifest pipeline
    Video {
        /// Numeric video id
        id: u64,

        /// Output file
        output: PathBuf,

        /// Quality label, overrides VIDEO_QUALITY for this video
        #[arg(long)]
        quality: Option<String>,
    },
}

/// Settings shared by every command. Each one can come from the environment
/// or a `.env` file.
#[derive(ClapArgs, Debug, Clone)]
pub struct Settings {
    /// Root of the local library
    #[arg(long, env = "LOCAL_PATH", global = true, default_value = ".")]
    pub local_path: PathBuf,

    /// Folder under the library root holding the series
    #[arg(long, env = "SERIES_FOLDER", global = true, default_value = "series")]
    pub series_folder: String,

    /// `laracasts` (or unset) for direct downloads, anything else for the
    /// manifest pipeline
    #[arg(long, env = "DOWNLOAD_SOURCE", global = true)]
    pub download_source: Option<String>,

    /// Preferred quality label, e.g. `1080p`
    #[arg(long, env = "VIDEO_QUALITY", global = true)]
    pub video_quality: Option<String>,

    /// ffmpeg executable used to merge tracks
    #[arg(long, env = "FFMPEG_PATH", global = true, default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    #[arg(
        long,
        env = "LARACASTS_BASE_URL",
        global = true,
        default_value = "https://laracasts.com"
    )]
    pub laracasts_base_url: String,

    #[arg(
        long,
        env = "VIMEO_PLAYER_URL",
        global = true,
        default_value = "https://player.vimeo.com"
    )]
    pub vimeo_player_url: String,

    /// Raw cookie header of a logged-in session
    #[arg(long, env = "SESSION_COOKIE", global = true, hide_env_values = true)]
    pub session_cookie: Option<String>,

    /// Request timeout in seconds (0 disables it)
    #[arg(long, env = "REQUEST_TIMEOUT", global = true, default_value_t = 0)]
    pub timeout: u64,

    /// Extra attempts for a failed direct download
    #[arg(long, env = "DOWNLOAD_RETRIES", global = true, default_value_t = 0)]
    pub retries: u32,
}
