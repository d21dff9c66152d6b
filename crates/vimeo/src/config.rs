use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::Result;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

pub const DEFAULT_PLAYER_URL: &str = "https://player.vimeo.com";

pub const DEFAULT_REFERER: &str = "https://laracasts.com/";

/// Settings for the manifest pipeline.
#[derive(Debug, Clone)]
pub struct VimeoConfig {
    /// Origin of the embedded player, e.g. `https://player.vimeo.com`.
    pub player_base_url: String,

    /// Referer sent with the player page request. The player refuses to
    /// embed private videos for any other origin.
    pub referer: String,

    /// Program used to merge the audio and video tracks.
    pub ffmpeg_path: PathBuf,

    /// Quality label wanted from the player's stream list, e.g. `720p`.
    /// `None` always picks the tallest variant.
    pub quality: Option<String>,
}

impl Default for VimeoConfig {
    fn default() -> Self {
        Self {
            player_base_url: DEFAULT_PLAYER_URL.to_owned(),
            referer: DEFAULT_REFERER.to_owned(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            quality: None,
        }
    }
}

impl VimeoConfig {
    /// URL of the embedded player page for one video.
    pub fn player_url(&self, video_id: u64) -> String {
        format!(
            "{}/video/{}",
            self.player_base_url.trim_end_matches('/'),
            video_id
        )
    }
}

/// Options for the shared HTTP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,

    /// Whole-request timeout. Zero leaves the transport default in place.
    pub timeout: Duration,

    pub connect_timeout: Duration,

    /// Keep cookies set by the platform between requests.
    pub cookie_store: Option<std::sync::Arc<reqwest::cookie::Jar>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(30),
            cookie_store: None,
        }
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    headers
}

/// Build the client shared by every request of a run.
pub fn create_client(options: &ClientOptions) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(options.user_agent.clone())
        .default_headers(default_headers())
        .connect_timeout(options.connect_timeout);

    if options.timeout > Duration::ZERO {
        builder = builder.timeout(options.timeout);
    }

    builder = match &options.cookie_store {
        Some(jar) => builder.cookie_provider(jar.clone()),
        None => builder.cookie_store(true),
    };

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_url_tolerates_trailing_slash() {
        let config = VimeoConfig {
            player_base_url: "http://127.0.0.1:8080/".to_string(),
            ..VimeoConfig::default()
        };
        assert_eq!(config.player_url(42), "http://127.0.0.1:8080/video/42");
        assert_eq!(
            VimeoConfig::default().player_url(7),
            "https://player.vimeo.com/video/7"
        );
    }

    #[test]
    fn default_client_builds() {
        assert!(create_client(&ClientOptions::default()).is_ok());
    }
}
