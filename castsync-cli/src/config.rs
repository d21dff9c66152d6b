use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use tracing::debug;
use url::Url;
use vimeo_engine::{ClientOptions, VimeoConfig, create_client};

use crate::cli::Settings;
use crate::error::{AppError, Result};

/// Where episode files come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadSource {
    /// The platform's own download link.
    Direct,
    /// The embedded player's segmented manifest.
    Vimeo,
}

impl DownloadSource {
    /// Unset, empty and `laracasts` select the direct link; every other
    /// value selects the manifest pipeline.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("laracasts") => Self::Direct,
            Some(_) => Self::Vimeo,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub local_path: PathBuf,
    pub series_folder: String,
    pub source: DownloadSource,
    pub video_quality: Option<String>,
    pub ffmpeg_path: PathBuf,
    pub base_url: Url,
    pub player_url: String,
    pub session_cookie: Option<String>,
    pub timeout: Duration,
    pub retries: u32,
}

impl AppConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = Url::parse(&settings.laracasts_base_url).map_err(|e| {
            AppError::config(format!(
                "LARACASTS_BASE_URL `{}` is not a valid URL: {e}",
                settings.laracasts_base_url
            ))
        })?;
        Url::parse(&settings.vimeo_player_url).map_err(|e| {
            AppError::config(format!(
                "VIMEO_PLAYER_URL `{}` is not a valid URL: {e}",
                settings.vimeo_player_url
            ))
        })?;
        if settings.series_folder.trim().is_empty() {
            return Err(AppError::config("SERIES_FOLDER must not be empty"));
        }

        Ok(Self {
            local_path: settings.local_path.clone(),
            series_folder: settings.series_folder.clone(),
            source: DownloadSource::from_setting(settings.download_source.as_deref()),
            video_quality: settings
                .video_quality
                .clone()
                .filter(|q| !q.trim().is_empty()),
            ffmpeg_path: settings.ffmpeg_path.clone(),
            base_url,
            player_url: settings.vimeo_player_url.clone(),
            session_cookie: settings
                .session_cookie
                .clone()
                .filter(|c| !c.trim().is_empty()),
            timeout: Duration::from_secs(settings.timeout),
            retries: settings.retries,
        })
    }

    /// `<LOCAL_PATH>/<SERIES_FOLDER>`
    pub fn series_root(&self) -> PathBuf {
        self.local_path.join(&self.series_folder)
    }

    pub fn vimeo_config(&self) -> VimeoConfig {
        VimeoConfig {
            player_base_url: self.player_url.clone(),
            referer: self.base_url.to_string(),
            ffmpeg_path: self.ffmpeg_path.clone(),
            quality: self.video_quality.clone(),
        }
    }

    /// Cookie jar for the run, seeded with the session cookie if one is set.
    pub fn cookie_jar(&self) -> Arc<Jar> {
        let jar = Jar::default();
        if let Some(cookie) = &self.session_cookie {
            let mut added = 0;
            for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                jar.add_cookie_str(pair, &self.base_url);
                added += 1;
            }
            debug!(cookies = added, origin = %self.base_url, "Seeded session cookies");
        }
        Arc::new(jar)
    }

    /// The HTTP client shared by every request of the run.
    pub fn build_client(&self) -> Result<Client> {
        let options = ClientOptions {
            timeout: self.timeout,
            cookie_store: Some(self.cookie_jar()),
            ..ClientOptions::default()
        };
        Ok(create_client(&options)?)
    }
}
