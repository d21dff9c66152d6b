//! Per-episode sequencing and the batch loop.

use reqwest::Client;
use tracing::{debug, error, info, instrument};
use vimeo_engine::{VideoReference, VimeoDownloader};

use crate::catalog::{Catalog, Episode, Series};
use crate::config::{AppConfig, DownloadSource};
use crate::direct::DirectDownloader;
use crate::error::{AppError, Result};
use crate::library::EpisodePaths;
use crate::progress::TrackBars;

/// What happened to one episode that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Downloaded,
    AlreadyPresent,
}

/// Counters of a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.downloaded + self.already_present + self.failed
    }
}

pub struct Orchestrator {
    config: AppConfig,
    client: Client,
    vimeo: VimeoDownloader,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(config: AppConfig, client: Client, show_progress: bool) -> Self {
        let vimeo = VimeoDownloader::new(client.clone(), config.vimeo_config());
        Self {
            config,
            client,
            vimeo,
            show_progress,
        }
    }

    /// Refuse to start a manifest-pipeline run that could never merge.
    pub fn preflight(&self) -> Result<()> {
        if self.config.source == DownloadSource::Vimeo && !self.vimeo.remuxer().is_available() {
            return Err(AppError::config(format!(
                "ffmpeg not found at `{}`, set FFMPEG_PATH",
                self.vimeo.remuxer().program().display()
            )));
        }
        Ok(())
    }

    /// Download one episode unless it is already in the library.
    ///
    /// Every failure is logged and reported as `false` so a batch can carry
    /// on with the next episode.
    pub async fn download_episode(&self, series: &Series, episode: &Episode) -> bool {
        match self.fetch_episode(series, episode).await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    series = %series.slug,
                    episode = episode.number,
                    error = %e,
                    "Episode download failed"
                );
                false
            }
        }
    }

    #[instrument(skip(self, series, episode), fields(series = %series.slug, episode = episode.number))]
    pub async fn fetch_episode(&self, series: &Series, episode: &Episode) -> Result<EpisodeOutcome> {
        let paths = EpisodePaths::new(&self.config.series_root(), series, episode);

        let exists = tokio::fs::try_exists(&paths.output)
            .await
            .map_err(|e| AppError::io("checking", &paths.output, e))?;
        if exists {
            debug!(output = %paths.output.display(), "Already in library");
            return Ok(EpisodeOutcome::AlreadyPresent);
        }

        tokio::fs::create_dir_all(&paths.season_dir)
            .await
            .map_err(|e| AppError::io("creating directory", &paths.season_dir, e))?;

        info!("Download started: {:02} - {}", episode.number, episode.title);

        match self.config.source {
            DownloadSource::Direct => {
                let link = episode
                    .download_link
                    .as_deref()
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| AppError::episode(label(series, episode), "no download link"))?;

                DirectDownloader::new(
                    &self.client,
                    &self.config.base_url,
                    self.config.retries,
                    self.show_progress,
                )
                .download(link, &paths.output)
                .await?;
            }
            DownloadSource::Vimeo => {
                let id = episode
                    .vimeo_id
                    .ok_or_else(|| AppError::episode(label(series, episode), "no video id"))?;

                let bars = TrackBars::new(self.show_progress);
                let merged = self
                    .vimeo
                    .download(&VideoReference::new(id), &paths.output, &bars)
                    .await?;
                if !merged {
                    return Err(AppError::episode(
                        label(series, episode),
                        "ffmpeg could not merge the downloaded tracks",
                    ));
                }
            }
        }

        info!(output = %paths.output.display(), "Episode saved");
        Ok(EpisodeOutcome::Downloaded)
    }

    /// Download every episode of `catalog` in order.
    pub async fn run_batch(&self, catalog: &Catalog) -> BatchSummary {
        let total = catalog.episode_count();
        let mut summary = BatchSummary::default();

        for series in &catalog.series {
            info!(series = %series.slug, episodes = series.episodes.len(), "Syncing {}", series.title);

            for episode in &series.episodes {
                match self.fetch_episode(series, episode).await {
                    Ok(EpisodeOutcome::Downloaded) => summary.downloaded += 1,
                    Ok(EpisodeOutcome::AlreadyPresent) => summary.already_present += 1,
                    Err(e) => {
                        error!(
                            series = %series.slug,
                            episode = episode.number,
                            error = %e,
                            "Episode download failed"
                        );
                        summary.failed += 1;
                    }
                }

                let done = summary.total();
                debug!("Current: {done} of {total} total. Left: {}", total - done);
            }
        }

        info!(
            "Finished! Downloaded {} new episodes. Failed: {}",
            summary.downloaded, summary.failed
        );
        if summary.already_present > 0 {
            info!(skipped = summary.already_present, "Episodes already in library");
        }

        summary
    }
}

fn label(series: &Series, episode: &Episode) -> String {
    format!("{} #{:02} ({})", series.slug, episode.number, episode.title)
}
