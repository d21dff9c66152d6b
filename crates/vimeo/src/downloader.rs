use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, info, instrument};

use crate::config::VimeoConfig;
use crate::error::{Result, VimeoError};
use crate::master::MasterManifestFetcher;
use crate::player::ManifestResolver;
use crate::remux::Remuxer;
use crate::segment::{ProgressReporter, SegmentDownloader, discard_cursor};
use crate::selector::{resolve_quality_id, select_audio, select_video};

/// A video on the platform, optionally with the quality label wanted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub id: u64,
    pub quality: Option<String>,
}

impl VideoReference {
    pub fn new(id: u64) -> Self {
        Self { id, quality: None }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }
}

/// Runs the whole manifest pipeline for one video: player page, master
/// manifest, variant selection, both track downloads and the final merge.
pub struct VimeoDownloader {
    client: Client,
    config: VimeoConfig,
    remuxer: Remuxer,
}

impl VimeoDownloader {
    pub fn new(client: Client, config: VimeoConfig) -> Self {
        let remuxer = Remuxer::new(config.ffmpeg_path.clone());
        Self {
            client,
            config,
            remuxer,
        }
    }

    pub fn remuxer(&self) -> &Remuxer {
        &self.remuxer
    }

    /// Download `video` into `output`.
    ///
    /// Returns `true` when `output` exists afterwards, including when it
    /// already existed and nothing was fetched. Returns `false` when the
    /// multiplexer rejected the tracks; the track files and their resume
    /// cursors are then kept next to `output`.
    #[instrument(skip(self, video, progress), fields(video_id = video.id))]
    pub async fn download(
        &self,
        video: &VideoReference,
        output: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<bool> {
        if output.exists() {
            debug!(output = %output.display(), "Output already present");
            return Ok(true);
        }

        let handle = ManifestResolver::new(&self.client, &self.config)
            .resolve(video.id)
            .await?;

        let preferred = video
            .quality
            .as_deref()
            .or(self.config.quality.as_deref())
            .and_then(|quality| resolve_quality_id(&handle.streams, quality));

        let manifest = MasterManifestFetcher::new(&self.client)
            .fetch(handle)
            .await?;

        let video_variant = select_video(&manifest, preferred.as_deref())
            .ok_or(VimeoError::NoVariants { track: "video" })?;
        let audio_variant =
            select_audio(&manifest).ok_or(VimeoError::NoVariants { track: "audio" })?;

        info!(
            clip_id = %manifest.clip_id,
            video_variant = %video_variant.id,
            height = ?video_variant.height,
            audio_variant = %audio_variant.id,
            bitrate = ?audio_variant.bitrate,
            "Selected variants"
        );

        let work_dir = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(PathBuf::new);
        let segments = SegmentDownloader::new(&self.client, progress);

        let video_source = manifest.resolve_source(video_variant)?;
        let video_path = work_dir.join(&video_source.local_filename);
        segments.download_track(&video_source, &video_path).await?;

        let audio_source = manifest.resolve_source(audio_variant)?;
        let audio_path = work_dir.join(&audio_source.local_filename);
        segments.download_track(&audio_source, &audio_path).await?;

        let merged = self.remuxer.merge(&video_path, &audio_path, output).await?;
        if merged {
            discard_cursor(&video_path).await;
            discard_cursor(&audio_path).await;
        }
        Ok(merged)
    }
}
