//! Master manifest model and fetcher.
//!
//! The master manifest is a JSON document describing a fragmented MP4
//! presentation: a clip id, a base URL relative to the manifest itself, and
//! one list of encoding variants per track. Each variant carries its init
//! segment inline (base64) and an ordered list of media segments.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, VimeoError};
use crate::player::ManifestHandle;

/// Which track of the presentation a variant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    /// Extension of the intermediate track file.
    pub fn extension(self) -> &'static str {
        match self {
            TrackKind::Video => ".m4v",
            TrackKind::Audio => ".m4a",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media segment of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Segment {
    /// Relative to the variant's base URL.
    pub url: String,
    /// Declared size in bytes.
    pub size: u64,
}

/// One encoding of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub id: String,
    pub kind: TrackKind,
    pub bitrate: Option<u64>,
    pub height: Option<u32>,
    pub base_url: String,
    /// Base64 encoded init segment.
    pub init_segment: String,
    pub segments: Vec<Segment>,
}

impl Variant {
    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }

    pub fn decode_init_segment(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.init_segment.as_bytes())
    }

    /// Sum of the declared segment sizes.
    pub fn total_size(&self) -> u64 {
        self.segments.iter().map(|s| s.size).sum()
    }
}

#[derive(Deserialize)]
struct RawVariant {
    id: String,
    #[serde(default)]
    bitrate: Option<u64>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    base_url: Option<String>,
    init_segment: Option<String>,
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct RawMaster {
    base_url: String,
    clip_id: String,
    video: Vec<RawVariant>,
    audio: Vec<RawVariant>,
}

/// A parsed master manifest. Both variant lists are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterManifest {
    pub master_url: Url,
    pub base_url: String,
    pub clip_id: String,
    pub video: Vec<Variant>,
    pub audio: Vec<Variant>,
}

impl MasterManifest {
    /// Parse and validate a master manifest body.
    pub fn parse(body: &str, master_url: Url) -> Result<Self> {
        let raw: RawMaster = serde_json::from_str(body).map_err(|e| {
            VimeoError::upstream_parse(master_url.as_str(), format!("malformed manifest: {e}"))
        })?;

        let video = convert_variants(raw.video, TrackKind::Video, &master_url)?;
        let audio = convert_variants(raw.audio, TrackKind::Audio, &master_url)?;

        Ok(Self {
            master_url,
            base_url: raw.base_url,
            clip_id: raw.clip_id,
            video,
            audio,
        })
    }

    /// Resolve a variant into the absolute URL its segments hang off and
    /// the name of its local track file.
    pub fn resolve_source<'a>(&self, variant: &'a Variant) -> Result<ResolvedSource<'a>> {
        let relative = format!("{}{}", self.base_url, variant.base_url);
        let base_url = self
            .master_url
            .join(&relative)
            .map_err(|e| VimeoError::invalid_url(relative, e))?;

        Ok(ResolvedSource {
            variant,
            base_url,
            local_filename: format!("{}{}", self.clip_id, variant.extension()),
        })
    }
}

fn convert_variants(
    raw: Vec<RawVariant>,
    kind: TrackKind,
    master_url: &Url,
) -> Result<Vec<Variant>> {
    if raw.is_empty() {
        return Err(VimeoError::upstream_parse(
            master_url.as_str(),
            format!("no {kind} variants"),
        ));
    }

    raw.into_iter()
        .map(|v| {
            let init_segment = v.init_segment.ok_or_else(|| {
                VimeoError::upstream_parse(
                    master_url.as_str(),
                    format!("{kind} variant {} has no init segment", v.id),
                )
            })?;

            if let Some(segment) = v.segments.iter().find(|s| s.size == 0) {
                return Err(VimeoError::upstream_parse(
                    master_url.as_str(),
                    format!(
                        "{kind} variant {} declares an empty segment {}",
                        v.id, segment.url
                    ),
                ));
            }

            Ok(Variant {
                id: v.id,
                kind,
                bitrate: v.bitrate,
                height: v.height,
                base_url: v.base_url.unwrap_or_default(),
                init_segment,
                segments: v.segments,
            })
        })
        .collect()
}

/// A chosen variant together with everything needed to download it.
#[derive(Debug, Clone)]
pub struct ResolvedSource<'a> {
    pub variant: &'a Variant,
    /// Absolute URL every segment URL is resolved against.
    pub base_url: Url,
    /// `<clip id><extension>`, shared by the audio and video track files.
    pub local_filename: String,
}

impl ResolvedSource<'_> {
    /// Absolute segment URLs in manifest order.
    pub fn segment_urls(&self) -> Result<Vec<Url>> {
        self.variant
            .segments
            .iter()
            .map(|segment| {
                self.base_url
                    .join(&segment.url)
                    .map_err(|e| VimeoError::invalid_url(&segment.url, e))
            })
            .collect()
    }
}

/// Downloads and parses the master manifest named by a [`ManifestHandle`].
pub struct MasterManifestFetcher<'a> {
    client: &'a Client,
}

impl<'a> MasterManifestFetcher<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    #[instrument(skip(self, handle), fields(master_url = %handle.master_url), level = "debug")]
    pub async fn fetch(&self, handle: ManifestHandle) -> Result<MasterManifest> {
        let master_url = handle.master_url;
        let response = self.client.get(master_url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(VimeoError::http_status(
                response.status(),
                master_url.as_str(),
                "master manifest fetch",
            ));
        }

        let body = response.text().await?;
        let manifest = MasterManifest::parse(&body, master_url)?;

        debug!(
            clip_id = %manifest.clip_id,
            video_variants = manifest.video.len(),
            audio_variants = manifest.audio.len(),
            "Parsed master manifest"
        );

        Ok(manifest)
    }
}
