//! Embedded player page scraping.
//!
//! The player page carries its configuration as inline JSON. Only two
//! fragments of it matter here: the CDN entry pointing at the master
//! manifest, and the list of playable streams with their quality labels.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, header};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::config::VimeoConfig;
use crate::error::{Result, VimeoError};

static CDN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:google_skyfire|akfire_interconnect_quic)":(\{.+?\})"#)
        .expect("CDN regex is valid")
});
static STREAMS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""streams":(\[\{.+?\}\])"#).expect("streams regex is valid"));

/// One playable stream as listed by the player.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamDescriptor {
    pub id: String,
    pub quality: String,
}

impl StreamDescriptor {
    /// The part of `id` before the first `-`, which names a manifest variant.
    pub fn variant_id(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}

/// Where the master manifest lives and which streams the player offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHandle {
    pub master_url: Url,
    pub streams: Vec<StreamDescriptor>,
}

#[derive(Deserialize)]
struct CdnEntry {
    url: String,
}

/// Pull the manifest handle out of a player page body.
///
/// Both the CDN entry and the stream list must be present and decode;
/// otherwise nothing is returned.
pub fn extract_manifest_handle(body: &str, source_url: &str) -> Result<ManifestHandle> {
    let cdn_json = CDN_REGEX
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| VimeoError::upstream_parse(source_url, "CDN manifest entry not found"))?;

    let streams_json = STREAMS_REGEX
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| VimeoError::upstream_parse(source_url, "stream list not found"))?;

    let cdn: CdnEntry = serde_json::from_str(cdn_json).map_err(|e| {
        VimeoError::upstream_parse(source_url, format!("malformed CDN entry: {e}"))
    })?;
    let streams: Vec<StreamDescriptor> = serde_json::from_str(streams_json).map_err(|e| {
        VimeoError::upstream_parse(source_url, format!("malformed stream list: {e}"))
    })?;

    let master_url = Url::parse(&cdn.url).map_err(|e| {
        VimeoError::upstream_parse(
            source_url,
            format!("invalid CDN manifest URL `{}`: {e}", cdn.url),
        )
    })?;

    Ok(ManifestHandle {
        master_url,
        streams,
    })
}

/// Fetches the player page of a video and extracts its [`ManifestHandle`].
pub struct ManifestResolver<'a> {
    client: &'a Client,
    config: &'a VimeoConfig,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(client: &'a Client, config: &'a VimeoConfig) -> Self {
        Self { client, config }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(&self, video_id: u64) -> Result<ManifestHandle> {
        let page_url = self.config.player_url(video_id);

        let response = self
            .client
            .get(&page_url)
            .header(header::REFERER, &self.config.referer)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VimeoError::http_status(
                response.status(),
                page_url,
                "player page fetch",
            ));
        }

        let body = response.text().await?;
        let handle = extract_manifest_handle(&body, &page_url)?;

        debug!(
            master_url = %handle.master_url,
            streams = handle.streams.len(),
            "Resolved player manifest"
        );

        Ok(handle)
    }
}
