//! Variant selection.
//!
//! Pure functions over a parsed [`MasterManifest`]. Ties between equally
//! good variants go to the one listed last in the manifest, which is what
//! `Iterator::max_by_key` returns.

use crate::master::{MasterManifest, Variant};
use crate::player::StreamDescriptor;

/// Pick the video variant to download.
///
/// A variant whose id equals `preferred_id` wins outright. Otherwise the
/// tallest variant is returned; variants without a height rank lowest.
/// `None` only for a manifest without video variants, which
/// [`MasterManifest::parse`] never produces.
pub fn select_video<'a>(
    manifest: &'a MasterManifest,
    preferred_id: Option<&str>,
) -> Option<&'a Variant> {
    if let Some(preferred) = preferred_id
        && let Some(variant) = manifest.video.iter().find(|v| v.id == preferred)
    {
        return Some(variant);
    }

    manifest.video.iter().max_by_key(|v| v.height.unwrap_or(0))
}

/// Pick the audio variant with the highest bitrate.
pub fn select_audio(manifest: &MasterManifest) -> Option<&Variant> {
    manifest.audio.iter().max_by_key(|v| v.bitrate.unwrap_or(0))
}

/// Map a quality label like `720p` to the variant id the player uses for it.
///
/// The first descriptor in document order with a matching label decides.
pub fn resolve_quality_id(streams: &[StreamDescriptor], wanted: &str) -> Option<String> {
    streams
        .iter()
        .find(|s| s.quality == wanted)
        .map(|s| s.variant_id().to_owned())
}
