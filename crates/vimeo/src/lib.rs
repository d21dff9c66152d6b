//! # vimeo-engine
//!
//! Rebuilds a single MP4 from a Vimeo-hosted video: the embedded player
//! page points at a JSON master manifest, the manifest lists fragmented
//! audio and video variants, the chosen variants are fetched segment by
//! segment into two track files, and ffmpeg stream-copies them into the
//! final container.
//!
//! [`VimeoDownloader`] sequences the whole pipeline; the individual stages
//! are public for callers that need only part of it.

pub mod config;
pub mod downloader;
pub mod error;
pub mod master;
pub mod player;
pub mod remux;
pub mod segment;
pub mod selector;

pub use config::{ClientOptions, VimeoConfig, create_client};
pub use downloader::{VideoReference, VimeoDownloader};
pub use error::{Result, VimeoError};
pub use master::{MasterManifest, MasterManifestFetcher, ResolvedSource, Segment, TrackKind, Variant};
pub use player::{ManifestHandle, ManifestResolver, StreamDescriptor};
pub use remux::Remuxer;
pub use segment::{DownloadProgress, NoopProgress, ProgressReporter, SegmentDownloader};
pub use selector::{resolve_quality_id, select_audio, select_video};
