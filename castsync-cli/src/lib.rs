//! Castsync keeps a local library of course videos in sync with the
//! platform's catalog, downloading missing episodes either through the
//! platform's own download link or through the embedded player's
//! segmented stream.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod direct;
pub mod error;
pub mod library;
pub mod orchestrator;
pub mod progress;

pub use catalog::{Catalog, Episode, Series};
pub use config::{AppConfig, DownloadSource};
pub use error::{AppError, Result};
pub use orchestrator::{BatchSummary, EpisodeOutcome, Orchestrator};
