//! On-disk library layout.
//!
//! ```text
//! <root>/<Series Title> (<year>)/Season 01/<Series Title> (<year>) - s01e02 - <Episode Title>.mp4
//! ```
//!
//! Titles are sanitized so the same catalog produces the same paths on
//! every platform.

use std::path::{Path, PathBuf};

use crate::catalog::{Episode, Series};

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Make a title usable as a single path component on every platform.
///
/// Control characters and characters Windows rejects become `_` (runs
/// collapse to one), leading and trailing spaces and dots are trimmed,
/// reserved device names get a `_` prefix and an empty result becomes
/// `unnamed`.
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or(&upper);
    if WINDOWS_RESERVED_NAMES.contains(&stem) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

/// `<Series Title> (<year>)`, used for both the series folder and the
/// episode file prefix.
pub fn series_label(series: &Series) -> String {
    format!("{} ({})", sanitize_filename(&series.title), series.year)
}

/// Where an episode lives in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodePaths {
    /// Season directory; track files are staged here too.
    pub season_dir: PathBuf,
    /// Final `.mp4` file.
    pub output: PathBuf,
}

impl EpisodePaths {
    pub fn new(series_root: &Path, series: &Series, episode: &Episode) -> Self {
        let label = series_label(series);
        let season = episode.season();
        let season_dir = series_root
            .join(&label)
            .join(format!("Season {season:02}"));
        let file_name = format!(
            "{label} - s{season:02}e{number:02} - {title}.mp4",
            number = episode.number,
            title = sanitize_filename(&episode.title),
        );

        Self {
            output: season_dir.join(file_name),
            season_dir,
        }
    }
}
