//! Catalog document written by the crawler.
//!
//! The crawler itself lives outside this program; it leaves a JSON list of
//! series, each with its episodes, and that list drives `castsync sync`.

use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Series {
    pub slug: String,
    pub title: String,
    pub year: u16,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Episode {
    pub number: u32,
    pub title: String,
    #[serde(default, deserialize_with = "optional_numeric_id")]
    pub vimeo_id: Option<u64>,
    #[serde(default)]
    pub download_link: Option<String>,
    #[serde(default)]
    pub chapter: Option<Chapter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub number: Option<u32>,
}

impl Episode {
    /// Chapter number, falling back to the first season.
    pub fn season(&self) -> u32 {
        self.chapter.and_then(|c| c.number).unwrap_or(1)
    }
}

/// Ids show up both as JSON numbers and as numeric strings.
fn optional_numeric_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid video id `{s}`"))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    pub series: Vec<Series>,
}

impl Catalog {
    pub fn from_json(raw: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(raw).map_err(|source| AppError::Catalog {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::io("reading catalog", path, e))?;
        Self::from_json(&raw, path)
    }

    /// Keep only the named series and episode numbers. Empty filters keep
    /// everything; series left without episodes are dropped.
    pub fn filtered(self, series: &[String], episodes: &[u32]) -> Self {
        let series = self
            .series
            .into_iter()
            .filter(|s| series.is_empty() || series.contains(&s.slug))
            .filter_map(|mut s| {
                if !episodes.is_empty() {
                    s.episodes.retain(|e| episodes.contains(&e.number));
                }
                (!s.episodes.is_empty()).then_some(s)
            })
            .collect();
        Self { series }
    }

    pub fn episode_count(&self) -> usize {
        self.series.iter().map(|s| s.episodes.len()).sum()
    }
}
