//! Track reconstruction from URL-addressed segments.
//!
//! A track file is the decoded init segment followed by every media segment
//! body in manifest order. After each appended segment a small JSON cursor
//! (`<track>.cursor`) records which variant the file belongs to and how many
//! segments and bytes are on disk, so an interrupted download continues
//! where it stopped instead of starting over. The cursor outlives a finished
//! track and is only discarded together with the track file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use humansize::{BINARY, format_size};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Result, VimeoError};
use crate::master::{ResolvedSource, TrackKind, Variant};

/// Byte progress of one track, measured in declared segment sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

/// Receives progress of the track downloads.
pub trait ProgressReporter: Send + Sync {
    fn track_started(&self, _kind: TrackKind, _progress: DownloadProgress) {}

    fn track_progress(&self, kind: TrackKind, progress: DownloadProgress);

    fn track_finished(&self, _kind: TrackKind, _progress: DownloadProgress) {}
}

/// Reporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn track_progress(&self, _kind: TrackKind, _progress: DownloadProgress) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SegmentCursor {
    variant: String,
    segment_count: usize,
    total_size: u64,
    /// Media segments fully appended.
    segments: usize,
    /// Length of the track file after the last appended segment.
    bytes: u64,
}

impl SegmentCursor {
    fn start(variant: &Variant, init_len: u64) -> Self {
        Self {
            variant: variant.id.clone(),
            segment_count: variant.segments.len(),
            total_size: variant.total_size(),
            segments: 0,
            bytes: init_len,
        }
    }

    /// Whether this cursor was written for `variant` and still fits a file
    /// of `file_len` bytes.
    fn resumes(&self, variant: &Variant, file_len: u64) -> bool {
        self.variant == variant.id
            && self.segment_count == variant.segments.len()
            && self.total_size == variant.total_size()
            && self.segments <= self.segment_count
            && self.bytes <= file_len
    }
}

/// Path of the resume cursor belonging to a track file.
pub fn cursor_path(track: &Path) -> PathBuf {
    let mut name = OsString::from(track.as_os_str());
    name.push(".cursor");
    PathBuf::from(name)
}

/// Remove the resume cursor of a track that is no longer needed.
pub async fn discard_cursor(track: &Path) {
    let cursor_file = cursor_path(track);
    match fs::remove_file(&cursor_file).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %cursor_file.display(), error = %e, "Failed to remove resume cursor"),
    }
}

pub struct SegmentDownloader<'a> {
    client: &'a Client,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> SegmentDownloader<'a> {
    pub fn new(client: &'a Client, reporter: &'a dyn ProgressReporter) -> Self {
        Self { client, reporter }
    }

    /// Download one track into `dest`, resuming a previous partial run.
    ///
    /// A failed segment aborts the track. Whatever was appended before it
    /// stays on disk together with its cursor. A completed track keeps its
    /// cursor too, so calling this again for the same variant fetches
    /// nothing.
    #[instrument(skip(self, source, dest), fields(variant = %source.variant.id, dest = %dest.display()))]
    pub async fn download_track(
        &self,
        source: &ResolvedSource<'_>,
        dest: &Path,
    ) -> Result<DownloadProgress> {
        let kind = source.variant.kind;
        let segments = &source.variant.segments;
        let urls = source.segment_urls()?;
        let cursor_file = cursor_path(dest);

        let (mut file, mut cursor) = self.open_track(source, dest, &cursor_file).await?;

        let mut progress = DownloadProgress {
            downloaded_bytes: segments[..cursor.segments].iter().map(|s| s.size).sum(),
            total_bytes: source.variant.total_size(),
        };

        info!(
            kind = %kind,
            segments = segments.len(),
            resume_at = cursor.segments,
            size = %format_size(progress.total_bytes, BINARY),
            "Downloading track"
        );
        self.reporter.track_started(kind, progress);

        for (segment, url) in segments.iter().zip(&urls).skip(cursor.segments) {
            let written = self.append_segment(&mut file, url, dest).await?;

            cursor.segments += 1;
            cursor.bytes += written;
            write_cursor(&cursor_file, &cursor).await?;

            progress.downloaded_bytes += segment.size;
            self.reporter.track_progress(kind, progress);
        }

        drop(file);
        self.reporter.track_finished(kind, progress);
        debug!(bytes = cursor.bytes, "Track complete");

        Ok(progress)
    }

    /// Open `dest` for appending and work out where to continue.
    async fn open_track(
        &self,
        source: &ResolvedSource<'_>,
        dest: &Path,
        cursor_file: &Path,
    ) -> Result<(File, SegmentCursor)> {
        let existing_len = match fs::metadata(dest).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(VimeoError::io("inspecting", dest, e)),
        };

        if let Some(len) = existing_len {
            match read_cursor(cursor_file).await {
                Some(cursor) if cursor.resumes(source.variant, len) => {
                    let file = OpenOptions::new()
                        .write(true)
                        .open(dest)
                        .await
                        .map_err(|e| VimeoError::io("opening", dest, e))?;
                    file.set_len(cursor.bytes)
                        .await
                        .map_err(|e| VimeoError::io("truncating", dest, e))?;
                    drop(file);

                    debug!(
                        segments = cursor.segments,
                        bytes = cursor.bytes,
                        "Resuming partial track"
                    );
                    let file = open_append(dest).await?;
                    return Ok((file, cursor));
                }
                _ => {
                    warn!(
                        path = %dest.display(),
                        "Track file has no usable resume cursor, starting over"
                    );
                }
            }
        } else if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VimeoError::io("creating directory", parent, e))?;
        }

        let init = source.variant.decode_init_segment().map_err(|e| {
            VimeoError::upstream_parse(
                source.base_url.as_str(),
                format!(
                    "init segment of variant {} is not valid base64: {e}",
                    source.variant.id
                ),
            )
        })?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| VimeoError::io("creating", dest, e))?;
        file.write_all(&init)
            .await
            .map_err(|e| VimeoError::io("writing init segment to", dest, e))?;
        file.flush()
            .await
            .map_err(|e| VimeoError::io("writing init segment to", dest, e))?;

        let cursor = SegmentCursor::start(source.variant, init.len() as u64);
        write_cursor(cursor_file, &cursor).await?;

        Ok((file, cursor))
    }

    /// GET one segment and append its body. Returns the bytes written.
    async fn append_segment(&self, file: &mut File, url: &Url, dest: &Path) -> Result<u64> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(VimeoError::http_status(
                response.status(),
                url.as_str(),
                "segment download",
            ));
        }

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| VimeoError::io("appending segment to", dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| VimeoError::io("appending segment to", dest, e))?;

        Ok(written)
    }
}

async fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .map_err(|e| VimeoError::io("opening", path, e))
}

async fn read_cursor(path: &Path) -> Option<SegmentCursor> {
    let raw = fs::read(path).await.ok()?;
    serde_json::from_slice(&raw).ok()
}

async fn write_cursor(path: &Path, cursor: &SegmentCursor) -> Result<()> {
    let raw = serde_json::to_vec(cursor)
        .map_err(|e| VimeoError::io("writing", path, std::io::Error::other(e)))?;
    fs::write(path, raw)
        .await
        .map_err(|e| VimeoError::io("writing", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::{Segment, Variant};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // base64 of "INIT"
    const INIT_B64: &str = "SU5JVA==";

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DownloadProgress>>,
    }

    impl ProgressReporter for Recorder {
        fn track_progress(&self, _kind: TrackKind, progress: DownloadProgress) {
            self.events.lock().unwrap().push(progress);
        }
    }

    fn variant(bodies: &[&str]) -> Variant {
        Variant {
            id: "v".into(),
            kind: TrackKind::Video,
            bitrate: None,
            height: Some(720),
            base_url: String::new(),
            init_segment: INIT_B64.into(),
            segments: bodies
                .iter()
                .enumerate()
                .map(|(i, body)| Segment {
                    url: format!("seg-{}.m4s", i + 1),
                    size: body.len() as u64,
                })
                .collect(),
        }
    }

    fn source<'a>(server: &MockServer, variant: &'a Variant) -> ResolvedSource<'a> {
        ResolvedSource {
            variant,
            base_url: Url::parse(&format!("{}/clip/", server.uri())).unwrap(),
            local_filename: "clip.m4v".into(),
        }
    }

    fn cursor_json(variant: &Variant, segments: usize, bytes: u64) -> String {
        let mut cursor = SegmentCursor::start(variant, 4);
        cursor.segments = segments;
        cursor.bytes = bytes;
        serde_json::to_string(&cursor).unwrap()
    }

    async fn serve(server: &MockServer, bodies: &[&str]) {
        for (i, body) in bodies.iter().enumerate() {
            Mock::given(method("GET"))
                .and(path(format!("/clip/seg-{}.m4s", i + 1)))
                .respond_with(ResponseTemplate::new(200).set_body_string(*body))
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn writes_init_then_segments_in_order() {
        let server = MockServer::start().await;
        let bodies = ["aaa", "bbbb", "cc"];
        serve(&server, &bodies).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        let variant = variant(&bodies);
        let recorder = Recorder::default();
        let client = Client::new();

        let progress = SegmentDownloader::new(&client, &recorder)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"INITaaabbbbcc");
        assert_eq!(progress.downloaded_bytes, 9);
        assert_eq!(progress.total_bytes, 9);
        assert_eq!(
            std::fs::read_to_string(cursor_path(&dest)).unwrap(),
            cursor_json(&variant, 3, 13)
        );

        let events = recorder.events.lock().unwrap();
        let downloaded: Vec<u64> = events.iter().map(|p| p.downloaded_bytes).collect();
        assert_eq!(downloaded, vec![3, 7, 9]);
        assert!(events.iter().all(|p| p.total_bytes == 9));
    }

    #[tokio::test]
    async fn resumes_after_last_complete_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip/seg-1.m4s"))
            .respond_with(ResponseTemplate::new(200).set_body_string("aaa"))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clip/seg-2.m4s"))
            .respond_with(ResponseTemplate::new(200).set_body_string("bbbb"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        let variant = variant(&["aaa", "bbbb"]);
        // A half-written second segment follows the cursor position.
        std::fs::write(&dest, b"INITaaabb").unwrap();
        std::fs::write(cursor_path(&dest), cursor_json(&variant, 1, 7)).unwrap();
        let recorder = Recorder::default();
        let client = Client::new();

        SegmentDownloader::new(&client, &recorder)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"INITaaabbbb");
        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![DownloadProgress {
                downloaded_bytes: 7,
                total_bytes: 7
            }]
        );
    }

    #[tokio::test]
    async fn file_without_cursor_starts_over() {
        let server = MockServer::start().await;
        let bodies = ["aaa", "bbbb"];
        serve(&server, &bodies).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        std::fs::write(&dest, b"stale bytes from somewhere").unwrap();

        let variant = variant(&bodies);
        let client = Client::new();
        SegmentDownloader::new(&client, &NoopProgress)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"INITaaabbbb");
    }

    #[tokio::test]
    async fn cursor_beyond_file_length_is_ignored() {
        let server = MockServer::start().await;
        let bodies = ["aaa"];
        serve(&server, &bodies).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        let variant = variant(&bodies);
        std::fs::write(&dest, b"INI").unwrap();
        std::fs::write(cursor_path(&dest), cursor_json(&variant, 1, 99)).unwrap();
        let client = Client::new();
        SegmentDownloader::new(&client, &NoopProgress)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"INITaaa");
    }

    #[tokio::test]
    async fn failed_segment_keeps_earlier_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip/seg-1.m4s"))
            .respond_with(ResponseTemplate::new(200).set_body_string("aaa"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clip/seg-2.m4s"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        let variant = variant(&["aaa", "bbbb"]);
        let client = Client::new();

        let err = SegmentDownloader::new(&client, &NoopProgress)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, VimeoError::HttpStatus { .. }));
        assert!(err.is_retryable());
        assert_eq!(std::fs::read(&dest).unwrap(), b"INITaaa");
        let cursor = std::fs::read_to_string(cursor_path(&dest)).unwrap();
        assert_eq!(cursor, cursor_json(&variant, 1, 7));
    }

    #[tokio::test]
    async fn cursor_of_another_variant_restarts_the_track() {
        let server = MockServer::start().await;
        let bodies = ["hd1", "hd2"];
        serve(&server, &bodies).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");

        // A previous run of a lower variant stopped after its first segment.
        let mut other = variant(&["sd1", "sd2", "sd3"]);
        other.id = "v360".into();
        std::fs::write(&dest, b"INITsd1").unwrap();
        std::fs::write(cursor_path(&dest), cursor_json(&other, 1, 7)).unwrap();

        let variant = variant(&bodies);
        let client = Client::new();
        SegmentDownloader::new(&client, &NoopProgress)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"INIThd1hd2");
        assert_eq!(
            std::fs::read_to_string(cursor_path(&dest)).unwrap(),
            cursor_json(&variant, 2, 10)
        );
    }

    #[tokio::test]
    async fn finished_track_is_not_fetched_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip/seg-1.m4s"))
            .respond_with(ResponseTemplate::new(200).set_body_string("aaa"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        let variant = variant(&["aaa"]);
        let client = Client::new();
        let downloader = SegmentDownloader::new(&client, &NoopProgress);

        for _ in 0..2 {
            let progress = downloader
                .download_track(&source(&server, &variant), &dest)
                .await
                .unwrap();
            assert_eq!(progress.downloaded_bytes, 3);
        }
        assert_eq!(std::fs::read(&dest).unwrap(), b"INITaaa");

        discard_cursor(&dest).await;
        assert!(!cursor_path(&dest).exists());
    }

    #[tokio::test]
    async fn invalid_init_segment_is_a_parse_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clip.m4v");
        let mut variant = variant(&["aaa"]);
        variant.init_segment = "***".into();
        let client = Client::new();

        let err = SegmentDownloader::new(&client, &NoopProgress)
            .download_track(&source(&server, &variant), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, VimeoError::UpstreamParse { .. }));
    }
}
