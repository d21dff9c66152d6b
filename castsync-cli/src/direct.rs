//! Direct-link downloads from the platform.
//!
//! The body is streamed into `<output>.part` and renamed once complete, so a
//! file at the final path is always a finished download. An existing `.part`
//! file is continued with a `Range` request when the server supports it.
//! A `416` reply only counts as complete when its `Content-Range` length
//! equals the partial file; anything else restarts from zero.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use humansize::{BINARY, format_size};
use reqwest::{Client, StatusCode, header};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{AppError, Result};
use crate::progress::byte_bar;

pub fn part_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

pub struct DirectDownloader<'a> {
    client: &'a Client,
    base_url: &'a Url,
    retries: u32,
    show_progress: bool,
}

impl<'a> DirectDownloader<'a> {
    pub fn new(client: &'a Client, base_url: &'a Url, retries: u32, show_progress: bool) -> Self {
        Self {
            client,
            base_url,
            retries,
            show_progress,
        }
    }

    /// Download `link` (absolute, or relative to the platform) into `output`.
    #[instrument(skip(self, output), fields(output = %output.display()))]
    pub async fn download(&self, link: &str, output: &Path) -> Result<()> {
        let url = self
            .base_url
            .join(link)
            .map_err(|e| AppError::config(format!("invalid download link `{link}`: {e}")))?;
        let part = part_path(output);

        let mut attempt = 0;
        loop {
            match self.transfer(&url, &part).await {
                Ok(()) => break,
                Err(e) if attempt < self.retries && e.is_retryable() => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        retries = self.retries,
                        "Direct download failed, resuming"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        fs::rename(&part, output)
            .await
            .map_err(|e| AppError::io("renaming", &part, e))?;
        Ok(())
    }

    /// One transfer, appending to or restarting the partial file.
    async fn transfer(&self, url: &Url, part: &Path) -> Result<()> {
        let mut offset = match fs::metadata(part).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(AppError::io("inspecting", part, e)),
        };

        let response = loop {
            let mut request = self.client.get(url.clone());
            if offset > 0 {
                request = request.header(header::RANGE, format!("bytes={offset}-"));
            }
            let response = request.send().await?;
            if offset == 0 || response.status() != StatusCode::RANGE_NOT_SATISFIABLE {
                break response;
            }

            let remote_len = complete_length(&response);
            if remote_len == Some(offset) {
                debug!(bytes = offset, "Partial file already complete");
                return Ok(());
            }
            warn!(
                bytes = offset,
                remote = ?remote_len,
                "Partial file does not match the remote size, starting over"
            );
            fs::remove_file(part)
                .await
                .map_err(|e| AppError::io("removing", part, e))?;
            offset = 0;
        };
        let status = response.status();

        let append = match status {
            StatusCode::PARTIAL_CONTENT if offset > 0 => true,
            s if s.is_success() => false,
            s => {
                return Err(AppError::HttpStatus {
                    status: s,
                    url: url.to_string(),
                });
            }
        };

        let start = if append { offset } else { 0 };
        let total = response.content_length().map(|len| len + start);
        info!(
            url = %url,
            resume_from = start,
            size = %total.map(|t| format_size(t, BINARY)).unwrap_or_else(|| "unknown".into()),
            "Downloading episode"
        );

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(part)
            .await
            .map_err(|e| AppError::io("opening", part, e))?;

        let bar = byte_bar(self.show_progress, total, "file");
        bar.set_position(start);

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::io("writing", part, e))?;
            bar.inc(chunk.len() as u64);
        }
        file.flush()
            .await
            .map_err(|e| AppError::io("writing", part, e))?;
        bar.finish_and_clear();

        Ok(())
    }
}

/// Full length from a `Content-Range: bytes */<len>` header.
fn complete_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .strip_prefix("bytes */")?
        .trim()
        .parse()
        .ok()
}
