//! Lossless merge of the video and audio tracks with an external ffmpeg.
//!
//! ffmpeg writes into a `<stem>.part.<ext>` sibling of the output which is
//! renamed once the process exits cleanly, so the output path never holds a
//! half-written file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use process_utils::{display_command, find_program, tokio_command};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, VimeoError};

/// Last stderr lines kept when the multiplexer fails.
const STDERR_TAIL_LINES: usize = 8;

#[derive(Debug, Clone)]
pub struct Remuxer {
    program: PathBuf,
}

impl Remuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the configured program can be found at all.
    pub fn is_available(&self) -> bool {
        find_program(&self.program).is_some()
    }

    fn build_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push("-i".into());
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.into());
        args.extend(
            ["-c:v", "copy", "-c:a", "copy", "-strict", "-2"]
                .into_iter()
                .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    /// Stream-copy `video` and `audio` into `output`.
    ///
    /// On success both inputs are deleted and `true` is returned. A non-zero
    /// exit keeps the inputs, removes the staging file and returns `false`.
    /// Failing to start the program at all is an error.
    #[instrument(skip(self), fields(program = %self.program.display()))]
    pub async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<bool> {
        let staging = staging_path(output);
        let args = Self::build_args(video, audio, &staging);
        debug!(command = %display_command(&self.program, &args), "Running multiplexer");

        let result = tokio_command(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| VimeoError::MultiplexerUnavailable {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            warn!(
                status = %result.status,
                stderr = %tail.into_iter().rev().collect::<Vec<_>>().join(" | "),
                "Multiplexer failed, keeping track files"
            );
            remove_if_present(&staging).await;
            return Ok(false);
        }

        if let Err(e) = fs::rename(&staging, output).await {
            remove_if_present(&staging).await;
            return Err(VimeoError::io("renaming", &staging, e));
        }

        for input in [video, audio] {
            remove_if_present(input).await;
        }

        info!(output = %output.display(), "Merged audio and video tracks");
        Ok(true)
    }
}

/// `<dir>/<stem>.part.<ext>` next to `output`. The extension is kept so
/// ffmpeg still picks the container from it.
fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_stem().unwrap_or_default().to_os_string();
    name.push(".part");
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}

async fn remove_if_present(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}
