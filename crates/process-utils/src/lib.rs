//! Helpers for spawning the external tools the downloader depends on.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` that never opens a console window and
/// is killed if its handle is dropped before it exits.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Render a program and its argument vector as a single line for logs.
///
/// Arguments containing whitespace or quotes are wrapped in double quotes.
/// The output is for humans only and is never handed to a shell.
pub fn display_command<I, S>(program: impl AsRef<OsStr>, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut line = quote_for_display(program.as_ref());
    for arg in args {
        line.push(' ');
        line.push_str(&quote_for_display(arg.as_ref()));
    }
    line
}

fn quote_for_display(value: &OsStr) -> String {
    let text = value.to_string_lossy();
    if text.is_empty() {
        return "\"\"".to_string();
    }
    if text.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", text.replace('"', "\\\""))
    } else {
        text.into_owned()
    }
}

/// Locate `program` the way a shell would.
///
/// Values containing a path separator are checked as-is; bare names are
/// looked up in every `PATH` entry (with `.exe` appended on Windows).
pub fn find_program(program: impl AsRef<OsStr>) -> Option<PathBuf> {
    let program = program.as_ref();
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| candidate.is_file())
}

fn candidates(dir: &Path, program: &OsStr) -> Vec<PathBuf> {
    let mut found = vec![dir.join(program)];
    if cfg!(windows) {
        let mut with_ext = OsString::from(program);
        with_ext.push(".exe");
        found.push(dir.join(with_ext));
    }
    found
}
