//! System clipboard access for `share … --copy`.
//!
//! On Linux the selection lives only as long as the process that owns it,
//! so the text is handed to a detached copy of this binary which keeps
//! serving it until something else is copied.

use arboard::Clipboard;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use tracing::warn;

/// Set in the environment of the helper process.
pub const HELPER_ENV: &str = "CHAMBERS_CLIPBOARD_HELPER";
const READY: &str = "ready";

/// Puts `text` on the system clipboard. Failure is reported, not fatal.
pub fn copy_to_clipboard(text: &str) -> bool {
    match copy(text) {
        Ok(copied) => copied,
        Err(e) => {
            warn!(err=%e, "clipboard unavailable");
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn copy(text: &str) -> io::Result<bool> {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    let mut helper = Command::new(std::env::current_exe()?);
    helper.env(HELPER_ENV, "1").process_group(0);
    hand_off(helper, text)
}

#[cfg(not(target_os = "linux"))]
fn copy(text: &str) -> io::Result<bool> {
    Clipboard::new()
        .and_then(|mut c| c.set_text(text.to_string()))
        .map(|()| true)
        .map_err(io::Error::other)
}

/// Starts `helper`, feeds it `text` and reports success once it confirms it
/// owns the clipboard. The helper is left running.
#[cfg(all(unix, any(target_os = "linux", test)))]
fn hand_off(mut helper: std::process::Command, text: &str) -> io::Result<bool> {
    use std::io::{BufRead, BufReader};
    use std::process::Stdio;

    let mut child = helper
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }
    let Some(stdout) = child.stdout.take() else {
        return Ok(false);
    };
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line)?;
    Ok(line.trim() == READY)
}

/// Runs the helper side when this process was started as one. Returns the
/// exit code to finish with, or `None` for a normal run.
pub fn serve_if_requested() -> Option<ExitCode> {
    std::env::var_os(HELPER_ENV)?;
    Some(match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}

fn serve() -> anyhow::Result<()> {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    let mut clipboard = Clipboard::new()?;
    {
        let mut out = io::stdout().lock();
        // The parent stops reading after this line.
        let _ = writeln!(out, "{READY}").and_then(|()| out.flush());
    }
    set_and_wait(&mut clipboard, text)?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_and_wait(clipboard: &mut Clipboard, text: String) -> Result<(), arboard::Error> {
    use arboard::SetExtLinux;
    clipboard.set().wait().text(text)
}

#[cfg(not(target_os = "linux"))]
fn set_and_wait(clipboard: &mut Clipboard, text: String) -> Result<(), arboard::Error> {
    clipboard.set_text(text)
}
