use anyhow::Result;
use arboard::Clipboard;
#[cfg(target_os = "linux")]
use arboard::SetExtLinux;

const DAEMON_FLAG: &str = "__promptpack-clipboard-daemon";

/// Early-exit hook for main. On Linux the clipboard selection dies with the
/// process, so the copy is served by a detached re-exec of this binary that
/// parks while holding it; this intercepts that re-exec. Returns whether the
/// process was the daemon (and should exit).
pub fn maybe_run_daemon() -> Result<bool> {
    if !std::env::args().any(|a| a == DAEMON_FLAG) {
        return Ok(false);
    }
    #[cfg(target_os = "linux")]
    {
        let text = std::io::read_to_string(std::io::stdin())?;
        Clipboard::new()?.set().wait().text(text)?;
        std::thread::park();
        unreachable!("daemon parks indefinitely");
    }
    #[cfg(not(target_os = "linux"))]
    Ok(true)
}

#[cfg(not(target_os = "linux"))]
pub fn copy_text_to_clipboard(text: String) -> Result<()> {
    Clipboard::new()?.set_text(text)?;
    Ok(())
}

#[cfg(target_os = "linux")]
pub fn copy_text_to_clipboard(text: String) -> Result<()> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(std::env::current_exe()?)
        .arg(DAEMON_FLAG)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .current_dir("/")
        .spawn()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow::anyhow!("no stdin pipe to the clipboard daemon"))?;
    stdin.write_all(text.as_bytes())?;
    stdin.flush()?;
    Ok(())
}
