use std::process::Stdio;

use anyhow::{Result, bail};
use tracing::debug;

use crate::modules::ExecContext;

/// Binary used for media operations. Overridable with `REELFLOW_FFMPEG`.
pub fn ffmpeg_binary() -> String {
    std::env::var("REELFLOW_FFMPEG").unwrap_or_else(|_| "ffmpeg".to_string())
}

/// Run an external tool to completion. A non-zero exit fails with the tail
/// of the tool's stderr.
///
/// The child is killed if the call is cancelled or the future is dropped
/// (deadline expiry in the engine drops it).
pub async fn run_tool(program: &str, args: &[String], ctx: &ExecContext) -> Result<()> {
    debug!(step = %ctx.step, program, ?args, "Spawning tool");

    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to start '{}': {}", program, e))?;

    // wait_with_output reads stdout/stderr concurrently while waiting for
    // the process to exit, preventing pipe-buffer deadlocks.
    let output = tokio::select! {
        _ = ctx.cancel.cancelled() => bail!("'{}' cancelled", program),
        _ = tokio::time::sleep_until(ctx.deadline) => bail!("'{}' exceeded its deadline", program),
        result = child.wait_with_output() => result?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        bail!("'{}' exited with code {}: {}", program, code, tail(&stderr, 20));
    }

    Ok(())
}

/// Last `lines` lines of `text`.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
