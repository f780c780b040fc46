//! # Dependency Probe
//!
//! Checks that the external media tool can be launched. The same probe runs
//! once at startup (where failure is fatal) and again on every `/health`
//! request, so the health report always reflects the current machine state.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Run `<binary> -version` and return the first line of its banner.
///
/// ## Errors:
/// - The binary cannot be spawned (not installed, not on PATH, not executable)
/// - The binary exits with a non-success status
pub async fn probe_ffmpeg(binary: &Path) -> Result<String> {
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to launch {}", binary.display()))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{} -version exited with {}",
            binary.display(),
            output.status
        ));
    }

    let banner = String::from_utf8_lossy(&output.stdout);
    let version = banner.lines().next().unwrap_or("").trim().to_string();
    debug!(binary = %binary.display(), version = %version, "FFmpeg probe succeeded");
    Ok(version)
}
