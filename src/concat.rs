//! # Concatenation Invoker
//!
//! Drives ffmpeg's concat demuxer over a staged manifest.
//!
//! ## Strategy order:
//! 1. **Stream copy** (`-c copy`): lossless and fast, but only works when every
//!    input shares codec parameters
//! 2. **Re-encode** (`libmp3lame`, 320 kbps, 44.1 kHz): used only when stream
//!    copy exits with an error
//!
//! Each attempt is bounded by the configured timeout. A timed-out attempt is
//! killed and the operation fails immediately; there is never a third attempt.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::AppError;

/// Codec used by the re-encode fallback.
pub const REENCODE_CODEC: &str = "libmp3lame";
/// Bitrate used by the re-encode fallback.
pub const REENCODE_BITRATE: &str = "320k";
/// Sample rate used by the re-encode fallback.
pub const REENCODE_SAMPLE_RATE: &str = "44100";

/// Number of trailing stderr lines kept in diagnostics.
const DIAGNOSTIC_LINES: usize = 20;

/// How ffmpeg builds the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatStrategy {
    StreamCopy,
    Reencode,
}

impl ConcatStrategy {
    /// Attempts in the order they are tried.
    pub const ORDER: [ConcatStrategy; 2] = [ConcatStrategy::StreamCopy, ConcatStrategy::Reencode];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConcatStrategy::StreamCopy => "stream_copy",
            ConcatStrategy::Reencode => "reencode",
        }
    }

    /// Full ffmpeg argument list for this strategy.
    pub fn args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-f", "concat", "-safe", "0", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(manifest.as_os_str().to_owned());

        let codec_args: &[&str] = match self {
            ConcatStrategy::StreamCopy => &["-c", "copy"],
            ConcatStrategy::Reencode => &[
                "-acodec",
                REENCODE_CODEC,
                "-b:a",
                REENCODE_BITRATE,
                "-ar",
                REENCODE_SAMPLE_RATE,
            ],
        };
        args.extend(codec_args.iter().map(OsString::from));

        args.push(OsString::from("-y"));
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl fmt::Display for ConcatStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a concatenation produced no usable output.
#[derive(Debug)]
pub enum ConcatError {
    /// ffmpeg could not be started at all
    Spawn(std::io::Error),
    /// An attempt ran past the timeout and was killed
    Timeout {
        strategy: ConcatStrategy,
        after: Duration,
    },
    /// Both attempts exited with a non-success status; carries the re-encode
    /// diagnostic, or its exit status when stderr was empty
    Failed { diagnostic: String },
    /// ffmpeg reported success but the output file does not exist
    MissingOutput,
}

impl fmt::Display for ConcatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcatError::Spawn(err) => write!(f, "failed to launch ffmpeg: {}", err),
            ConcatError::Timeout { strategy, after } => {
                write!(f, "{} attempt timed out after {}s", strategy, after.as_secs())
            }
            ConcatError::Failed { diagnostic } => write!(f, "{}", diagnostic),
            ConcatError::MissingOutput => write!(f, "Output file was not created"),
        }
    }
}

impl std::error::Error for ConcatError {}

impl From<ConcatError> for AppError {
    fn from(err: ConcatError) -> Self {
        match err {
            ConcatError::Timeout { .. } => {
                AppError::Timeout(format!("Audio processing timed out: {}", err))
            }
            ConcatError::Failed { .. } | ConcatError::MissingOutput => {
                AppError::ToolFailed(err.to_string())
            }
            ConcatError::Spawn(_) => AppError::Internal(err.to_string()),
        }
    }
}

/// Runs ffmpeg for one operation's manifest.
#[derive(Debug, Clone)]
pub struct Concatenator {
    binary: PathBuf,
    timeout: Duration,
}

impl Concatenator {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Concatenate the manifest entries into `output`.
    ///
    /// Returns the strategy that produced the file. On failure of the last
    /// strategy its own diagnostic is reported, not the earlier one.
    pub async fn concatenate(&self, manifest: &Path, output: &Path) -> Result<ConcatStrategy, ConcatError> {
        let mut last_diagnostic = String::new();

        for strategy in ConcatStrategy::ORDER {
            let result = self.run(strategy, manifest, output).await?;

            if result.status.success() {
                if !output.exists() {
                    return Err(ConcatError::MissingOutput);
                }
                info!(strategy = %strategy, output = %output.display(), "Concatenation finished");
                return Ok(strategy);
            }

            last_diagnostic = diagnostic_tail(&result.stderr, DIAGNOSTIC_LINES);
            if last_diagnostic.is_empty() {
                last_diagnostic = format!("ffmpeg exited with {}", result.status);
            }
            warn!(
                strategy = %strategy,
                status = %result.status,
                diagnostic = %last_diagnostic,
                "Concatenation attempt failed"
            );
        }

        Err(ConcatError::Failed {
            diagnostic: last_diagnostic,
        })
    }

    async fn run(&self, strategy: ConcatStrategy, manifest: &Path, output: &Path) -> Result<Output, ConcatError> {
        let mut command = Command::new(&self.binary);
        command
            .args(strategy.args(manifest, output))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(ConcatError::Spawn),
            Err(_) => Err(ConcatError::Timeout {
                strategy,
                after: self.timeout,
            }),
        }
    }
}

/// Last `max_lines` non-empty lines of ffmpeg's stderr.
pub fn diagnostic_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
