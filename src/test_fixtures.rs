//! Shared test fixtures: a shell-script stand-in for ffmpeg and a
//! multipart body builder.
//!
//! All fake tools are written once per test process, before any test
//! spawns one, to avoid `ETXTBSY` races between writing a script and
//! executing it from another thread.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::AppConfig;
use crate::staging::StagingArea;
use crate::state::AppState;

/// Behaviours of the fake media tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeTool {
    /// Concatenates the manifest entries byte for byte in either mode.
    Concatenates,
    /// Fails in stream-copy mode, concatenates when re-encoding.
    CopyFails,
    /// Same as `CopyFails`, appending the mode of each call to `<script>.log`.
    RecordsAttempts,
    /// Fails in both modes with a mode-specific diagnostic.
    AlwaysFails,
    /// Sleeps far longer than any test timeout.
    Hangs,
    /// Reports success without writing an output file.
    NoOutput,
    /// Fails everything, including the version probe.
    Broken,
}

impl FakeTool {
    const ALL: [FakeTool; 7] = [
        FakeTool::Concatenates,
        FakeTool::CopyFails,
        FakeTool::RecordsAttempts,
        FakeTool::AlwaysFails,
        FakeTool::Hangs,
        FakeTool::NoOutput,
        FakeTool::Broken,
    ];

    fn file_name(self) -> &'static str {
        match self {
            FakeTool::Concatenates => "ffmpeg-concatenates",
            FakeTool::CopyFails => "ffmpeg-copy-fails",
            FakeTool::RecordsAttempts => "ffmpeg-records-attempts",
            FakeTool::AlwaysFails => "ffmpeg-always-fails",
            FakeTool::Hangs => "ffmpeg-hangs",
            FakeTool::NoOutput => "ffmpeg-no-output",
            FakeTool::Broken => "ffmpeg-broken",
        }
    }

    fn body(self) -> &'static str {
        match self {
            FakeTool::Concatenates => "concat\nexit 0\n",
            FakeTool::CopyFails => concat!(
                "if [ \"$mode\" = \"copy\" ]; then\n",
                "  echo \"copy: Non-monotonous DTS in output stream\" >&2\n",
                "  exit 1\n",
                "fi\n",
                "concat\nexit 0\n",
            ),
            FakeTool::RecordsAttempts => concat!(
                "echo \"$mode\" >> \"$0.log\"\n",
                "if [ \"$mode\" = \"copy\" ]; then\n",
                "  echo \"copy: Non-monotonous DTS in output stream\" >&2\n",
                "  exit 1\n",
                "fi\n",
                "concat\nexit 0\n",
            ),
            FakeTool::AlwaysFails => concat!(
                "echo \"$mode failed: Invalid data found when processing input\" >&2\n",
                "exit 1\n",
            ),
            FakeTool::Hangs => "exec sleep 30\n",
            FakeTool::NoOutput => "exit 0\n",
            FakeTool::Broken => "exit 1\n",
        }
    }

    fn script(self) -> String {
        let prelude = if self == FakeTool::Broken { "exit 1\n" } else { "" };
        format!(
            r#"#!/bin/sh
{prelude}if [ "$1" = "-version" ]; then
  echo "ffmpeg version fake-6.0"
  exit 0
fi
list=""
out=""
mode="reencode"
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then list="$arg"; fi
  if [ "$prev" = "-c" ] && [ "$arg" = "copy" ]; then mode="copy"; fi
  prev="$arg"
  out="$arg"
done
concat() {{
  sed -n "s/^file '\(.*\)'\$/\1/p" "$list" | while IFS= read -r f; do cat "$f"; done > "$out"
}}
{body}"#,
            prelude = prelude,
            body = self.body(),
        )
    }
}

fn tools_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().expect("create fake tool dir").into_path();
        for tool in FakeTool::ALL {
            let path = dir.join(tool.file_name());
            std::fs::write(&path, tool.script()).expect("write fake tool");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod fake tool");
        }
        dir
    })
}

/// Path of a fake ffmpeg with the given behaviour.
pub fn fake_tool(tool: FakeTool) -> PathBuf {
    tools_dir().join(tool.file_name())
}

/// Lines appended by [`FakeTool::RecordsAttempts`] so far.
pub fn recorded_attempts() -> Vec<String> {
    let log = tools_dir().join(format!("{}.log", FakeTool::RecordsAttempts.file_name()));
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// A tool path that does not exist.
pub fn missing_tool() -> PathBuf {
    tools_dir().join("ffmpeg-does-not-exist")
}

/// Application state wired to a fake tool and a scratch staging root.
pub fn test_state(tool: FakeTool, staging_root: &Path) -> AppState {
    let mut config = AppConfig::default();
    config.ffmpeg.binary = fake_tool(tool).to_string_lossy().into_owned();
    config.ffmpeg.timeout_secs = 5;
    config.storage.staging_dir = staging_root.to_string_lossy().into_owned();
    config.upload.max_file_size_mb = 1;
    config.upload.max_total_size_mb = 2;
    let staging = StagingArea::prepare(staging_root).expect("prepare staging root");
    AppState::new(config, staging)
}

/// Number of entries currently in a directory.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// One part of a hand-built multipart body.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn audio(name: &'a str, filename: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            content_type: Some("audio/mpeg"),
            data,
        }
    }
}

pub const BOUNDARY: &str = "----concat-test-boundary";

/// Encode parts as `multipart/form-data`, returning the content type header and body.
pub fn multipart_body(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{}\"", filename));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
