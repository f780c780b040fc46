//! # Staging Area
//!
//! Every concatenation request gets an [`Operation`]: a fresh UUID plus the
//! set of files it owns inside the staging root.
//!
//! ## File layout for operation `<id>`:
//! - `<id>_input_000.mp3`, `<id>_input_001.wav`, ...: uploaded files in upload order
//! - `<id>_list.txt`: ffmpeg concat manifest
//! - `<id>_output.mp3`: concatenated result
//!
//! Because every path is prefixed with the operation id, concurrent
//! requests never touch each other's files and no locking is needed.
//!
//! ## Cleanup:
//! An `Operation` deletes all of its files when it is dropped. Handlers keep
//! the operation alive for as long as its files are needed (up to the end of
//! the response body) and every early return cleans up automatically.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::intake::UploadedFile;

/// Extension used when an upload does not declare a usable one.
pub const DEFAULT_EXTENSION: &str = ".mp3";

/// Longest extension (without the dot) kept from an uploaded filename.
const MAX_EXTENSION_LEN: usize = 10;

/// Process-wide staging root, created once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: Arc<PathBuf>,
}

impl StagingArea {
    /// Create the staging root if it is missing and resolve it to an absolute path.
    ///
    /// The concat demuxer resolves relative manifest entries against the
    /// manifest's own directory, so entries must be absolute.
    pub fn prepare(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = std::fs::canonicalize(root)?;
        Ok(Self { root: Arc::new(root) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new operation with a freshly generated id.
    pub fn begin(&self) -> Operation {
        Operation::new(&self.root, Uuid::new_v4())
    }
}

/// One request's set of staged files.
#[derive(Debug)]
pub struct Operation {
    id: Uuid,
    root: PathBuf,
    inputs: Vec<PathBuf>,
    manifest: PathBuf,
    output: PathBuf,
    cleaned: bool,
}

impl Operation {
    fn new(root: &Path, id: Uuid) -> Self {
        Self {
            id,
            root: root.to_path_buf(),
            inputs: Vec::new(),
            manifest: root.join(format!("{}_list.txt", id)),
            output: root.join(format!("{}_output.mp3", id)),
            cleaned: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// First eight hex characters of the id, used in the download filename.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Write every upload to its own file, in order.
    ///
    /// Paths are recorded before each write so a failure half way through
    /// still leaves every created file registered for cleanup.
    pub async fn stage_inputs(&mut self, files: &[UploadedFile]) -> io::Result<()> {
        for (index, file) in files.iter().enumerate() {
            let path = self.root.join(format!(
                "{}_input_{:03}{}",
                self.id,
                index,
                file_extension(file.filename.as_deref())
            ));
            self.inputs.push(path.clone());
            fs::write(&path, &file.data).await?;
        }

        debug!(
            operation_id = %self.id,
            files = self.inputs.len(),
            "Staged uploaded files"
        );
        Ok(())
    }

    /// Write the concat manifest listing every staged input, in order.
    pub async fn write_manifest(&self) -> io::Result<()> {
        fs::write(&self.manifest, manifest_contents(&self.inputs)).await
    }

    /// Delete every file this operation may have created.
    ///
    /// Missing files are skipped; failures are logged and never returned.
    /// Safe to call more than once.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        let paths = self
            .inputs
            .iter()
            .chain([&self.manifest, &self.output]);

        let mut removed = 0usize;
        for path in paths {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        operation_id = %self.id,
                        path = %path.display(),
                        error = %err,
                        "Failed to remove staged file"
                    );
                }
            }
        }

        debug!(operation_id = %self.id, removed, "Operation cleaned up");
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Best-effort extension for an uploaded filename, including the leading dot.
///
/// Falls back to [`DEFAULT_EXTENSION`] when there is no filename, no
/// extension, or the extension contains anything but ASCII alphanumerics.
pub fn file_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Quote a path for a concat manifest line: `file '<path>'`.
///
/// Inside single quotes nothing is special to ffmpeg, so an embedded quote
/// closes the string, adds an escaped quote and reopens it: `'\''`.
pub fn manifest_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{}'", escaped)
}

/// Full manifest text, one entry per line, in the given order.
pub fn manifest_contents(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| manifest_entry(path) + "\n")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: Option<&str>, data: &[u8]) -> UploadedFile {
        UploadedFile {
            field_name: "files".to_string(),
            filename: filename.map(str::to_string),
            content_type: Some("audio/mpeg".to_string()),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension(Some("intro.wav")), ".wav");
        assert_eq!(file_extension(Some("archive.tar.flac")), ".flac");
        assert_eq!(file_extension(Some("noext")), ".mp3");
        assert_eq!(file_extension(None), ".mp3");
        assert_eq!(file_extension(Some("weird.m'p3")), ".mp3");
        assert_eq!(file_extension(Some("../../etc/passwd")), ".mp3");
    }

    #[test]
    fn test_manifest_entry_escapes_single_quotes() {
        let entry = manifest_entry(Path::new("/tmp/it's here/a.mp3"));
        assert_eq!(entry, r"file '/tmp/it'\''s here/a.mp3'");
    }

    #[test]
    fn test_manifest_contents_preserve_order() {
        let paths = vec![
            PathBuf::from("/s/x_input_000.mp3"),
            PathBuf::from("/s/x_input_001.wav"),
            PathBuf::from("/s/x_input_002.mp3"),
        ];
        let manifest = manifest_contents(&paths);
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/s/x_input_000.mp3'",
                "file '/s/x_input_001.wav'",
                "file '/s/x_input_002.mp3'",
            ]
        );
        assert!(manifest.ends_with('\n'));
    }

    #[test]
    fn test_short_id_is_first_eight_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::prepare(dir.path()).unwrap();
        let operation = staging.begin();
        let short = operation.short_id();
        assert_eq!(short.len(), 8);
        assert!(operation.id().to_string().starts_with(&short));
    }

    #[test]
    fn test_prepare_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let staging = StagingArea::prepare(&nested).unwrap();
        assert!(staging.root().is_dir());
        assert!(staging.root().is_absolute());
    }

    #[tokio::test]
    async fn test_stage_inputs_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::prepare(dir.path()).unwrap();
        let mut operation = staging.begin();
        let id = operation.id().to_string();

        let files = vec![upload(Some("b.wav"), b"first"), upload(None, b"second")];
        operation.stage_inputs(&files).await.unwrap();
        operation.write_manifest().await.unwrap();

        let names: Vec<String> = operation
            .inputs()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{id}_input_000.wav"), format!("{id}_input_001.mp3")]);
        assert_eq!(std::fs::read(&operation.inputs()[0]).unwrap(), b"first");
        assert_eq!(std::fs::read(&operation.inputs()[1]).unwrap(), b"second");

        let manifest = std::fs::read_to_string(operation.manifest_path()).unwrap();
        assert_eq!(manifest, manifest_contents(operation.inputs()));
        assert!(operation.manifest_path().ends_with(format!("{id}_list.txt")));
        assert!(operation.output_path().ends_with(format!("{id}_output.mp3")));
    }

    #[tokio::test]
    async fn test_drop_removes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::prepare(dir.path()).unwrap();
        let mut operation = staging.begin();

        let files = vec![upload(Some("a.mp3"), b"a"), upload(Some("b.mp3"), b"b")];
        operation.stage_inputs(&files).await.unwrap();
        operation.write_manifest().await.unwrap();
        std::fs::write(operation.output_path(), b"ab").unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);

        drop(operation);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_and_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::prepare(dir.path()).unwrap();
        let mut operation = staging.begin();
        operation.stage_inputs(&[upload(None, b"x")]).await.unwrap();

        // Manifest and output were never written.
        operation.cleanup();
        operation.cleanup();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_operations_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::prepare(dir.path()).unwrap();
        let first = staging.begin();
        let second = staging.begin();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.manifest_path(), second.manifest_path());
    }
}
