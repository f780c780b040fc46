//! # Upload Intake
//!
//! Turns a `multipart/form-data` body into an ordered list of audio uploads.
//!
//! ## Steps:
//! 1. [`read_parts`]: drain the multipart stream into memory, part by part,
//!    enforcing the per-file size limit
//! 2. [`collect_uploads`]: pick the file parts, in the order they must be
//!    concatenated
//! 3. [`validate_uploads`]: enforce the count and media-type rules
//!
//! Nothing touches the staging area until all three steps pass, so a
//! rejected request never leaves files behind.

use actix_multipart::{Field, Multipart};
use futures_util::stream::StreamExt;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Minimum number of files a concatenation needs.
pub const MIN_FILES: usize = 2;

/// One part of the multipart body, fully read into memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Form field name the part was sent under
    pub field_name: String,
    /// Filename declared in the part's Content-Disposition, if any
    pub filename: Option<String>,
    /// Declared media type, if any
    pub content_type: Option<String>,
    /// Raw bytes of the part
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// A part looks like a file when it declares a filename or a media type.
    pub fn is_file_like(&self) -> bool {
        self.filename.is_some() || self.content_type.is_some()
    }

    pub fn is_audio(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("audio/"))
            .unwrap_or(false)
    }
}

/// Size limits applied while the body is read.
#[derive(Debug, Clone, Copy)]
pub struct IntakeLimits {
    /// Largest accepted part, in bytes
    pub max_file_size: usize,
    /// Largest accepted sum of all parts, in bytes
    pub max_total_size: usize,
}

/// Read every part of the multipart body, in arrival order.
///
/// ## Errors:
/// - `BadRequest` when the body is not valid multipart data
/// - `ValidationError` when a part is larger than `max_file_size` bytes, or
///   all parts together exceed `max_total_size` bytes
pub async fn read_parts(mut payload: Multipart, limits: IntakeLimits) -> AppResult<Vec<UploadedFile>> {
    let mut parts = Vec::new();
    let mut total = 0usize;

    while let Some(item) = payload.next().await {
        let mut field: Field = item?;

        let (field_name, filename) = match field.content_disposition() {
            Some(disposition) => (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition
                    .get_filename()
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            ),
            None => (String::new(), None),
        };
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > limits.max_file_size {
                return Err(AppError::ValidationError(format!(
                    "File '{}' is too large (max: {} bytes)",
                    filename.as_deref().unwrap_or(&field_name),
                    limits.max_file_size
                )));
            }
            total += chunk.len();
            if total > limits.max_total_size {
                return Err(AppError::ValidationError(format!(
                    "Upload is too large (max: {} bytes in total)",
                    limits.max_total_size
                )));
            }
            data.extend_from_slice(&chunk);
        }

        debug!(
            field = %field_name,
            filename = ?filename,
            content_type = ?content_type,
            bytes = data.len(),
            "Received multipart part"
        );

        parts.push(UploadedFile {
            field_name,
            filename,
            content_type,
            data,
        });
    }

    Ok(parts)
}

/// Select the uploads to concatenate, in concatenation order.
///
/// The primary path keeps every part sent under `field_name`, in arrival
/// order. When no such part exists the request used some other encoding
/// (`file1`, `file2`, ... or `files[0]`, `files[1]`, ...) and the order is
/// rebuilt by [`order_by_field_suffix`]. That fallback is best-effort.
pub fn collect_uploads(parts: Vec<UploadedFile>, field_name: &str) -> Vec<UploadedFile> {
    let (primary, others): (Vec<_>, Vec<_>) = parts
        .into_iter()
        .partition(|part| part.field_name == field_name);

    if !primary.is_empty() {
        return primary;
    }

    let candidates: Vec<UploadedFile> = others.into_iter().filter(UploadedFile::is_file_like).collect();
    if !candidates.is_empty() {
        debug!(
            files = candidates.len(),
            expected_field = %field_name,
            "No parts under the expected field, ordering by field name suffix"
        );
    }
    order_by_field_suffix(candidates)
}

/// Sort parts by the last run of digits in their field name.
///
/// Fields without digits sort at position 0. The sort is stable, so parts
/// with equal keys keep their arrival order.
pub fn order_by_field_suffix(mut parts: Vec<UploadedFile>) -> Vec<UploadedFile> {
    parts.sort_by_key(|part| numeric_suffix(&part.field_name).unwrap_or(0));
    parts
}

/// Last run of ASCII digits in a field name: `file12` → 12, `files[3]` → 3.
fn numeric_suffix(name: &str) -> Option<u64> {
    // ASCII digits are one byte wide, so both slice bounds are char boundaries.
    let end = name.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = name[..end].trim_end_matches(|c: char| c.is_ascii_digit()).len();
    name[start..end].parse().ok()
}

/// Enforce the count and media-type rules.
///
/// ## Errors:
/// - No files at all
/// - Fewer than [`MIN_FILES`] files
/// - Any file whose declared media type is not `audio/*` (1-based position in the message)
pub fn validate_uploads(files: &[UploadedFile]) -> AppResult<()> {
    if files.is_empty() {
        return Err(AppError::ValidationError("No files uploaded".to_string()));
    }

    if files.len() < MIN_FILES {
        return Err(AppError::ValidationError(format!(
            "At least {} files are required for concatenation",
            MIN_FILES
        )));
    }

    if let Some(position) = files.iter().position(|file| !file.is_audio()) {
        return Err(AppError::ValidationError(format!(
            "File {} is not a valid audio file",
            position + 1
        )));
    }

    Ok(())
}
