//! # Error Handling
//!
//! This module defines the service's error type and how it is converted to HTTP responses.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of failure
//! - **Data**: Each variant carries the message shown to the client
//! - **Pattern matching**: `match` maps every variant to a status code
//!
//! ### Traits for Error Conversion
//! - **From trait**: Lets `?` turn lower-level errors into `AppError`
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Error taxonomy:
//! | Variant           | Status | When                                              |
//! |-------------------|--------|---------------------------------------------------|
//! | `BadRequest`      | 400    | The multipart body could not be decoded           |
//! | `ValidationError` | 400    | Too few files, non-audio parts, oversize parts    |
//! | `Timeout`         | 408    | ffmpeg exceeded its wall-clock limit              |
//! | `ToolFailed`      | 500    | ffmpeg failed in both modes or produced no output |
//! | `Internal`        | 500    | Anything else (I/O failures, spawn errors)        |

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::ValidationError("At least 2 files are required".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (I/O failures, unexpected conditions)
    Internal(String),

    /// Client sent a body that could not be decoded
    BadRequest(String),

    /// Client input failed validation rules
    ValidationError(String),

    /// Processing exceeded the configured time limit
    Timeout(String),

    /// The external media tool could not produce an output
    ToolFailed(String),
}

impl AppError {
    /// Machine-readable name used in the JSON error body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation_error",
            AppError::Timeout(_) => "timeout",
            AppError::ToolFailed(_) => "tool_error",
        }
    }

    /// Text of the JSON `message` field.
    ///
    /// Server-side failures keep their `Display` prefix so the client can
    /// tell an I/O problem from an ffmpeg one; client errors are shown as-is.
    fn message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::ToolFailed(_) => self.to_string(),
            AppError::BadRequest(msg) | AppError::ValidationError(msg) | AppError::Timeout(msg) => {
                msg.clone()
            }
        }
    }
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// This trait defines how errors are formatted as human-readable strings.
/// It's used when errors are logged by the request tracing layer.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            AppError::ToolFailed(msg) => write!(f, "FFmpeg error: {}", msg),
        }
    }
}

/// Implementation of the ResponseError trait for AppError.
///
/// ## JSON Response Format:
/// All errors return JSON with a consistent structure:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "At least 2 files are required for concatenation",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ToolFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),           // Machine-readable error type
                "message": self.message(),           // Human-readable error message
                "timestamp": chrono::Utc::now().to_rfc3339()  // When the error occurred
            }
        }))
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// Anything that reaches a handler through `anyhow` is unanticipated, so it
/// becomes a 500 carrying the error text.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Staging and streaming failures are server-side problems.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// A malformed multipart body is the client's fault, so it maps to 400.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Multipart error: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
