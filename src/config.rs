//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization between Rust structs and data formats
//! - **derive macros**: Automatically generate Debug, Clone, Serialize, Deserialize
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_FFMPEG__TIMEOUT_SECS, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables
use std::time::Duration;

use crate::intake::IntakeLimits;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each section maps to one concern of the service: where to listen,
/// which media tool to run, where to stage files, and what uploads look like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ffmpeg: FfmpegConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// External media tool settings.
///
/// ## Fields:
/// - `binary`: Name or path of the ffmpeg executable (looked up on PATH when bare)
/// - `timeout_secs`: Wall-clock limit applied to each ffmpeg invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    pub binary: String,
    pub timeout_secs: u64,
}

/// Staging area settings.
///
/// The staging directory is created once at startup and never cleared
/// automatically; every operation removes its own files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub staging_dir: String,
}

/// Upload intake settings.
///
/// ## Fields:
/// - `field_name`: Multipart field carrying the audio files (`files` by default)
/// - `max_file_size_mb`: Largest accepted part, in megabytes
/// - `max_total_size_mb`: Largest accepted request (all parts together), in megabytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub field_name: String,
    pub max_file_size_mb: usize,
    pub max_total_size_mb: usize,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the service can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),  // Reachable from other containers
                port: 8999,
            },
            ffmpeg: FfmpegConfig {
                binary: "ffmpeg".to_string(),
                timeout_secs: 300,           // 5 minutes per invocation
            },
            storage: StorageConfig {
                staging_dir: "/tmp/audio_processing".to_string(),
            },
            upload: UploadConfig {
                field_name: "files".to_string(),
                max_file_size_mb: 100,
                max_total_size_mb: 500,
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_FFMPEG__BINARY=/usr/local/bin/ffmpeg`: Use a specific ffmpeg build
    /// - `APP_STORAGE__STAGING_DIR=/var/tmp/concat`: Move the staging area
    /// - `PORT=3000`: Special case for deployment platforms
    ///
    /// Sections are separated by a double underscore so that field names
    /// containing a single underscore (`staging_dir`) stay intact.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - The ffmpeg binary name is not empty and the timeout is positive
    /// - A staging directory is configured
    /// - Uploads have a field name and non-zero size limits, the total
    ///   limit being at least the per-file one
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.ffmpeg.binary.trim().is_empty() {
            return Err(anyhow::anyhow!("FFmpeg binary must not be empty"));
        }

        if self.ffmpeg.timeout_secs == 0 {
            return Err(anyhow::anyhow!("FFmpeg timeout must be greater than 0"));
        }

        if self.storage.staging_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Staging directory must not be empty"));
        }

        if self.upload.field_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Upload field name must not be empty"));
        }

        if self.upload.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("Max file size must be greater than 0"));
        }

        if self.upload.max_total_size_mb < self.upload.max_file_size_mb {
            return Err(anyhow::anyhow!(
                "Max total upload size must be at least the max file size"
            ));
        }

        Ok(())  // All validation passed
    }

    /// Timeout applied to every ffmpeg invocation.
    pub fn ffmpeg_timeout(&self) -> Duration {
        Duration::from_secs(self.ffmpeg.timeout_secs)
    }

    /// Per-file upload limit in bytes.
    pub fn max_file_size_bytes(&self) -> usize {
        self.upload.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Limits handed to the multipart reader.
    pub fn intake_limits(&self) -> IntakeLimits {
        IntakeLimits {
            max_file_size: self.max_file_size_bytes(),
            max_total_size: self.upload.max_total_size_mb.saturating_mul(1024 * 1024),
        }
    }
}
