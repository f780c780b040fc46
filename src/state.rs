//! # Application State Management
//!
//! This module holds everything request handlers share. Almost all of it is
//! read-only after startup; only the metrics counters change while serving.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets every actix worker hold the same data without copying it
//! - **Thread safety**: Safe to share between threads
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time
//! - **Why needed**: Every request updates the metrics, `/metrics` reads them
//!
//! ## What is deliberately not shared:
//! Concatenation operations have no shared state at all. Each request owns
//! its own [`crate::staging::Operation`], so there is nothing to lock between
//! concurrent uploads.

use crate::concat::{ConcatStrategy, Concatenator};
use crate::config::AppConfig;
use crate::staging::StagingArea;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// The application state shared across all HTTP request handlers.
///
/// ## Thread Safety Pattern:
/// - `config`, `staging` and `concatenator` never change after startup, so a
///   plain `Arc` (or a cheap clone) is enough
/// - `metrics` uses `Arc<RwLock<T>>` because every request updates it
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, fixed for the lifetime of the process
    pub config: Arc<AppConfig>,

    /// Staging root where operations write their files
    pub staging: StagingArea,

    /// ffmpeg runner built from the configuration
    pub concatenator: Concatenator,

    /// Request and operation counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Responses with a 4xx status
    pub client_error_count: u64,

    /// Responses with a 5xx status (or requests that failed before producing one)
    pub server_error_count: u64,

    /// Concatenations currently running
    pub active_operations: u32,

    /// Outcomes of finished concatenations
    pub operations: OperationMetrics,

    /// Detailed metrics for each API endpoint
    /// Key: route pattern (e.g., "POST /fullAudio")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// How concatenations ended.
#[derive(Debug, Default, Clone)]
pub struct OperationMetrics {
    /// Finished with a lossless stream copy
    pub stream_copy: u64,
    /// Needed the re-encode fallback
    pub reencode: u64,
    /// Rejected or failed after the upload was accepted
    pub failed: u64,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of 4xx and 5xx responses for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create the shared state from a validated configuration and a prepared staging root.
    pub fn new(config: AppConfig, staging: StagingArea) -> Self {
        let concatenator = Concatenator::new(&config.ffmpeg.binary, config.ffmpeg_timeout());
        Self {
            config: Arc::new(config),
            staging,
            concatenator,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Path of the ffmpeg binary probed by `/health`.
    pub fn ffmpeg_binary(&self) -> &Path {
        self.concatenator.binary()
    }

    fn with_metrics<R>(&self, update: impl FnOnce(&mut AppMetrics) -> R) -> R {
        update_metrics(&self.metrics, update)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.with_metrics(|m| m.request_count += 1);
    }

    /// Record the outcome of a finished request.
    ///
    /// ## Parameters:
    /// - **endpoint**: Method and route pattern (e.g., "POST /fullAudio")
    /// - **duration_ms**: How long the handler took
    /// - **status**: Response status, `None` when the request failed without one
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, status: Option<u16>) {
        let client_error = matches!(status, Some(400..=499));
        let server_error = matches!(status, None | Some(500..=599));

        self.with_metrics(|metrics| {
            if client_error {
                metrics.client_error_count += 1;
            }
            if server_error {
                metrics.server_error_count += 1;
            }

            let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
            endpoint_metric.request_count += 1;
            endpoint_metric.total_duration_ms += duration_ms;
            if client_error || server_error {
                endpoint_metric.error_count += 1;
            }
        });
    }

    /// Mark a concatenation as started.
    ///
    /// The operation counts as active until the returned tracker is finished
    /// or dropped. Dropping it unfinished (the client went away and actix
    /// cancelled the handler) records a failure.
    pub fn begin_operation(&self) -> OperationTracker {
        self.with_metrics(|m| m.active_operations += 1);
        OperationTracker {
            metrics: Arc::clone(&self.metrics),
            finished: false,
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Cloning releases the lock before the response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// One running concatenation, as seen by the metrics.
#[must_use = "dropping the tracker records the operation as failed"]
#[derive(Debug)]
pub struct OperationTracker {
    metrics: Arc<RwLock<AppMetrics>>,
    finished: bool,
}

impl OperationTracker {
    /// Record the outcome: `Some(strategy)` on success, `None` on failure.
    pub fn finish(mut self, outcome: Option<ConcatStrategy>) {
        self.record(outcome);
    }

    fn record(&mut self, outcome: Option<ConcatStrategy>) {
        if self.finished {
            return;
        }
        self.finished = true;
        update_metrics(&self.metrics, |metrics| {
            metrics.active_operations = metrics.active_operations.saturating_sub(1);
            match outcome {
                Some(ConcatStrategy::StreamCopy) => metrics.operations.stream_copy += 1,
                Some(ConcatStrategy::Reencode) => metrics.operations.reencode += 1,
                None => metrics.operations.failed += 1,
            }
        });
    }
}

impl Drop for OperationTracker {
    fn drop(&mut self) {
        self.record(None);
    }
}

fn update_metrics<R>(metrics: &RwLock<AppMetrics>, update: impl FnOnce(&mut AppMetrics) -> R) -> R {
    // A panic while holding the lock cannot leave the counters inconsistent
    let mut metrics = metrics.write().unwrap_or_else(PoisonError::into_inner);
    update(&mut metrics)
}

impl AppMetrics {
    /// Share of requests that ended in a 4xx or 5xx.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            (self.client_error_count + self.server_error_count) as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Error rate for this endpoint (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::prepare(dir.path()).unwrap();
        (dir, AppState::new(AppConfig::default(), staging))
    }

    #[test]
    fn test_endpoint_metrics_split_errors() {
        let (_dir, state) = state();
        for status in [Some(200), Some(400), Some(500), None] {
            state.increment_request_count();
            state.record_endpoint_request("POST /fullAudio", 10, status);
        }

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 4);
        assert_eq!(metrics.client_error_count, 1);
        assert_eq!(metrics.server_error_count, 2);
        assert!((metrics.error_rate() - 0.75).abs() < f64::EPSILON);

        let endpoint = &metrics.endpoint_metrics["POST /fullAudio"];
        assert_eq!(endpoint.request_count, 4);
        assert_eq!(endpoint.error_count, 3);
        assert!((endpoint.average_duration_ms() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_operation_outcomes() {
        let (_dir, state) = state();
        let copy = state.begin_operation();
        let reencode = state.begin_operation();
        let failed = state.begin_operation();
        assert_eq!(state.get_metrics_snapshot().active_operations, 3);

        copy.finish(Some(ConcatStrategy::StreamCopy));
        reencode.finish(Some(ConcatStrategy::Reencode));
        failed.finish(None);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_operations, 0);
        assert_eq!(metrics.operations.stream_copy, 1);
        assert_eq!(metrics.operations.reencode, 1);
        assert_eq!(metrics.operations.failed, 1);
    }

    #[test]
    fn test_dropped_tracker_counts_as_failed() {
        let (_dir, state) = state();
        let tracker = state.begin_operation();
        drop(tracker);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_operations, 0);
        assert_eq!(metrics.operations.failed, 1);
    }

    #[test]
    fn test_finished_tracker_records_once() {
        let (_dir, state) = state();
        state.begin_operation().finish(Some(ConcatStrategy::StreamCopy));

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_operations, 0);
        assert_eq!(metrics.operations.stream_copy, 1);
        assert_eq!(metrics.operations.failed, 0);
    }

    #[test]
    fn test_concatenator_uses_configured_binary() {
        let (_dir, state) = state();
        assert_eq!(state.ffmpeg_binary(), Path::new("ffmpeg"));
    }
}
