use crate::probe;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /health`: re-run the ffmpeg probe and report the result.
///
/// Always answers 200; the body says whether the service can do its job.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let probe = probe::probe_ffmpeg(state.ffmpeg_binary()).await;

    let mut body = json!({
        "status": if probe.is_ok() { "healthy" } else { "unhealthy" },
        "tool": if probe.is_ok() { "available" } else { "not available" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
    });

    match probe {
        Ok(version) => body["version"] = json!(version),
        Err(err) => {
            tracing::warn!(error = %err, "Health probe failed");
            body["error"] = json!(err.to_string());
        }
    }

    HttpResponse::Ok().json(body)
}

/// `GET /metrics`: request counters and concatenation outcomes.
pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<serde_json::Value> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "client_errors": metrics.client_error_count,
            "server_errors": metrics.server_error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "operations": {
            "active": metrics.active_operations,
            "stream_copy": metrics.operations.stream_copy,
            "reencode": metrics.operations.reencode,
            "failed": metrics.operations.failed
        },
        "endpoints": endpoint_stats
    }))
}
