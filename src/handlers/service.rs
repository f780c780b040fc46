use actix_web::HttpResponse;
use serde_json::json;

/// `GET /`: what this service is and how to call it.
pub async fn service_info() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Audio Concatenation Service",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoint": "/fullAudio",
        "method": "POST",
        "description": "Send two or more audio files as multipart form data; they are joined in the order received"
    }))
}
