pub mod auth;
pub mod contact;
pub mod dashboard;
pub mod newsletter;
pub mod oauth;
pub mod tracking;

use actix_web::get;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Envelope shared by most endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

#[get("/api/health")]
pub async fn health() -> actix_web::HttpResponse {
    actix_web::HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}
