use actix_web::{http::StatusCode, HttpResponse};
use serde_json::json;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug)]
pub struct ServiceError {
    err: anyhow::Error,
    code: u16,
}

impl ServiceError {
    pub fn code(&self) -> u16 {
        self.code
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": self.err.to_string(),
        }))
    }
}

impl<E> From<E> for ServiceError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            err: err.into(),
            code: 500,
        }
    }
}

/// Attaches an HTTP status code to an `anyhow` error, turning it into a
/// `ServiceError` that actix can render.
pub trait AddCode {
    fn code(self, code: u16) -> ServiceError;
}

impl AddCode for anyhow::Error {
    fn code(self, code: u16) -> ServiceError {
        ServiceError { err: self, code }
    }
}
