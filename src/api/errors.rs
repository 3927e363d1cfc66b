use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::DashboardError;

#[derive(Debug)]
pub enum AppError {
    Dashboard(DashboardError),
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Dashboard(DashboardError::Configuration(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Dashboard(DashboardError::Transport(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Dashboard(DashboardError::Remote { .. } | DashboardError::Decode(_)) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::BadRequest(msg) => json!({ "error": msg }),
            AppError::Dashboard(DashboardError::Remote { status, body }) => json!({
                "error": self.to_string(),
                "upstream_status": status,
                "upstream_body": body,
            }),
            AppError::Dashboard(e) => json!({ "error": e.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Dashboard(e) => e.fmt(f),
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
        }
    }
}

impl From<DashboardError> for AppError {
    fn from(e: DashboardError) -> Self {
        Self::Dashboard(e)
    }
}
