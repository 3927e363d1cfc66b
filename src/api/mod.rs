pub mod dto;
pub mod errors;
pub mod handlers;
pub mod pages;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{control::PumpControl, sensors::SensorService};
use handlers::ApiDoc;

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub sensors: SensorService,
    pub pump: Arc<dyn PumpControl>,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api/sensors/latest", get(handlers::get_latest_reading))
        .route("/api/sensors/history", get(handlers::get_sensor_history))
        .route("/api/sensors/summary", get(handlers::get_sensor_summary))
        .route("/api/vision", get(handlers::get_vision_log))
        .route("/api/refresh", post(handlers::refresh))
        .route("/api/pump/{command}", post(handlers::send_pump_command))
        .route("/", get(pages::index))
        .route("/dashboard", get(pages::dashboard))
        .route("/dashboard/refresh", post(pages::refresh))
        .route("/dashboard/pump", post(pages::pump))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
