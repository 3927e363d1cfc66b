use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{info, warn};
use utoipa::OpenApi;

use super::{
    dto::{HoursQuery, LatestReadingDto, LimitQuery, PumpAckDto, RefreshDto, SensorHistoryDto},
    errors::AppError,
    AppState,
};
use crate::{
    control::PumpCommand,
    dashboard::{
        analytics::{ColumnSummary, SoilAlert},
        view::{SensorSummary, ViewSettings, HOURS_RANGE, VISION_LIMIT_RANGE},
    },
    models::{RecordId, SensorReading, VisionDetection},
};

fn window_hours(query: &HoursQuery) -> Result<u32, AppError> {
    let hours = query.hours.unwrap_or(ViewSettings::default().hours);
    if !(HOURS_RANGE.0..=HOURS_RANGE.1).contains(&hours) {
        return Err(AppError::BadRequest(format!(
            "hours must be between {} and {}",
            HOURS_RANGE.0, HOURS_RANGE.1
        )));
    }
    Ok(hours)
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Most recent `sensor_log` row and its soil alert.
#[utoipa::path(
    get,
    path = "/api/sensors/latest",
    responses(
        (status = 200, description = "Latest reading, `reading` is null when the table is empty", body = LatestReadingDto),
        (status = 502, description = "Data store rejected the query"),
        (status = 503, description = "Data store not configured"),
        (status = 504, description = "Data store unreachable"),
    ),
    tag = "sensors"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
) -> Result<Json<LatestReadingDto>, AppError> {
    let reading = state.sensors.latest_reading().await?;
    Ok(Json(LatestReadingDto {
        soil_alert: SoilAlert::for_reading(reading.as_ref()),
        reading,
    }))
}

/// Readings from the trailing window, oldest first. Falls back to the most
/// recent rows when the window is empty.
#[utoipa::path(
    get,
    path = "/api/sensors/history",
    params(HoursQuery),
    responses(
        (status = 200, description = "Sensor history", body = SensorHistoryDto),
        (status = 400, description = "hours out of range"),
        (status = 502, description = "Data store rejected the query"),
        (status = 503, description = "Data store not configured"),
        (status = 504, description = "Data store unreachable"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_history(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> Result<Json<SensorHistoryDto>, AppError> {
    let hours = window_hours(&query)?;
    let history = state.sensors.sensor_history(hours).await?;
    Ok(Json(SensorHistoryDto {
        hours,
        fallback: history.fallback,
        readings: history.readings,
    }))
}

/// Descriptive statistics over the window plus the current soil alert.
#[utoipa::path(
    get,
    path = "/api/sensors/summary",
    params(HoursQuery),
    responses(
        (status = 200, description = "Window summary", body = SensorSummary),
        (status = 400, description = "hours out of range"),
        (status = 502, description = "Data store rejected the query"),
        (status = 503, description = "Data store not configured"),
        (status = 504, description = "Data store unreachable"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_summary(
    State(state): State<AppState>,
    Query(query): Query<HoursQuery>,
) -> Result<Json<SensorSummary>, AppError> {
    let hours = window_hours(&query)?;
    let history = state.sensors.sensor_history(hours).await?;
    // The alert is a nice-to-have here; the statistics stand on their own.
    let latest = match state.sensors.latest_reading().await {
        Ok(latest) => latest,
        Err(e) => {
            warn!(error = %e, "Summary served without soil alert");
            None
        }
    };
    Ok(Json(SensorSummary::build(hours, &history, latest.as_ref())))
}

// ---------------------------------------------------------------------------
// Vision
// ---------------------------------------------------------------------------

/// Most recent `vision_log` rows, newest first.
#[utoipa::path(
    get,
    path = "/api/vision",
    params(LimitQuery),
    responses(
        (status = 200, description = "Vision detections", body = Vec<VisionDetection>),
        (status = 400, description = "limit out of range"),
        (status = 502, description = "Data store rejected the query"),
        (status = 503, description = "Data store not configured"),
        (status = 504, description = "Data store unreachable"),
    ),
    tag = "vision"
)]
pub async fn get_vision_log(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<VisionDetection>>, AppError> {
    let limit = query.limit.unwrap_or(ViewSettings::default().vision_limit);
    if !(VISION_LIMIT_RANGE.0..=VISION_LIMIT_RANGE.1).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between {} and {}",
            VISION_LIMIT_RANGE.0, VISION_LIMIT_RANGE.1
        )));
    }
    Ok(Json(state.sensors.vision_history(limit).await?))
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Drop every cached query result so the next read goes to the data store.
#[utoipa::path(
    post,
    path = "/api/refresh",
    responses(
        (status = 200, description = "Cache cleared", body = RefreshDto),
    ),
    tag = "actions"
)]
pub async fn refresh(State(state): State<AppState>) -> Json<RefreshDto> {
    let cleared = state.sensors.refresh_now().await;
    Json(RefreshDto { cleared })
}

/// Publish `ON`, `OFF` or `AUTO` to the pump command topic.
///
/// QoS 0: a 200 means the command left this service, not that the pump
/// acted on it.
#[utoipa::path(
    post,
    path = "/api/pump/{command}",
    params(
        ("command" = String, Path, description = "ON, OFF or AUTO (case-insensitive)"),
    ),
    responses(
        (status = 200, description = "Command published", body = PumpAckDto),
        (status = 400, description = "Unknown command"),
        (status = 503, description = "Broker settings missing"),
        (status = 504, description = "Broker unreachable or refused the session"),
    ),
    tag = "actions"
)]
pub async fn send_pump_command(
    State(state): State<AppState>,
    Path(command): Path<String>,
) -> Result<Json<PumpAckDto>, AppError> {
    let command: PumpCommand = command.parse().map_err(AppError::BadRequest)?;
    state.pump.publish(command).await?;
    info!(command = %command, "Pump command accepted via API");
    Ok(Json(PumpAckDto {
        command,
        delivery_confirmed: false,
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        get_latest_reading,
        get_sensor_history,
        get_sensor_summary,
        get_vision_log,
        refresh,
        send_pump_command,
        health
    ),
    components(schemas(
        LatestReadingDto,
        SensorHistoryDto,
        SensorSummary,
        ColumnSummary,
        SoilAlert,
        SensorReading,
        VisionDetection,
        RecordId,
        RefreshDto,
        PumpAckDto,
        PumpCommand
    )),
    tags(
        (name = "sensors", description = "Sensor log queries"),
        (name = "vision",  description = "Leaf detection log"),
        (name = "actions", description = "Cache refresh and pump commands"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Plant Monitor Dashboard API",
        version = "0.1.0",
        description = "Read-only views over sensor_log and vision_log plus pump control"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
