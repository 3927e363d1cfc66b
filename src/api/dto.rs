use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    control::PumpCommand,
    dashboard::analytics::SoilAlert,
    models::SensorReading,
};

/// Response for `GET /api/sensors/latest`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LatestReadingDto {
    /// `null` when `sensor_log` has no rows yet.
    pub reading: Option<SensorReading>,
    pub soil_alert: Option<SoilAlert>,
}

/// Response for `GET /api/sensors/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorHistoryDto {
    pub hours: u32,
    /// `true` when the window was empty and the most recent rows were returned.
    pub fallback: bool,
    /// Oldest first.
    pub readings: Vec<SensorReading>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshDto {
    /// Cache entries dropped.
    pub cleared: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PumpAckDto {
    pub command: PumpCommand,
    /// Always `false`: commands are published at QoS 0 and never confirmed.
    pub delivery_confirmed: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HoursQuery {
    /// Trailing window in hours, 1 to 168. Defaults to 24.
    pub hours: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    /// Rows to return, 50 to 1000. Defaults to 200.
    pub limit: Option<usize>,
}
