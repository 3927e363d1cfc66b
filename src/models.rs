use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Record ids
//
// `id` columns are bigint on the tables we read, but a uuid primary key is
// just as common on Supabase projects. Accept either.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RecordId {
    Integer(i64),
    Text(String),
}

// ---------------------------------------------------------------------------
// sensor_log
// ---------------------------------------------------------------------------

/// One row of `sensor_log`, written by the field device.
///
/// Numeric columns are decoded leniently: a JSON number or a numeric string
/// is accepted, anything else becomes `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorReading {
    pub id: RecordId,
    #[serde(rename = "created_at", deserialize_with = "lenient_timestamp")]
    pub recorded_at: DateTime<Utc>,
    /// Degrees Celsius
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temperature: Option<f64>,
    /// Relative humidity percentage
    #[serde(default, deserialize_with = "lenient_f64")]
    pub humidity: Option<f64>,
    /// Soil moisture percentage
    #[serde(rename = "soil", default, deserialize_with = "lenient_f64")]
    pub soil_moisture: Option<f64>,
    /// As reported by the device, e.g. `"ON"` / `"OFF"`.
    #[serde(default, deserialize_with = "lenient_text")]
    pub pump_status: Option<String>,
}

/// Columns requested for every `sensor_log` query.
pub const SENSOR_LOG_TABLE: &str = "sensor_log";
pub const SENSOR_LOG_FIELDS: &str = "id,created_at,temperature,humidity,soil,pump_status";

// ---------------------------------------------------------------------------
// vision_log
// ---------------------------------------------------------------------------

/// One leaf-detection result from the vision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisionDetection {
    pub id: RecordId,
    #[serde(rename = "created_at", deserialize_with = "lenient_timestamp")]
    pub detected_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: Option<String>,
    /// 0.0 – 1.0
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    /// Chat the source image came from.
    #[serde(default, deserialize_with = "lenient_text")]
    pub chat_id: Option<String>,
    #[serde(rename = "raw_json", default)]
    #[schema(value_type = Object)]
    pub raw_payload: Value,
}

pub const VISION_LOG_TABLE: &str = "vision_log";
pub const VISION_LOG_FIELDS: &str = "id,created_at,label,confidence,chat_id,raw_json";

// ---------------------------------------------------------------------------
// Lenient column decoding
// ---------------------------------------------------------------------------

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(coerce_f64))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(coerce_text))
}

/// `created_at` must be present. Offset-less values are taken as UTC.
fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    raw.as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| D::Error::custom(format!("unusable created_at: {raw:?}")))
}

/// RFC 3339, Postgres-style `+00` offsets, or a naive date-time read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Whether a raw row carries a `created_at` that [`parse_timestamp`] accepts.
pub(crate) fn has_usable_timestamp(row: &Value) -> bool {
    row.get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .is_some()
}

/// Numbers and numeric strings; NaN and infinities are treated as missing.
pub(crate) fn coerce_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    f.is_finite().then_some(f)
}

pub(crate) fn coerce_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
