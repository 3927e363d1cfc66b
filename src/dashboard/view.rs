use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use super::analytics::{
    confidence_histogram, confidence_percent, summarize, top_labels, ColumnSummary,
    ConfidenceBucket, LabelCount, SoilAlert,
};
use crate::{
    error::DashboardError,
    models::{SensorReading, VisionDetection},
    sensors::{SensorHistory, SensorService},
};

// ---------------------------------------------------------------------------
// Operator controls
// ---------------------------------------------------------------------------

pub const REFRESH_SECS_RANGE: (u64, u64) = (2, 30);
pub const HOURS_RANGE: (u32, u32) = (1, 168);
pub const VISION_LIMIT_RANGE: (usize, usize) = (50, 1000);

/// Raw operator controls as they arrive in the query string or a form.
///
/// Everything is a string so a malformed value falls back to its default
/// instead of rejecting the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewParams {
    pub auto_refresh: Option<String>,
    pub refresh_secs: Option<String>,
    pub hours: Option<String>,
    pub vision_limit: Option<String>,
    pub notice: Option<String>,
    pub notice_kind: Option<String>,
}

/// Controls after defaults and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSettings {
    pub auto_refresh: bool,
    pub refresh_secs: u64,
    pub hours: u32,
    pub vision_limit: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            refresh_secs: 5,
            hours: 24,
            vision_limit: 200,
        }
    }
}

impl ViewParams {
    pub fn settings(&self) -> ViewSettings {
        let d = ViewSettings::default();
        ViewSettings {
            auto_refresh: self
                .auto_refresh
                .as_deref()
                .and_then(parse_toggle)
                .unwrap_or(d.auto_refresh),
            refresh_secs: parse_clamped(self.refresh_secs.as_deref(), REFRESH_SECS_RANGE)
                .unwrap_or(d.refresh_secs),
            hours: parse_clamped(self.hours.as_deref(), HOURS_RANGE).unwrap_or(d.hours),
            vision_limit: parse_clamped(self.vision_limit.as_deref(), VISION_LIMIT_RANGE)
                .unwrap_or(d.vision_limit),
        }
    }

    pub fn notice(&self) -> Option<Notice> {
        let text = self.notice.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        let kind = match self.notice_kind.as_deref() {
            Some("success") => NoticeKind::Success,
            Some("error") => NoticeKind::Error,
            _ => NoticeKind::Info,
        };
        Some(Notice {
            kind,
            text: text.to_owned(),
        })
    }
}

fn parse_toggle(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_clamped<T>(raw: Option<&str>, (lo, hi): (T, T)) -> Option<T>
where
    T: std::str::FromStr + Ord,
{
    raw?.trim().parse::<T>().ok().map(|v| v.clamp(lo, hi))
}

impl ViewSettings {
    /// Link back to the dashboard with these controls and an optional notice.
    pub fn dashboard_url(&self, notice: Option<&Notice>) -> String {
        let mut params = vec![
            ("auto_refresh", if self.auto_refresh { "on" } else { "off" }.to_owned()),
            ("refresh_secs", self.refresh_secs.to_string()),
            ("hours", self.hours.to_string()),
            ("vision_limit", self.vision_limit.to_string()),
        ];
        if let Some(n) = notice {
            params.push(("notice", n.text.clone()));
            params.push(("notice_kind", n.kind.as_str().to_owned()));
        }
        match serde_urlencoded::to_string(&params) {
            Ok(query) => format!("/dashboard?{query}"),
            Err(_) => "/dashboard".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

impl NoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Info => "info",
        }
    }
}

/// One-shot message shown at the top of the page after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Success, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, text: text.into() }
    }
}

// ---------------------------------------------------------------------------
// KPI
// ---------------------------------------------------------------------------

/// Pre-formatted key metrics from the latest reading.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct KpiView {
    pub temperature: String,
    pub humidity: String,
    pub soil: String,
    pub pump: String,
    /// Local time of the reading, `%Y-%m-%d %H:%M:%S`.
    pub last_update: String,
}

impl KpiView {
    pub fn from_reading(r: &SensorReading, offset: FixedOffset) -> Self {
        Self {
            temperature: metric(r.temperature),
            humidity: metric(r.humidity),
            soil: metric(r.soil_moisture),
            pump: r.pump_status.clone().unwrap_or_else(|| MISSING.to_owned()),
            last_update: format_local(r.recorded_at, offset),
        }
    }
}

const MISSING: &str = "--";

fn metric(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_owned())
}

pub fn format_local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string()
}

// ---------------------------------------------------------------------------
// Vision
// ---------------------------------------------------------------------------

pub const VISION_TABLE_ROWS: usize = 200;
pub const RAW_SAMPLES: usize = 10;
pub const TOP_LABELS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VisionRow {
    pub detected_at: String,
    pub label: String,
    pub confidence_pct: Option<f64>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RawSample {
    pub heading: String,
    /// Pretty-printed `raw_json`.
    pub json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VisionSummary {
    pub total: usize,
    pub top_labels: Vec<LabelCount>,
    pub confidence_histogram: Vec<ConfidenceBucket>,
    /// Newest first.
    pub recent: Vec<VisionRow>,
    pub raw_samples: Vec<RawSample>,
}

impl VisionSummary {
    /// `detections` newest first, as `vision_history` returns them.
    pub fn build(detections: &[VisionDetection], offset: FixedOffset) -> Self {
        let label = |d: &VisionDetection| d.label.clone().unwrap_or_else(|| MISSING.to_owned());

        let recent = detections
            .iter()
            .take(VISION_TABLE_ROWS)
            .map(|d| VisionRow {
                detected_at: format_local(d.detected_at, offset),
                label: label(d),
                confidence_pct: d.confidence.map(confidence_percent),
                chat_id: d.chat_id.clone(),
            })
            .collect();

        let raw_samples = detections
            .iter()
            .take(RAW_SAMPLES)
            .map(|d| RawSample {
                heading: format!(
                    "{} | {} | {}",
                    format_local(d.detected_at, offset),
                    label(d),
                    d.confidence
                        .map(|c| format!("{:.1}%", c * 100.0))
                        .unwrap_or_else(|| MISSING.to_owned()),
                ),
                json: serde_json::to_string_pretty(&d.raw_payload)
                    .unwrap_or_else(|_| d.raw_payload.to_string()),
            })
            .collect();

        Self {
            total: detections.len(),
            top_labels: top_labels(detections, TOP_LABELS),
            confidence_histogram: confidence_histogram(detections),
            recent,
            raw_samples,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SensorSummary {
    pub hours: u32,
    /// `true` when the window was empty and the most recent rows were used.
    pub fallback: bool,
    pub columns: Vec<ColumnSummary>,
    pub soil_alert: Option<SoilAlert>,
}

impl SensorSummary {
    pub fn build(hours: u32, history: &SensorHistory, latest: Option<&SensorReading>) -> Self {
        Self {
            hours,
            fallback: history.fallback,
            columns: summarize(&history.readings),
            soil_alert: SoilAlert::for_reading(latest),
        }
    }
}

// ---------------------------------------------------------------------------
// Page model
// ---------------------------------------------------------------------------

pub type Section<T> = Result<T, DashboardError>;

/// Everything one render needs. Each section carries its own error so a
/// failing query only blanks its own part of the page.
#[derive(Debug, Clone)]
pub struct DashboardPage {
    pub settings: ViewSettings,
    pub notice: Option<Notice>,
    pub display_offset: FixedOffset,
    /// `Ok(None)` means the store answered but has no readings yet.
    pub kpi: Section<Option<KpiView>>,
    pub history: Section<SensorHistory>,
    pub summary: Section<SensorSummary>,
    pub vision: Section<VisionSummary>,
}

impl DashboardPage {
    /// Runs the render's queries one after another and assembles the page.
    pub async fn load(sensors: &SensorService, settings: ViewSettings, notice: Option<Notice>) -> Self {
        let offset = sensors.settings().display_offset;

        let latest = sensors.latest_reading().await;
        if let Err(e) = &latest {
            warn!(error = %e, "KPI section unavailable");
        }

        let history = sensors.sensor_history(settings.hours).await;
        if let Err(e) = &history {
            warn!(error = %e, hours = settings.hours, "History section unavailable");
        }

        let vision = sensors.vision_history(settings.vision_limit).await;
        if let Err(e) = &vision {
            warn!(error = %e, limit = settings.vision_limit, "Vision section unavailable");
        }

        let summary = history.as_ref().map_err(Clone::clone).map(|h| {
            let latest = latest.as_ref().ok().and_then(Option::as_ref);
            SensorSummary::build(settings.hours, h, latest)
        });

        Self {
            settings,
            notice,
            display_offset: offset,
            kpi: latest.map(|r| r.map(|r| KpiView::from_reading(&r, offset))),
            history,
            summary,
            vision: vision.map(|v| VisionSummary::build(&v, offset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::DashboardSettings,
        models::RecordId,
        sensors::service::tests::{param, sensor_row, FakeSource},
    };

    fn jakarta() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    #[test]
    fn settings_defaults_and_clamping() {
        assert_eq!(ViewParams::default().settings(), ViewSettings::default());

        let params = ViewParams {
            auto_refresh: Some("off".into()),
            refresh_secs: Some("1".into()),
            hours: Some("1000".into()),
            vision_limit: Some("abc".into()),
            ..ViewParams::default()
        };
        let s = params.settings();
        assert!(!s.auto_refresh);
        assert_eq!(s.refresh_secs, 2);
        assert_eq!(s.hours, 168);
        assert_eq!(s.vision_limit, 200);
    }

    #[test]
    fn dashboard_url_round_trips_settings_and_encodes_notice() {
        let settings = ViewSettings {
            auto_refresh: false,
            refresh_secs: 10,
            hours: 48,
            vision_limit: 500,
        };
        let url = settings.dashboard_url(Some(&Notice::success("Sent: ON & done")));
        assert!(url.starts_with("/dashboard?auto_refresh=off&refresh_secs=10&hours=48&vision_limit=500"));
        assert!(url.contains("notice=Sent%3A+ON+%26+done"));
        assert!(url.contains("notice_kind=success"));
    }

    #[test]
    fn dashboard_url_without_notice_has_only_controls() {
        let url = ViewSettings::default().dashboard_url(None);
        assert_eq!(url, "/dashboard?auto_refresh=on&refresh_secs=5&hours=24&vision_limit=200");

        let url = ViewSettings::default().dashboard_url(Some(&Notice::error("a+b=c")));
        assert!(url.ends_with("notice=a%2Bb%3Dc&notice_kind=error"));
    }

    #[test]
    fn blank_notice_is_ignored() {
        let params = ViewParams {
            notice: Some("  ".into()),
            ..ViewParams::default()
        };
        assert_eq!(params.notice(), None);
    }

    #[test]
    fn kpi_formats_missing_values_and_local_time() {
        let r = SensorReading {
            id: RecordId::Integer(1),
            recorded_at: "2025-03-01T17:30:05Z".parse().unwrap(),
            temperature: Some(28.4),
            humidity: None,
            soil_moisture: Some(25.0),
            pump_status: None,
        };
        let kpi = KpiView::from_reading(&r, jakarta());
        assert_eq!(kpi.temperature, "28.4");
        assert_eq!(kpi.humidity, "--");
        assert_eq!(kpi.soil, "25");
        assert_eq!(kpi.pump, "--");
        assert_eq!(kpi.last_update, "2025-03-02 00:30:05");
    }

    #[test]
    fn vision_summary_limits_raw_samples_and_formats_confidence() {
        let detections: Vec<VisionDetection> = (0..12)
            .map(|i| VisionDetection {
                id: RecordId::Integer(i),
                detected_at: "2025-03-01T10:00:00Z".parse().unwrap(),
                label: Some("healthy".into()),
                confidence: Some(0.912),
                chat_id: Some("42".into()),
                raw_payload: json!({ "n": i }),
            })
            .collect();
        let summary = VisionSummary::build(&detections, jakarta());
        assert_eq!(summary.total, 12);
        assert_eq!(summary.recent.len(), 12);
        assert_eq!(summary.raw_samples.len(), RAW_SAMPLES);
        assert_eq!(summary.recent[0].confidence_pct, Some(91.2));
        assert!(summary.raw_samples[0].heading.ends_with("healthy | 91.2%"));
        assert!(summary.raw_samples[0].json.contains("\"n\": 0"));
    }

    #[tokio::test]
    async fn empty_latest_result_is_no_data_not_error() {
        let source = FakeSource::new(|_| Ok(vec![]));
        let sensors = SensorService::new(source, DashboardSettings::default());
        let page = DashboardPage::load(&sensors, ViewSettings::default(), None).await;
        assert!(matches!(page.kpi, Ok(None)));
    }

    #[tokio::test]
    async fn failing_section_does_not_abort_the_rest() {
        let source = FakeSource::new(|q| {
            if q.table() == "vision_log" {
                Err(DashboardError::Remote {
                    status: 403,
                    body: "permission denied for table vision_log".into(),
                })
            } else {
                Ok(vec![sensor_row(1, "2025-03-01T10:00:00Z", 85.0)])
            }
        });
        let sensors = SensorService::new(source.clone(), DashboardSettings::default());
        let page = DashboardPage::load(&sensors, ViewSettings::default(), None).await;

        assert!(matches!(page.vision, Err(DashboardError::Remote { status: 403, .. })));
        assert_eq!(page.kpi.as_ref().unwrap().as_ref().unwrap().soil, "85");
        let summary = page.summary.as_ref().unwrap();
        assert_eq!(summary.soil_alert, Some(SoilAlert::VeryMoist));

        // latest, window, vision: one query each, issued in that order.
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(param(&calls[0], "limit").as_deref(), Some("1"));
        assert_eq!(calls[2].table(), "vision_log");
    }

    #[tokio::test]
    async fn summary_inherits_history_error() {
        let source = FakeSource::new(|_| Err(DashboardError::transport("timed out")));
        let sensors = SensorService::new(source, DashboardSettings::default());
        let page = DashboardPage::load(&sensors, ViewSettings::default(), None).await;
        assert!(matches!(page.history, Err(DashboardError::Transport(_))));
        assert!(matches!(page.summary, Err(DashboardError::Transport(_))));
    }

    #[tokio::test]
    async fn render_reads_through_shared_cache() {
        let source = FakeSource::new(|_| Ok(vec![sensor_row(1, "2025-03-01T10:00:00Z", 50.0)]));
        let sensors = SensorService::new(source.clone(), DashboardSettings::default());
        DashboardPage::load(&sensors, ViewSettings::default(), None).await;
        DashboardPage::load(&sensors, ViewSettings::default(), None).await;
        assert_eq!(source.call_count(), 3);
    }
}
