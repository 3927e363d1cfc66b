//! Askama views for the dashboard page.
//!
//! [`DashboardTemplate`] is built from a loaded [`DashboardPage`] and carries
//! pre-formatted strings so the templates under `templates/` stay simple.
//! Charts are inline SVG so the page has no client-side dependencies.

use askama::Template;
use chrono::FixedOffset;

use super::{
    analytics::{ColumnSummary, LabelCount, SoilAlert},
    view::{
        format_local, DashboardPage, KpiView, Notice, NoticeKind, RawSample, Section,
        SensorSummary, ViewSettings, VisionSummary, HOURS_RANGE, REFRESH_SECS_RANGE,
        VISION_LIMIT_RANGE,
    },
};
use crate::{control::PumpCommand, models::SensorReading, sensors::SensorHistory};

const HISTORY_TABLE_ROWS: usize = 200;
const MISSING: &str = "--";

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    /// Meta-refresh target, present only while auto refresh is on.
    pub refresh_url: Option<String>,
    pub refresh_secs: u64,
    pub hours: u32,
    pub controls: ControlsView,
    pub notice: Option<NoticeView>,
    pub kpi: SectionView<KpiView>,
    pub history: SectionView<HistoryView>,
    pub summary: SectionView<SummaryView>,
    pub vision: SectionView<VisionView>,
}

impl DashboardTemplate {
    pub fn from_page(page: &DashboardPage) -> Self {
        let s = &page.settings;
        let offset = page.display_offset;
        Self {
            refresh_url: s.auto_refresh.then(|| s.dashboard_url(None)),
            refresh_secs: s.refresh_secs,
            hours: s.hours,
            controls: ControlsView::new(s),
            notice: page.notice.as_ref().map(NoticeView::from),
            kpi: match &page.kpi {
                Ok(kpi) => SectionView::ok(kpi.clone()),
                Err(e) => SectionView::failed("latest sensor reading", e),
            },
            history: SectionView::from_section("sensor history", &page.history, |h| {
                HistoryView::new(h, offset)
            }),
            summary: SectionView::from_section("summary", &page.summary, SummaryView::new),
            vision: SectionView::from_section("vision log", &page.vision, VisionView::new),
        }
    }
}

/// One page section: an error notice, or data when the store had any.
pub struct SectionView<T> {
    pub error: Option<String>,
    pub data: Option<T>,
}

impl<T> SectionView<T> {
    fn ok(data: Option<T>) -> Self {
        Self { error: None, data }
    }

    fn failed(what: &str, err: &impl std::fmt::Display) -> Self {
        Self {
            error: Some(format!("Failed to load {what}: {err}")),
            data: None,
        }
    }

    fn from_section<S>(what: &str, section: &Section<S>, f: impl FnOnce(&S) -> T) -> Self {
        match section {
            Ok(s) => Self::ok(Some(f(s))),
            Err(e) => Self::failed(what, e),
        }
    }
}

pub struct NoticeView {
    pub kind: &'static str,
    pub text: String,
}

impl From<&Notice> for NoticeView {
    fn from(n: &Notice) -> Self {
        Self {
            kind: n.kind.as_str(),
            text: n.text.clone(),
        }
    }
}

// ── Controls ────────────────────────────────────────────────────

pub struct ControlsView {
    pub auto_refresh: bool,
    pub auto_refresh_value: &'static str,
    pub refresh_secs: u64,
    pub hours: u32,
    pub vision_limit: usize,
    pub refresh_min: u64,
    pub refresh_max: u64,
    pub hours_min: u32,
    pub hours_max: u32,
    pub vision_min: usize,
    pub vision_max: usize,
    pub commands: [PumpCommand; 3],
}

impl ControlsView {
    fn new(s: &ViewSettings) -> Self {
        Self {
            auto_refresh: s.auto_refresh,
            auto_refresh_value: if s.auto_refresh { "on" } else { "off" },
            refresh_secs: s.refresh_secs,
            hours: s.hours,
            vision_limit: s.vision_limit,
            refresh_min: REFRESH_SECS_RANGE.0,
            refresh_max: REFRESH_SECS_RANGE.1,
            hours_min: HOURS_RANGE.0,
            hours_max: HOURS_RANGE.1,
            vision_min: VISION_LIMIT_RANGE.0,
            vision_max: VISION_LIMIT_RANGE.1,
            commands: PumpCommand::ALL,
        }
    }
}

// ── History ─────────────────────────────────────────────────────

pub struct HistoryView {
    /// Row count when the window was empty and the most recent rows are shown.
    pub fallback_count: Option<usize>,
    pub charts: Vec<ChartView>,
    /// Last rows of the window, oldest first.
    pub rows: Vec<HistoryRow>,
}

pub struct HistoryRow {
    pub time: String,
    pub temperature: String,
    pub humidity: String,
    pub soil: String,
    pub pump: String,
}

impl HistoryView {
    fn new(history: &SensorHistory, offset: FixedOffset) -> Self {
        let series = |f: fn(&SensorReading) -> Option<f64>| -> Vec<(i64, f64)> {
            history
                .readings
                .iter()
                .filter_map(|r| f(r).map(|v| (r.recorded_at.timestamp_millis(), v)))
                .collect()
        };
        let charts = if history.readings.is_empty() {
            vec![]
        } else {
            vec![
                ChartView::line("Temperature (°C)", &series(|r| r.temperature)),
                ChartView::line("Humidity (%)", &series(|r| r.humidity)),
                ChartView::line("Soil moisture (%)", &series(|r| r.soil_moisture)),
            ]
        };

        let skip = history.readings.len().saturating_sub(HISTORY_TABLE_ROWS);
        let rows = history
            .readings
            .iter()
            .skip(skip)
            .map(|r| HistoryRow {
                time: format_local(r.recorded_at, offset),
                temperature: cell(r.temperature),
                humidity: cell(r.humidity),
                soil: cell(r.soil_moisture),
                pump: r.pump_status.clone().unwrap_or_else(|| MISSING.to_owned()),
            })
            .collect();

        Self {
            fallback_count: history.fallback.then_some(history.readings.len()),
            charts,
            rows,
        }
    }
}

fn cell(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_owned())
}

// ── Summary ─────────────────────────────────────────────────────

pub struct SummaryView {
    pub rows: Vec<SummaryRow>,
    pub alert: Option<NoticeView>,
}

pub struct SummaryRow {
    pub column: String,
    pub count: usize,
    /// mean, std, min, 25%, 50%, 75%, max
    pub stats: Vec<String>,
}

impl From<&ColumnSummary> for SummaryRow {
    fn from(c: &ColumnSummary) -> Self {
        let stat = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_else(|| MISSING.to_owned());
        Self {
            column: c.column.clone(),
            count: c.count,
            stats: [c.mean, c.std, c.min, c.p25, c.p50, c.p75, c.max]
                .into_iter()
                .map(stat)
                .collect(),
        }
    }
}

impl SummaryView {
    fn new(summary: &SensorSummary) -> Self {
        let alert = summary.soil_alert.map(|alert| NoticeView {
            kind: match alert {
                SoilAlert::Dry => "warning",
                SoilAlert::VeryMoist => NoticeKind::Info.as_str(),
                SoilAlert::Normal => NoticeKind::Success.as_str(),
            },
            text: alert.message().to_owned(),
        });
        Self {
            rows: summary.columns.iter().map(SummaryRow::from).collect(),
            alert,
        }
    }
}

// ── Vision ──────────────────────────────────────────────────────

pub struct VisionView {
    pub total: usize,
    pub labels: Vec<LabelCount>,
    pub bars: Vec<BarView>,
    pub recent: Vec<DetectionRow>,
    pub raw_samples: Vec<RawSample>,
}

pub struct BarView {
    pub from: String,
    pub to: String,
    /// Percent of the tallest bucket.
    pub width: usize,
    pub count: usize,
}

pub struct DetectionRow {
    pub time: String,
    pub label: String,
    pub confidence: String,
    pub chat_id: String,
}

impl VisionView {
    fn new(v: &VisionSummary) -> Self {
        let peak = v.confidence_histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
        Self {
            total: v.total,
            labels: v.top_labels.clone(),
            bars: v
                .confidence_histogram
                .iter()
                .map(|b| BarView {
                    from: format!("{:.1}", b.from),
                    to: format!("{:.1}", b.to),
                    width: b.count * 100 / peak,
                    count: b.count,
                })
                .collect(),
            recent: v
                .recent
                .iter()
                .map(|r| DetectionRow {
                    time: r.detected_at.clone(),
                    label: r.label.clone(),
                    confidence: r
                        .confidence_pct
                        .map(|c| format!("{c:.1}"))
                        .unwrap_or_else(|| MISSING.to_owned()),
                    chat_id: r.chat_id.clone().unwrap_or_else(|| MISSING.to_owned()),
                })
                .collect(),
            raw_samples: v.raw_samples.clone(),
        }
    }
}

// ── Charts ──────────────────────────────────────────────────────

const CHART_W: f64 = 640.0;
const CHART_H: f64 = 160.0;
const CHART_PAD: f64 = 24.0;

/// A polyline over a 640x160 viewBox; `points` is empty when the series is.
pub struct ChartView {
    pub title: &'static str,
    pub points: String,
    pub hi: String,
    pub lo: String,
}

impl ChartView {
    /// `series` is `(unix millis, value)` in ascending time order.
    fn line(title: &'static str, series: &[(i64, f64)]) -> Self {
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Self {
                title,
                points: String::new(),
                hi: String::new(),
                lo: String::new(),
            };
        };

        let (t0, t1) = (first.0, last.0);
        let (mut lo, mut hi) = series
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
        if (hi - lo).abs() < f64::EPSILON {
            lo -= 1.0;
            hi += 1.0;
        }

        let x = |t: i64| {
            if t1 == t0 {
                CHART_W / 2.0
            } else {
                CHART_PAD + (t - t0) as f64 / (t1 - t0) as f64 * (CHART_W - 2.0 * CHART_PAD)
            }
        };
        let y = |v: f64| CHART_H - CHART_PAD - (v - lo) / (hi - lo) * (CHART_H - 2.0 * CHART_PAD);

        Self {
            title,
            points: series
                .iter()
                .map(|&(t, v)| format!("{:.1},{:.1}", x(t), y(v)))
                .collect::<Vec<_>>()
                .join(" "),
            hi: format!("{hi:.1}"),
            lo: format!("{lo:.1}"),
        }
    }
}
