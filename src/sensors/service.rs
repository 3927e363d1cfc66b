use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::DashboardSettings,
    error::Result,
    models::{
        has_usable_timestamp, SensorReading, VisionDetection, SENSOR_LOG_FIELDS,
        SENSOR_LOG_TABLE, VISION_LOG_FIELDS, VISION_LOG_TABLE,
    },
    refresh_cache::RefreshCache,
    supabase::{decode_rows, Direction, FilterOp, RecordSource, SelectQuery},
};

/// Readings for a history window, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct SensorHistory {
    pub readings: Vec<SensorReading>,
    /// `true` when the window was empty and the most recent rows were served
    /// instead.
    pub fallback: bool,
}

/// The three query shapes the dashboard reads, each behind its own cache.
#[derive(Clone)]
pub struct SensorService {
    source: Arc<dyn RecordSource>,
    settings: DashboardSettings,
    latest: RefreshCache<(), Option<SensorReading>>,
    history: RefreshCache<u32, SensorHistory>,
    vision: RefreshCache<usize, Vec<VisionDetection>>,
}

impl SensorService {
    pub fn new(source: Arc<dyn RecordSource>, settings: DashboardSettings) -> Self {
        Self {
            source,
            settings,
            latest: RefreshCache::new(),
            history: RefreshCache::new(),
            vision: RefreshCache::new(),
        }
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    /// Most recent `sensor_log` row, or `None` if the table is empty.
    pub async fn latest_reading(&self) -> Result<Option<SensorReading>> {
        self.latest
            .get_or_fetch((), self.settings.latest_ttl, || async {
                let rows: Vec<SensorReading> = self.select_timeline(&latest_query()).await?;
                Ok(rows.into_iter().next())
            })
            .await
    }

    /// Readings from the trailing `hours` window, oldest first.
    ///
    /// # Empty-window fallback
    ///
    /// If the window holds no rows, the most recent `history_fallback_limit`
    /// rows are returned instead (still oldest first) so a chart is never
    /// empty while the table has data. `SensorHistory::fallback` reports it.
    pub async fn sensor_history(&self, hours: u32) -> Result<SensorHistory> {
        self.history
            .get_or_fetch(hours, self.settings.history_ttl, || async {
                let since = Utc::now() - ChronoDuration::hours(i64::from(hours));
                let readings: Vec<SensorReading> = self
                    .select_timeline(&window_query(since, self.settings.history_limit))
                    .await?;

                if !readings.is_empty() {
                    return Ok(SensorHistory {
                        readings,
                        fallback: false,
                    });
                }

                let limit = self.settings.history_fallback_limit;
                info!(hours, limit, "History window empty; falling back to most recent rows");
                let mut recent: Vec<SensorReading> =
                    self.select_timeline(&fallback_query(limit)).await?;
                recent.reverse();
                Ok(SensorHistory {
                    readings: recent,
                    fallback: true,
                })
            })
            .await
    }

    /// Latest `limit` vision detections, newest first.
    pub async fn vision_history(&self, limit: usize) -> Result<Vec<VisionDetection>> {
        self.vision
            .get_or_fetch(limit, self.settings.vision_ttl, || async {
                self.select_timeline(&vision_query(limit)).await
            })
            .await
    }

    /// Rows whose `created_at` is null or unreadable cannot be placed on the
    /// timeline; they are skipped instead of failing the whole section.
    async fn select_timeline<T: DeserializeOwned>(&self, query: &SelectQuery) -> Result<Vec<T>> {
        let rows = self.source.select(query).await?;
        let total = rows.len();
        let rows: Vec<Value> = rows.into_iter().filter(has_usable_timestamp).collect();
        if rows.len() < total {
            warn!(
                table = query.table(),
                skipped = total - rows.len(),
                "Skipping rows without a usable created_at"
            );
        }
        decode_rows(query.table(), rows)
    }

    /// Drops every cached entry regardless of age. Returns how many were
    /// dropped.
    pub async fn refresh_now(&self) -> usize {
        let dropped =
            self.latest.clear().await + self.history.clear().await + self.vision.clear().await;
        info!(dropped, "Cache cleared on operator request");
        dropped
    }
}

// ---------------------------------------------------------------------------
// Query shapes
// ---------------------------------------------------------------------------

fn latest_query() -> SelectQuery {
    SelectQuery::new(SENSOR_LOG_TABLE)
        .fields(SENSOR_LOG_FIELDS)
        .order("created_at", Direction::Desc)
        .limit(1)
}

fn window_query(since: DateTime<Utc>, limit: usize) -> SelectQuery {
    SelectQuery::new(SENSOR_LOG_TABLE)
        .fields(SENSOR_LOG_FIELDS)
        .filter(
            "created_at",
            FilterOp::Gte,
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .order("created_at", Direction::Asc)
        .limit(limit)
}

fn fallback_query(limit: usize) -> SelectQuery {
    SelectQuery::new(SENSOR_LOG_TABLE)
        .fields(SENSOR_LOG_FIELDS)
        .order("created_at", Direction::Desc)
        .limit(limit)
}

fn vision_query(limit: usize) -> SelectQuery {
    SelectQuery::new(VISION_LOG_TABLE)
        .fields(VISION_LOG_FIELDS)
        .order("created_at", Direction::Desc)
        .limit(limit)
}
