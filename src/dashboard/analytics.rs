use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{SensorReading, VisionDetection};

// ---------------------------------------------------------------------------
// Summary statistics
// ---------------------------------------------------------------------------

/// Descriptive statistics for one sensor column. Missing values are skipped.
///
/// `std` is the sample standard deviation and is `None` below two values;
/// quantiles are linearly interpolated.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

pub fn describe(column: &str, values: impl IntoIterator<Item = f64>) -> ColumnSummary {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = (count > 0).then(|| sorted.iter().sum::<f64>() / count as f64);
    let std = mean.filter(|_| count > 1).map(|m| {
        let ss: f64 = sorted.iter().map(|v| (v - m).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    });

    ColumnSummary {
        column: column.to_owned(),
        count,
        mean,
        std,
        min: sorted.first().copied(),
        p25: quantile(&sorted, 0.25),
        p50: quantile(&sorted, 0.50),
        p75: quantile(&sorted, 0.75),
        max: sorted.last().copied(),
    }
}

/// `sorted` must be ascending.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Temperature, humidity and soil summaries over a history window.
pub fn summarize(readings: &[SensorReading]) -> Vec<ColumnSummary> {
    vec![
        describe("temperature", readings.iter().filter_map(|r| r.temperature)),
        describe("humidity", readings.iter().filter_map(|r| r.humidity)),
        describe("soil", readings.iter().filter_map(|r| r.soil_moisture)),
    ]
}

// ---------------------------------------------------------------------------
// Soil alert
// ---------------------------------------------------------------------------

pub const SOIL_DRY_BELOW: f64 = 30.0;
pub const SOIL_VERY_MOIST_ABOVE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SoilAlert {
    Dry,
    Normal,
    VeryMoist,
}

impl SoilAlert {
    /// `< 30` dry, `> 80` very moist, anything else normal.
    pub fn classify(soil: f64) -> Self {
        if soil < SOIL_DRY_BELOW {
            SoilAlert::Dry
        } else if soil > SOIL_VERY_MOIST_ABOVE {
            SoilAlert::VeryMoist
        } else {
            SoilAlert::Normal
        }
    }

    /// No alert when there is no reading or it carries no soil value.
    pub fn for_reading(reading: Option<&SensorReading>) -> Option<Self> {
        reading.and_then(|r| r.soil_moisture).map(Self::classify)
    }

    pub fn message(self) -> &'static str {
        match self {
            SoilAlert::Dry => "Soil is drying out (soil < 30%).",
            SoilAlert::Normal => "Soil moisture is normal.",
            SoilAlert::VeryMoist => "Soil is very moist (soil > 80%).",
        }
    }
}

// ---------------------------------------------------------------------------
// Vision aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Most frequent labels, ties broken alphabetically. Rows without a label
/// are not counted.
pub fn top_labels(detections: &[VisionDetection], n: usize) -> Vec<LabelCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in detections.iter().filter_map(|d| d.label.as_deref()) {
        *counts.entry(label).or_default() += 1;
    }
    let mut labels: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_owned(),
            count,
        })
        .collect();
    labels.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    labels.truncate(n);
    labels
}

/// Confidence as a percentage rounded to one decimal.
pub fn confidence_percent(confidence: f64) -> f64 {
    (confidence * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConfidenceBucket {
    /// Inclusive lower bound, 0.0 – 0.9.
    pub from: f64,
    pub to: f64,
    pub count: usize,
}

/// Ten equal-width buckets over 0–1. A confidence of exactly 1.0 lands in the
/// last bucket; values outside 0–1 are clamped.
pub fn confidence_histogram(detections: &[VisionDetection]) -> Vec<ConfidenceBucket> {
    let mut counts = [0usize; 10];
    for c in detections.iter().filter_map(|d| d.confidence) {
        let idx = ((c.clamp(0.0, 1.0) * 10.0).floor() as usize).min(9);
        counts[idx] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| ConfidenceBucket {
            from: i as f64 / 10.0,
            to: (i + 1) as f64 / 10.0,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::RecordId;

    fn reading(soil: Option<f64>) -> SensorReading {
        SensorReading {
            id: RecordId::Integer(1),
            recorded_at: "2025-03-01T10:00:00Z".parse().unwrap(),
            temperature: Some(27.0),
            humidity: Some(60.0),
            soil_moisture: soil,
            pump_status: Some("OFF".into()),
        }
    }

    fn detection(label: Option<&str>, confidence: Option<f64>) -> VisionDetection {
        VisionDetection {
            id: RecordId::Integer(1),
            detected_at: "2025-03-01T10:00:00Z".parse().unwrap(),
            label: label.map(str::to_owned),
            confidence,
            chat_id: None,
            raw_payload: json!({}),
        }
    }

    #[test]
    fn soil_25_is_dry() {
        assert_eq!(SoilAlert::classify(25.0), SoilAlert::Dry);
    }

    #[test]
    fn soil_85_is_very_moist() {
        assert_eq!(SoilAlert::classify(85.0), SoilAlert::VeryMoist);
    }

    #[test]
    fn soil_50_is_normal() {
        assert_eq!(SoilAlert::classify(50.0), SoilAlert::Normal);
    }

    #[test]
    fn soil_thresholds_are_exclusive() {
        assert_eq!(SoilAlert::classify(30.0), SoilAlert::Normal);
        assert_eq!(SoilAlert::classify(80.0), SoilAlert::Normal);
    }

    #[test]
    fn no_alert_without_soil_value() {
        assert_eq!(SoilAlert::for_reading(None), None);
        assert_eq!(SoilAlert::for_reading(Some(&reading(None))), None);
        assert_eq!(
            SoilAlert::for_reading(Some(&reading(Some(12.0)))),
            Some(SoilAlert::Dry)
        );
    }

    #[test]
    fn describe_matches_hand_computed_values() {
        let s = describe("soil", [4.0, 1.0, 3.0, 2.0]);
        assert_eq!(s.count, 4);
        assert_eq!(s.mean, Some(2.5));
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(4.0));
        assert_eq!(s.p25, Some(1.75));
        assert_eq!(s.p50, Some(2.5));
        assert_eq!(s.p75, Some(3.25));
        // sample variance = 5 / 3
        let std = s.std.unwrap();
        assert!((std - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn describe_single_value_has_no_std() {
        let s = describe("temperature", [21.5]);
        assert_eq!(s.count, 1);
        assert_eq!(s.std, None);
        assert_eq!(s.p50, Some(21.5));
    }

    #[test]
    fn describe_empty_column() {
        let s = describe("humidity", std::iter::empty());
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, None);
        assert_eq!(s.max, None);
    }

    #[test]
    fn summarize_skips_missing_values_per_column() {
        let readings = vec![reading(Some(40.0)), reading(None), reading(Some(60.0))];
        let summary = summarize(&readings);
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].column, "temperature");
        assert_eq!(summary[0].count, 3);
        assert_eq!(summary[2].column, "soil");
        assert_eq!(summary[2].count, 2);
        assert_eq!(summary[2].mean, Some(50.0));
    }

    #[test]
    fn top_labels_sorted_by_count_then_label() {
        let detections = vec![
            detection(Some("rust"), None),
            detection(Some("healthy"), None),
            detection(Some("rust"), None),
            detection(Some("blight"), None),
            detection(None, None),
        ];
        let top = top_labels(&detections, 10);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0], LabelCount { label: "rust".into(), count: 2 });
        assert_eq!(top[1].label, "blight");
        assert_eq!(top[2].label, "healthy");
        assert!(top.iter().all(|l| l.label != "unknown"));
    }

    #[test]
    fn confidence_percent_rounds_to_one_decimal() {
        assert_eq!(confidence_percent(0.8767), 87.7);
        assert_eq!(confidence_percent(1.0), 100.0);
    }

    #[test]
    fn confidence_histogram_buckets() {
        let detections = vec![
            detection(None, Some(0.05)),
            detection(None, Some(0.95)),
            detection(None, Some(1.0)),
            detection(None, None),
        ];
        let hist = confidence_histogram(&detections);
        assert_eq!(hist.len(), 10);
        assert_eq!(hist[0].count, 1);
        assert_eq!(hist[9].count, 2);
        assert_eq!(hist.iter().map(|b| b.count).sum::<usize>(), 3);
    }
}
