use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EmotionLabel;

pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60 * 60);
const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Longest window accepted; anything longer is clamped to it.
const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Label counts for one aggregation window.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyBucket {
    window_start: DateTime<Utc>,
    counts: BTreeMap<EmotionLabel, u64>,
    total: u64,
}

impl HourlyBucket {
    pub fn new(window_start: DateTime<Utc>) -> Self {
        Self {
            window_start,
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, label: EmotionLabel) -> u64 {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn record(&mut self, label: EmotionLabel) {
        *self.counts.entry(label).or_insert(0) += 1;
        self.total += 1;
    }

    /// Highest count wins; ties go to the label declared first.
    pub fn dominant(&self) -> Option<(EmotionLabel, u64)> {
        let mut best: Option<(EmotionLabel, u64)> = None;
        for label in EmotionLabel::ALL {
            let count = self.count(label);
            if count == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((label, count)),
            }
        }
        best
    }

    pub fn summarize(&self) -> Option<HourlySummary> {
        let (dominant, count) = self.dominant()?;
        let percentage = (count as f64 / self.total as f64 * 1000.0).round() / 10.0;
        Some(HourlySummary {
            window_start: self.window_start,
            total: self.total,
            dominant,
            percentage,
            breakdown: self.counts.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlySummary {
    pub window_start: DateTime<Utc>,
    pub total: u64,
    pub dominant: EmotionLabel,
    /// Share of the dominant label, one decimal place.
    pub percentage: f64,
    pub breakdown: BTreeMap<EmotionLabel, u64>,
}

/// Rolls one live bucket forward in fixed steps from the session start.
///
/// Rotation is driven by elapsed time since the anchor rather than by a timer
/// surviving suspension: [`HourlyAggregator::catch_up`] performs every rotation
/// that is due and no more.
#[derive(Debug, Clone)]
pub struct HourlyAggregator {
    bucket: HourlyBucket,
    interval: Duration,
    step: TimeDelta,
    rotations: u64,
}

impl HourlyAggregator {
    /// `interval` is clamped to whole milliseconds between 1 ms and
    /// [`MAX_INTERVAL`], so window starts and rotation counts use one step.
    pub fn new(window_start: DateTime<Utc>, interval: Duration) -> Self {
        let millis = interval.clamp(MIN_INTERVAL, MAX_INTERVAL).as_millis() as u64;
        Self {
            bucket: HourlyBucket::new(window_start),
            interval: Duration::from_millis(millis),
            step: TimeDelta::milliseconds(millis as i64),
            rotations: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn bucket(&self) -> &HourlyBucket {
        &self.bucket
    }

    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    pub fn record(&mut self, label: EmotionLabel) {
        self.bucket.record(label);
    }

    /// Closes the live window and opens the next one exactly one interval on.
    ///
    /// An empty window yields no summary but still advances.
    pub fn rotate(&mut self) -> Option<HourlySummary> {
        let summary = self.bucket.summarize();
        self.bucket = HourlyBucket::new(self.bucket.window_start + self.step);
        self.rotations += 1;
        summary
    }

    /// Performs each rotation owed for `elapsed` time since the anchor.
    pub fn catch_up(&mut self, elapsed: Duration) -> Vec<HourlySummary> {
        let due = (elapsed.as_millis() / self.interval.as_millis()) as u64;
        let mut summaries = Vec::new();
        while self.rotations < due {
            if let Some(summary) = self.rotate() {
                summaries.push(summary);
            }
        }
        summaries
    }

    /// Summary of the partial live window, used when a session ends.
    pub fn flush(&self) -> Option<HourlySummary> {
        self.bucket.summarize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn dominant_label_and_percentage() {
        let mut bucket = HourlyBucket::new(start());
        for label in [
            EmotionLabel::Focused,
            EmotionLabel::Focused,
            EmotionLabel::Tired,
            EmotionLabel::Stressed,
            EmotionLabel::Focused,
        ] {
            bucket.record(label);
        }

        let summary = bucket.summarize().unwrap();
        assert_eq!(summary.dominant, EmotionLabel::Focused);
        assert_eq!(summary.percentage, 60.0);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.breakdown[&EmotionLabel::Tired], 1);
        assert_eq!(summary.breakdown.values().sum::<u64>(), summary.total);
    }

    #[test]
    fn ties_go_to_declaration_order() {
        let mut bucket = HourlyBucket::new(start());
        bucket.record(EmotionLabel::Stressed);
        bucket.record(EmotionLabel::Happy);
        bucket.record(EmotionLabel::Stressed);
        bucket.record(EmotionLabel::Happy);

        assert_eq!(bucket.dominant(), Some((EmotionLabel::Happy, 2)));
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        let mut bucket = HourlyBucket::new(start());
        bucket.record(EmotionLabel::Calm);
        bucket.record(EmotionLabel::Neutral);
        bucket.record(EmotionLabel::Tired);

        assert_eq!(bucket.summarize().unwrap().percentage, 33.3);
    }

    #[test]
    fn empty_bucket_has_no_summary() {
        assert!(HourlyBucket::new(start()).summarize().is_none());
    }

    #[test]
    fn rotation_resets_and_advances_one_interval() {
        let mut agg = HourlyAggregator::new(start(), ROTATION_INTERVAL);
        agg.record(EmotionLabel::Calm);

        let summary = agg.rotate().unwrap();
        assert_eq!(summary.window_start, start());
        assert_eq!(agg.bucket().total(), 0);
        assert_eq!(agg.bucket().window_start(), start() + TimeDelta::hours(1));

        assert!(agg.rotate().is_none());
        assert_eq!(agg.bucket().window_start(), start() + TimeDelta::hours(2));
    }

    #[test]
    fn late_tick_catches_up_every_missed_window() {
        let mut agg = HourlyAggregator::new(start(), ROTATION_INTERVAL);
        agg.record(EmotionLabel::Focused);

        assert!(agg.catch_up(Duration::from_secs(59 * 60)).is_empty());
        assert_eq!(agg.rotations(), 0);

        // Suspended for almost three hours, then one late tick.
        let summaries = agg.catch_up(Duration::from_secs(3 * 3600 + 120));
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].window_start, start());
        assert_eq!(agg.rotations(), 3);
        assert_eq!(agg.bucket().window_start(), start() + TimeDelta::hours(3));

        // Repeating the same tick never double-rotates.
        assert!(agg.catch_up(Duration::from_secs(3 * 3600 + 180)).is_empty());
        assert_eq!(agg.rotations(), 3);
    }

    #[test]
    fn out_of_range_intervals_are_clamped_not_replaced() {
        let mut huge = HourlyAggregator::new(start(), Duration::MAX);
        assert_eq!(huge.interval(), MAX_INTERVAL);
        huge.rotate();
        assert_eq!(huge.bucket().window_start(), start() + TimeDelta::days(366));
        assert!(huge.catch_up(MAX_INTERVAL * 2).is_empty());
        assert_eq!(huge.rotations(), 2);
        assert_eq!(huge.bucket().window_start(), start() + TimeDelta::days(732));

        let mut tiny = HourlyAggregator::new(start(), Duration::ZERO);
        assert_eq!(tiny.interval(), Duration::from_millis(1));
        tiny.catch_up(Duration::from_millis(5));
        assert_eq!(tiny.rotations(), 5);
        assert_eq!(tiny.bucket().window_start(), start() + TimeDelta::milliseconds(5));
    }

    #[test]
    fn sub_millisecond_remainders_do_not_skew_window_starts() {
        let mut agg = HourlyAggregator::new(start(), Duration::from_micros(10_500));
        assert_eq!(agg.interval(), Duration::from_millis(10));

        agg.catch_up(Duration::from_millis(30));
        assert_eq!(agg.rotations(), 3);
        assert_eq!(agg.bucket().window_start(), start() + TimeDelta::milliseconds(30));
    }
}
