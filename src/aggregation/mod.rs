mod bucket;
mod history;

pub use bucket::{HourlyAggregator, HourlyBucket, HourlySummary, ROTATION_INTERVAL};
pub use history::{RecentHistory, RECENT_HISTORY_LIMIT};
