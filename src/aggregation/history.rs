use std::collections::VecDeque;

use crate::models::DetectionRecord;

pub const RECENT_HISTORY_LIMIT: usize = 10;

/// Bounded FIFO of the latest detections, oldest evicted first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentHistory {
    events: VecDeque<DetectionRecord>,
}

impl RecentHistory {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(RECENT_HISTORY_LIMIT),
        }
    }

    /// Rebuilds from persisted records (oldest first); keeps the newest ten.
    pub fn from_records(records: impl IntoIterator<Item = DetectionRecord>) -> Self {
        let mut history = Self::new();
        for record in records {
            history.push(record);
        }
        history
    }

    pub fn push(&mut self, record: DetectionRecord) {
        self.events.push_back(record);
        while self.events.len() > RECENT_HISTORY_LIMIT {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&DetectionRecord> {
        self.events.back()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<DetectionRecord> {
        self.events.iter().cloned().collect()
    }
}
