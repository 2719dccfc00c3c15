use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ContextId;

/// Emotion labels a classifier can produce.
///
/// Declaration order matters: it is the tie-break order when two labels share
/// the highest count in an hourly window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Focused,
    Happy,
    Calm,
    Neutral,
    Tired,
    Stressed,
    Distracted,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Focused,
        EmotionLabel::Happy,
        EmotionLabel::Calm,
        EmotionLabel::Neutral,
        EmotionLabel::Tired,
        EmotionLabel::Stressed,
        EmotionLabel::Distracted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Focused => "focused",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Tired => "tired",
            EmotionLabel::Stressed => "stressed",
            EmotionLabel::Distracted => "distracted",
        }
    }
}

/// A single classification produced by a capture agent.
///
/// Immutable once built; the controller consumes it exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    label: EmotionLabel,
    confidence: f32,
    timestamp: DateTime<Utc>,
    source_context: ContextId,
}

impl DetectionEvent {
    pub fn new(
        label: EmotionLabel,
        confidence: f32,
        timestamp: DateTime<Utc>,
        source_context: ContextId,
    ) -> Self {
        Self {
            label,
            confidence: clamp_confidence(confidence),
            timestamp,
            source_context,
        }
    }

    pub fn label(&self) -> EmotionLabel {
        self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_context(&self) -> ContextId {
        self.source_context
    }

    /// Wire shape shared with the UI, the settings store and status replies.
    pub fn to_record(&self) -> DetectionRecord {
        DetectionRecord {
            emotion: self.label,
            confidence: self.confidence,
            timestamp: self.timestamp,
        }
    }
}

/// `{emotion, confidence, timestamp}` with an ISO8601 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub emotion: EmotionLabel,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
