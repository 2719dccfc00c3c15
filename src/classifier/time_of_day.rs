use chrono::{DateTime, Local, Timelike, Utc};

use crate::models::EmotionLabel;
use crate::sensing::Frame;

use super::{Classification, Classifier, ClassifierUnavailable};

const FALLBACK_CONFIDENCE: f32 = 0.6;

/// Fixed hour-range thresholds (local hour, 0-23).
pub fn label_for_hour(hour: u32) -> EmotionLabel {
    match hour {
        0..=5 => EmotionLabel::Tired,
        6..=8 => EmotionLabel::Calm,
        9..=11 => EmotionLabel::Focused,
        12..=13 => EmotionLabel::Happy,
        14..=16 => EmotionLabel::Focused,
        17..=20 => EmotionLabel::Stressed,
        _ => EmotionLabel::Tired,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TimeOfDayClassifier;

impl TimeOfDayClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_at(&self, at: DateTime<Utc>) -> Classification {
        let hour = at.with_timezone(&Local).hour();
        Classification {
            label: label_for_hour(hour),
            confidence: FALLBACK_CONFIDENCE,
        }
    }
}

impl Classifier for TimeOfDayClassifier {
    fn name(&self) -> &'static str {
        "time-of-day"
    }

    fn classify(&self, frame: &Frame) -> Result<Classification, ClassifierUnavailable> {
        Ok(self.classify_at(frame.captured_at))
    }
}
