//! Pluggable classification strategies.
//!
//! The coordinator never blocks on a real classifier being reachable:
//! [`FallbackClassifier`] answers with the time-of-day table whenever the
//! primary strategy reports [`ClassifierUnavailable`].

mod random;
mod time_of_day;

pub use random::RandomLabelClassifier;
pub use time_of_day::{label_for_hour, TimeOfDayClassifier};

use std::sync::Arc;

use log::debug;

use crate::models::EmotionLabel;
use crate::sensing::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: EmotionLabel,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("classifier unavailable: {0}")]
pub struct ClassifierUnavailable(pub String);

pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn classify(&self, frame: &Frame) -> Result<Classification, ClassifierUnavailable>;
}

/// Primary strategy with a guaranteed time-of-day answer behind it.
pub struct FallbackClassifier {
    primary: Option<Arc<dyn Classifier>>,
    fallback: TimeOfDayClassifier,
}

impl FallbackClassifier {
    pub fn new(primary: Option<Arc<dyn Classifier>>) -> Self {
        Self {
            primary,
            fallback: TimeOfDayClassifier::new(),
        }
    }

    pub fn time_of_day_only() -> Self {
        Self::new(None)
    }

    pub fn classify(&self, frame: &Frame) -> Classification {
        if let Some(primary) = &self.primary {
            match primary.classify(frame) {
                Ok(classification) => return classification,
                Err(err) => debug!("{} failed, using time-of-day fallback: {err}", primary.name()),
            }
        }

        self.fallback.classify_at(frame.captured_at)
    }
}
