use rand::Rng;

use crate::models::EmotionLabel;
use crate::sensing::Frame;

use super::{Classification, Classifier, ClassifierUnavailable};

/// Placeholder strategy: picks a uniformly random label.
///
/// This carries no signal at all. It exists so the pipeline can be exercised
/// end to end without a model and must not be mistaken for real detection.
#[derive(Debug, Default)]
pub struct RandomLabelClassifier;

impl RandomLabelClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for RandomLabelClassifier {
    fn name(&self) -> &'static str {
        "random-placeholder"
    }

    fn classify(&self, _frame: &Frame) -> Result<Classification, ClassifierUnavailable> {
        let mut rng = rand::thread_rng();
        let label = EmotionLabel::ALL[rng.gen_range(0..EmotionLabel::ALL.len())];
        Ok(Classification {
            label,
            confidence: rng.gen_range(0.6..0.95),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_stays_in_placeholder_range() {
        let classifier = RandomLabelClassifier::new();
        let frame = Frame::blank(1, 1);
        for _ in 0..200 {
            let result = classifier.classify(&frame).unwrap();
            assert!((0.6..0.95).contains(&result.confidence));
        }
    }
}
