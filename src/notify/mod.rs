mod throttle;

pub use throttle::NotificationThrottle;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::{DetectionEvent, EmotionLabel};

pub const DEFAULT_NOTIFICATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

const NOTIFICATION_TITLE: &str = "MoodSense";
const TEST_MESSAGE: &str = "Notifications are working.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub label: Option<EmotionLabel>,
    pub is_test: bool,
}

pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log; the default when no desktop sink exists.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn show(&self, notification: &Notification) -> Result<()> {
        info!("[notification] {}: {}", notification.title, notification.message);
        Ok(())
    }
}

/// Labels with a dedicated message; everything else gets the default text.
fn mapped_message(label: EmotionLabel) -> Option<&'static str> {
    match label {
        EmotionLabel::Focused => Some("You're in the zone. Keep it up!"),
        EmotionLabel::Happy => Some("Good mood detected. Nice!"),
        EmotionLabel::Tired => Some("You look tired. Consider a short break."),
        EmotionLabel::Stressed => Some("Feeling stressed? Take a deep breath."),
        EmotionLabel::Distracted => Some("Attention drifting. Try refocusing on one task."),
        EmotionLabel::Calm | EmotionLabel::Neutral => None,
    }
}

pub fn message_for(label: EmotionLabel) -> String {
    mapped_message(label)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Current mood: {}", label.as_str()))
}

/// Turns detections into throttled notifications.
pub struct Notifier {
    throttle: NotificationThrottle,
    sink: Arc<dyn NotificationSink>,
    enabled: bool,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, min_interval: Duration, enabled: bool) -> Self {
        Self {
            throttle: NotificationThrottle::new(min_interval),
            sink,
            enabled,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.throttle.set_min_interval(min_interval);
    }

    pub fn throttle(&self) -> &NotificationThrottle {
        &self.throttle
    }

    /// Returns true when a notification was emitted.
    pub fn on_detection(&mut self, event: &DetectionEvent, now: Instant) -> bool {
        if !self.enabled || !self.throttle.try_acquire(now) {
            return false;
        }

        let label = event.label();
        self.emit(Notification {
            title: NOTIFICATION_TITLE.to_string(),
            message: message_for(label),
            label: Some(label),
            is_test: false,
        });
        true
    }

    /// Always emits; neither consults nor moves the throttle.
    pub fn test_notification(&self) {
        self.emit(Notification {
            title: NOTIFICATION_TITLE.to_string(),
            message: TEST_MESSAGE.to_string(),
            label: None,
            is_test: true,
        });
    }

    fn emit(&self, notification: Notification) {
        if let Err(err) = self.sink.show(&notification) {
            warn!("failed to show notification: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextId;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl NotificationSink for Recorder {
        fn show(&self, notification: &Notification) -> Result<()> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn event(label: EmotionLabel) -> DetectionEvent {
        DetectionEvent::new(label, 0.8, Utc::now(), ContextId(1))
    }

    #[test]
    fn events_inside_the_interval_yield_one_notification() {
        let sink = Arc::new(Recorder::default());
        let mut notifier = Notifier::new(sink.clone(), Duration::from_secs(300), true);
        let t0 = Instant::now();

        assert!(notifier.on_detection(&event(EmotionLabel::Tired), t0));
        assert!(!notifier.on_detection(&event(EmotionLabel::Tired), t0 + Duration::from_secs(299)));

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn events_spaced_by_the_interval_yield_two() {
        let sink = Arc::new(Recorder::default());
        let mut notifier = Notifier::new(sink.clone(), Duration::from_secs(300), true);
        let t0 = Instant::now();

        notifier.on_detection(&event(EmotionLabel::Stressed), t0);
        notifier.on_detection(&event(EmotionLabel::Focused), t0 + Duration::from_secs(300));

        let shown = sink.0.lock().unwrap();
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].message, message_for(EmotionLabel::Focused));
    }

    #[test]
    fn test_notification_ignores_the_throttle() {
        let sink = Arc::new(Recorder::default());
        let mut notifier = Notifier::new(sink.clone(), Duration::from_secs(300), true);
        let t0 = Instant::now();
        notifier.on_detection(&event(EmotionLabel::Happy), t0);

        notifier.test_notification();
        notifier.test_notification();

        let shown = sink.0.lock().unwrap();
        assert_eq!(shown.len(), 3);
        assert!(shown[1].is_test && shown[2].is_test);
        assert_eq!(notifier.throttle().last_fired_at(), Some(t0));
    }

    #[test]
    fn disabled_notifier_stays_quiet_for_events() {
        let sink = Arc::new(Recorder::default());
        let mut notifier = Notifier::new(sink.clone(), Duration::ZERO, false);

        assert!(!notifier.on_detection(&event(EmotionLabel::Tired), Instant::now()));
        notifier.test_notification();

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn unmapped_labels_get_default_text() {
        assert_eq!(message_for(EmotionLabel::Calm), "Current mood: calm");
        assert_ne!(message_for(EmotionLabel::Tired), "Current mood: tired");
    }
}
