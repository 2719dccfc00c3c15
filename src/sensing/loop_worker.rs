use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::browser::PageSurface;
use crate::classifier::FallbackClassifier;
use crate::messaging::{AgentEvent, MessageBus};
use crate::models::{ContextId, DetectionEvent, DetectionRecord};

use super::capture::{CaptureError, CaptureGuard};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_error, log_info, log_warn};

pub const DETECTION_INTERVAL: Duration = Duration::from_secs(2);
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);
pub const HOURLY_WINDOW: Duration = Duration::from_secs(60 * 60);
/// Floor for the tick period; a zero period would panic the loop.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Agent-side counters exposed through the status query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionTally {
    pub last: Option<DetectionRecord>,
    pub total: u64,
    pub hourly: u64,
    window_index: u64,
}

impl DetectionTally {
    /// `elapsed` is measured from loop start; the hourly count restarts each
    /// time it crosses into a new `window`.
    pub fn record(&mut self, record: DetectionRecord, elapsed: Duration, window: Duration) {
        let window_ms = window.as_millis().max(1);
        let index = (elapsed.as_millis() / window_ms) as u64;
        if index != self.window_index {
            self.window_index = index;
            self.hourly = 0;
        }
        self.hourly += 1;
        self.total += 1;
        self.last = Some(record);
    }
}

/// Everything one detection loop needs; moved into the loop task.
pub struct DetectionJob {
    pub context: ContextId,
    pub capture: CaptureGuard,
    pub classifier: Arc<FallbackClassifier>,
    pub bus: MessageBus,
    pub surface: PageSurface,
    pub tally: watch::Sender<DetectionTally>,
    pub interval: Duration,
    pub capture_timeout: Duration,
    pub hourly_window: Duration,
}

/// Runs until cancelled or until the capture stream ends.
///
/// Returns the capture guard when it is still held so the caller releases it
/// only after the loop has exited.
pub async fn detection_loop(
    mut job: DetectionJob,
    cancel_token: CancellationToken,
) -> Option<CaptureGuard> {
    let mut ticker = tokio::time::interval(job.interval.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let capture_timeout = job.capture_timeout;
    let started = Instant::now();

    log_info!("detection loop started in {}", job.context);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("detection loop shutting down in {}", job.context);
                return Some(job.capture);
            }
            _ = ticker.tick() => {
                let fut = perform_detection(&mut job, started);

                match tokio::time::timeout(capture_timeout, fut).await {
                    Ok(Ok(())) => {}
                    Ok(Err(CaptureError::Ended)) => {
                        log_warn!("capture stream ended in {}, stopping loop", job.context);
                        let context = job.context;
                        job.capture.release();
                        job.surface.remove_overlay();
                        job.bus.emit_event(AgentEvent::CaptureLost {
                            context,
                            reason: "capture stream ended".into(),
                        });
                        return None;
                    }
                    Ok(Err(err)) => log_error!("detection failed in {}: {err}", job.context),
                    Err(_) => log_warn!(
                        "capture timeout (> {}ms) in {}",
                        capture_timeout.as_millis(),
                        job.context
                    ),
                }
            }
        }
    }
}

async fn perform_detection(job: &mut DetectionJob, started: Instant) -> Result<(), CaptureError> {
    let frame = job.capture.grab_frame().await?;
    let classification = job.classifier.classify(&frame);

    let event = DetectionEvent::new(
        classification.label,
        classification.confidence,
        frame.captured_at,
        job.context,
    );

    let record = event.to_record();
    let elapsed = started.elapsed();
    let window = job.hourly_window;
    job.tally
        .send_modify(|tally| tally.record(record, elapsed, window));
    job.surface.update_overlay(event.label());

    // Fire-and-forget: a dropped event is not retried.
    job.bus.emit_event(AgentEvent::Detection(event));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmotionLabel;
    use chrono::Utc;

    fn record(label: EmotionLabel) -> DetectionRecord {
        DetectionRecord {
            emotion: label,
            confidence: 0.8,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn hourly_count_restarts_on_new_window() {
        let mut tally = DetectionTally::default();
        let hour = Duration::from_secs(3600);

        tally.record(record(EmotionLabel::Calm), Duration::from_secs(10), hour);
        tally.record(record(EmotionLabel::Calm), Duration::from_secs(20), hour);
        assert_eq!(tally.hourly, 2);

        tally.record(record(EmotionLabel::Tired), Duration::from_secs(3601), hour);
        assert_eq!(tally.hourly, 1);
        assert_eq!(tally.total, 3);
        assert_eq!(tally.last.as_ref().map(|r| r.emotion), Some(EmotionLabel::Tired));
    }
}
