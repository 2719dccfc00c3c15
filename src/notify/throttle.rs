use std::time::Duration;

use tokio::time::Instant;

/// Minimum-interval gate for user-facing notifications.
#[derive(Debug, Clone)]
pub struct NotificationThrottle {
    last_fired_at: Option<Instant>,
    min_interval: Duration,
}

impl NotificationThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_fired_at: None,
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    pub fn last_fired_at(&self) -> Option<Instant> {
        self.last_fired_at
    }

    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_fired_at {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }

    /// Claims the gate when open; records `now` as the last firing.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.is_open(now) {
            return false;
        }
        self.last_fired_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_until_interval_elapses() {
        let t0 = Instant::now();
        let mut throttle = NotificationThrottle::new(Duration::from_secs(60));

        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_secs(59)));
        assert!(throttle.try_acquire(t0 + Duration::from_secs(60)));
        assert_eq!(throttle.last_fired_at(), Some(t0 + Duration::from_secs(60)));
    }

    #[test]
    fn rejected_attempts_do_not_move_the_window() {
        let t0 = Instant::now();
        let mut throttle = NotificationThrottle::new(Duration::from_secs(10));
        throttle.try_acquire(t0);
        throttle.try_acquire(t0 + Duration::from_secs(5));

        assert!(throttle.is_open(t0 + Duration::from_secs(10)));
    }
}
