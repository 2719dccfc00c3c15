use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::ContextId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    /// Transient, only observed while teardown is in flight.
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// The controller's single sensing session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensingSession {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub context_id: Option<ContextId>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Monotonic anchor captured at activation; rotation is computed from it.
    #[serde(skip)]
    pub running_anchor: Option<Instant>,
}

impl SensingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Starting. Clears any previous session data.
    pub fn begin_start(&mut self, context_id: ContextId) {
        let last_error = self.last_error.take();
        *self = Self {
            state: SessionState::Starting,
            context_id: Some(context_id),
            last_error,
            ..Self::default()
        };
    }

    /// Starting -> Active.
    pub fn activate(&mut self, session_id: String, started_at: DateTime<Utc>, anchor: Instant) {
        self.state = SessionState::Active;
        self.session_id = Some(session_id);
        self.started_at = Some(started_at);
        self.running_anchor = Some(anchor);
        self.last_error = None;
    }

    pub fn begin_stop(&mut self) {
        self.state = SessionState::Stopping;
    }

    /// Back to Idle, keeping only the reason the session ended (if any).
    pub fn reset(&mut self, last_error: Option<String>) {
        *self = Self {
            last_error,
            ..Self::default()
        };
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Time since activation, measured on the monotonic clock.
    pub fn elapsed(&self) -> Duration {
        self.running_anchor
            .map(|anchor| anchor.elapsed())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_activate_then_reset() {
        let mut session = SensingSession::new();
        assert!(session.state.is_idle());

        session.begin_start(ContextId(3));
        assert_eq!(session.state, SessionState::Starting);
        assert_eq!(session.context_id, Some(ContextId(3)));

        session.activate("abc".into(), Utc::now(), Instant::now());
        assert!(session.is_active());
        assert!(session.started_at.is_some());

        session.begin_stop();
        assert_eq!(session.state, SessionState::Stopping);

        session.reset(None);
        assert!(session.state.is_idle());
        assert!(session.context_id.is_none());
        assert!(session.session_id.is_none());
        assert_eq!(session.elapsed(), Duration::ZERO);
    }

    #[test]
    fn failed_start_keeps_only_the_error() {
        let mut session = SensingSession::new();
        session.begin_start(ContextId(9));
        session.reset(Some("permission denied".into()));

        assert!(session.state.is_idle());
        assert!(session.context_id.is_none());
        assert_eq!(session.last_error.as_deref(), Some("permission denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_follows_the_anchor() {
        let mut session = SensingSession::new();
        session.begin_start(ContextId(1));
        session.activate("s".into(), Utc::now(), Instant::now());

        tokio::time::advance(Duration::from_secs(90)).await;

        assert_eq!(session.elapsed(), Duration::from_secs(90));
    }
}
