//! Error taxonomy for session orchestration.

use std::time::Duration;

use crate::messaging::AgentFailure;
use crate::models::ContextId;

/// Errors surfaced to callers of the session controller.
///
/// `IneligibleContext`, `PermissionDenied` and `InjectionFailed` abort
/// `start()` and are never retried automatically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("context is not eligible for capture: {0}")]
    IneligibleContext(String),

    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("agent unreachable in {context} after injection retry: {reason}")]
    InjectionFailed { context: ContextId, reason: String },

    #[error("command to {context} unacknowledged after {after:?}")]
    DeliveryTimeout { context: ContextId, after: Duration },

    #[error("agent in {context} replied unexpectedly: {detail}")]
    UnexpectedReply { context: ContextId, detail: String },

    #[error("agent in {context} failed: {reason}")]
    AgentFailed { context: ContextId, reason: String },

    #[error("session controller is not running")]
    ControllerUnavailable,
}

impl SessionError {
    /// Maps a failure reported by the agent itself.
    pub fn from_agent_failure(context: ContextId, failure: AgentFailure) -> Self {
        match failure {
            AgentFailure::PermissionDenied(reason) => SessionError::PermissionDenied(reason),
            AgentFailure::CaptureUnavailable(reason) => SessionError::AgentFailed { context, reason },
        }
    }

    /// True when the command may still complete inside the agent after the
    /// caller stopped waiting for it.
    pub fn left_unanswered(&self) -> bool {
        matches!(
            self,
            SessionError::DeliveryTimeout { .. } | SessionError::InjectionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_class_errors_are_left_unanswered() {
        let ctx = ContextId(3);
        assert!(SessionError::DeliveryTimeout {
            context: ctx,
            after: Duration::from_secs(5)
        }
        .left_unanswered());
        assert!(SessionError::InjectionFailed {
            context: ctx,
            reason: "no answer".into()
        }
        .left_unanswered());

        assert!(!SessionError::PermissionDenied("refused".into()).left_unanswered());
        assert!(!SessionError::IneligibleContext("chrome://settings".into()).left_unanswered());
        assert!(!SessionError::ControllerUnavailable.left_unanswered());
    }
}
