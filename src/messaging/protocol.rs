//! Message shapes exchanged between the controller and capture agents.
//!
//! Two shapes exist: commands (controller -> agent, answered through a
//! oneshot) and events (agent -> controller, fire-and-forget). Every payload is
//! owned; nothing is shared between contexts.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::models::{ContextId, DetectionEvent, DetectionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentCommand {
    StartSession,
    StopSession,
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AgentReply {
    Started,
    Stopped,
    Status(AgentStatus),
}

/// Pull-style status an agent reports about its detection loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub is_detecting: bool,
    pub last_detection: Option<DetectionRecord>,
    pub total_detections: u64,
    pub hourly_count: u64,
}

/// Failure reported by the agent in answer to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum AgentFailure {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Detection(DetectionEvent),
    /// The capture resource ended underneath a running loop.
    CaptureLost { context: ContextId, reason: String },
}

/// A command in flight together with the slot its answer goes into.
#[derive(Debug)]
pub struct CommandEnvelope {
    pub command: AgentCommand,
    pub reply: oneshot::Sender<Result<AgentReply, AgentFailure>>,
}
