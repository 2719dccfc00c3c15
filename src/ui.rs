//! One-way broadcasts to whatever UI is listening.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::aggregation::HourlySummary;
use crate::models::{DetectionRecord, SessionState};

const UI_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UiMessage {
    /// Oldest first, at most ten.
    UpdateRecentEvents { events: Vec<DetectionRecord> },
    EventDetected { event: DetectionRecord },
    SessionStateChanged { state: SessionState },
    #[serde(rename = "hourlySummary")]
    SummaryReady { summary: HourlySummary },
}

#[derive(Clone)]
pub struct UiBroadcaster {
    tx: broadcast::Sender<UiMessage>,
}

impl UiBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(UI_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiMessage> {
        self.tx.subscribe()
    }

    /// Nobody listening is fine; the message is dropped.
    pub fn publish(&self, message: UiMessage) {
        let _ = self.tx.send(message);
    }
}

impl Default for UiBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let ui = UiBroadcaster::new();
        ui.publish(UiMessage::SessionStateChanged {
            state: SessionState::Active,
        });
    }

    #[tokio::test]
    async fn subscribers_see_action_tags() {
        let ui = UiBroadcaster::new();
        let mut rx = ui.subscribe();
        ui.publish(UiMessage::UpdateRecentEvents { events: Vec::new() });

        let message = rx.recv().await.unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["action"], "updateRecentEvents");
        assert_eq!(json["events"], serde_json::json!([]));
    }
}
