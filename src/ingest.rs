//! Best-effort upload of detections to the remote insights API.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::models::{DetectionEvent, EmotionLabel};

const INGEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `POST {emotion, confidence}` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRecord {
    pub emotion: EmotionLabel,
    pub confidence: f32,
}

impl From<&DetectionEvent> for IngestRecord {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            emotion: event.label(),
            confidence: event.confidence(),
        }
    }
}

#[async_trait]
pub trait InsightsIngest: Send + Sync {
    async fn submit(&self, record: &IngestRecord) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpIngest {
    http: Client,
    endpoint: String,
}

impl HttpIngest {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(INGEST_TIMEOUT)
            .build()
            .context("failed to build ingest HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl InsightsIngest for HttpIngest {
    async fn submit(&self, record: &IngestRecord) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .with_context(|| format!("ingest request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("ingest rejected with status {status}"));
        }
        Ok(())
    }
}

/// Used when no endpoint is configured.
#[derive(Debug, Default)]
pub struct DisabledIngest;

#[async_trait]
impl InsightsIngest for DisabledIngest {
    async fn submit(&self, _record: &IngestRecord) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextId;
    use chrono::Utc;

    #[test]
    fn body_carries_only_emotion_and_confidence() {
        let event = DetectionEvent::new(EmotionLabel::Stressed, 0.5, Utc::now(), ContextId(2));
        let body = serde_json::to_value(IngestRecord::from(&event)).unwrap();
        assert_eq!(body, serde_json::json!({ "emotion": "stressed", "confidence": 0.5 }));
    }
}
