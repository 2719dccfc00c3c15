//! Caller-facing command surface of the controller.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::models::SensingSession;

use super::controller::{ControllerHandle, StatusReport, StopReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControllerRequest {
    StartSession,
    StopSession,
    TestNotification,
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ControllerResponse {
    Started { session: SensingSession },
    Stopped { report: StopReport },
    NotificationShown,
    Status { status: StatusReport },
}

/// `{success, error?, ...}` as sent back to a UI caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub response: Option<ControllerResponse>,
}

impl From<Result<ControllerResponse, SessionError>> for CommandOutcome {
    fn from(result: Result<ControllerResponse, SessionError>) -> Self {
        match result {
            Ok(response) => Self {
                success: true,
                error: None,
                response: Some(response),
            },
            Err(err) => Self {
                success: false,
                error: Some(err.to_string()),
                response: None,
            },
        }
    }
}

pub async fn dispatch(
    controller: &ControllerHandle,
    request: ControllerRequest,
) -> Result<ControllerResponse, SessionError> {
    match request {
        ControllerRequest::StartSession => controller
            .start()
            .await
            .map(|session| ControllerResponse::Started { session }),
        ControllerRequest::StopSession => controller
            .stop()
            .await
            .map(|report| ControllerResponse::Stopped { report }),
        ControllerRequest::TestNotification => controller
            .test_notification()
            .await
            .map(|()| ControllerResponse::NotificationShown),
        ControllerRequest::GetStatus => controller
            .status()
            .await
            .map(|status| ControllerResponse::Status { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextId;

    #[test]
    fn requests_parse_from_action_tags() {
        let parsed: ControllerRequest =
            serde_json::from_str(r#"{ "action": "testNotification" }"#).unwrap();
        assert_eq!(parsed, ControllerRequest::TestNotification);

        let unknown = serde_json::from_str::<ControllerRequest>(r#"{ "action": "reboot" }"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn failures_serialize_without_a_payload() {
        let outcome = CommandOutcome::from(Err(SessionError::IneligibleContext(
            "chrome://settings".into(),
        )));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("chrome://settings"));
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn success_flattens_the_response() {
        let mut session = SensingSession::new();
        session.begin_start(ContextId(4));
        let outcome = CommandOutcome::from(Ok(ControllerResponse::Started { session }));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["kind"], "started");
        assert_eq!(json["session"]["state"], "starting");
        assert_eq!(json["session"]["contextId"], 4);
    }
}
