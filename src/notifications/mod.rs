//! Outbound callbacks for the HTTP front-end.
//!
//! Each accepted request carries the URL its results are posted to. Events
//! are delivered best-effort: failures are logged, never retried or surfaced
//! to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

mod recording;
mod service;
mod sink;
mod webhook;

pub use recording::{Delivery, RecordingSink};
pub use service::NotificationService;
pub use sink::CallbackSink;
pub use webhook::WebhookSink;

use crate::domain::{IterationView, SessionView};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectUpdate {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CallbackErrorDetails {
    pub message: String,
    /// Identifiers and the underlying error text
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

/// Every event a callback URL can receive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum CallbackEvent {
    /// Next iteration to answer
    #[serde(rename = "questions")]
    Questions(IterationView),

    #[serde(rename = "projectUpdated")]
    ProjectUpdated(ProjectUpdate),

    /// Session finished with its requirements document
    #[serde(rename = "finalResult")]
    FinalResult(SessionView),

    #[serde(rename = "error")]
    Error { error: CallbackErrorDetails },
}

impl CallbackEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CallbackEvent::Questions(_) => "questions",
            CallbackEvent::ProjectUpdated(_) => "projectUpdated",
            CallbackEvent::FinalResult(_) => "finalResult",
            CallbackEvent::Error { .. } => "error",
        }
    }

    pub fn error<I, K, V>(message: impl Into<String>, details: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        CallbackEvent::Error {
            error: CallbackErrorDetails {
                message: message.into(),
                details: details
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.to_string()))
                    .collect(),
            },
        }
    }

    /// The event's `data` member as sent on the wire
    pub fn data(&self) -> serde_json::Result<Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

/// Body posted to a callback URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallbackPayload {
    pub event: String,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub data: Value,
}

impl CallbackPayload {
    pub fn new(event: &CallbackEvent) -> serde_json::Result<Self> {
        Ok(Self {
            event: event.event_type().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            data: event.data()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Session, SessionStatus};

    #[test]
    fn test_error_payload_shape() {
        let event = CallbackEvent::error(
            "failed to submit answer",
            [("session_id", "abc"), ("error", "boom")],
        );
        let payload = CallbackPayload::new(&event).unwrap();
        assert_eq!(payload.event, "error");
        assert_eq!(payload.data["error"]["message"], "failed to submit answer");
        assert_eq!(payload.data["error"]["details"]["session_id"], "abc");
        assert!(payload.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_final_result_carries_session() {
        let mut session = Session::new(SessionStatus::Done);
        session.result = Some("- must export CSV".into());
        let event = CallbackEvent::FinalResult(SessionView::from(&session));

        let data = event.data().unwrap();
        assert_eq!(data["session_status"], "DONE");
        assert_eq!(data["final_result"], "- must export CSV");
        assert_eq!(event.event_type(), "finalResult");
    }
}
