//! Per-user conversation state and its version migrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::NavigationError;

pub const CURRENT_VERSION: u32 = 2;

/// Destructive action waiting for the user's confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingConfirmation {
    #[default]
    None,
    Cancel,
    Finish,
}

/// Where a chat user is in their session.
///
/// Only ids are kept here; everything else is re-read from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub version: u32,
    #[serde(default)]
    pub session_id: Option<Uuid>,

    #[serde(default)]
    pub current_iteration_id: Option<Uuid>,
    #[serde(default)]
    pub current_question_id: Option<Uuid>,
    #[serde(default)]
    pub previous_question_id: Option<Uuid>,
    /// Questions left behind by "back", most recent last
    #[serde(default)]
    pub next_question_ids: Vec<Uuid>,

    // Skipped-question replay
    #[serde(default)]
    pub answering_skipped: bool,
    #[serde(default)]
    pub total_skipped_questions: usize,
    /// 1-based position shown to the user
    #[serde(default)]
    pub current_skipped_question_number: usize,
    #[serde(default)]
    pub current_skipped_question_index: usize,
    #[serde(default)]
    pub skipped_question_ids: Vec<Uuid>,

    #[serde(default)]
    pub draft_message_count: usize,
    #[serde(default)]
    pub pending_confirmation: PendingConfirmation,

    #[serde(default)]
    pub is_processing: bool,
    #[serde(default)]
    pub processing_started: Option<DateTime<Utc>>,

    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub project_list_page: usize,
    #[serde(default)]
    pub project_name: Option<String>,

    #[serde(default)]
    pub last_message_id: Option<i64>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            session_id: None,
            current_iteration_id: None,
            current_question_id: None,
            previous_question_id: None,
            next_question_ids: Vec::new(),
            answering_skipped: false,
            total_skipped_questions: 0,
            current_skipped_question_number: 0,
            current_skipped_question_index: 0,
            skipped_question_ids: Vec::new(),
            draft_message_count: 0,
            pending_confirmation: PendingConfirmation::None,
            is_processing: false,
            processing_started: None,
            project_id: None,
            project_list_page: 0,
            project_name: None,
            last_message_id: None,
        }
    }
}

impl ConversationState {
    pub fn for_session(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }

    pub fn reset_replay(&mut self) {
        self.answering_skipped = false;
        self.total_skipped_questions = 0;
        self.current_skipped_question_number = 0;
        self.current_skipped_question_index = 0;
        self.skipped_question_ids.clear();
    }

    /// Forget the question history, as when a new flow starts
    pub fn reset_history(&mut self) {
        self.previous_question_id = None;
        self.next_question_ids.clear();
    }

    /// Move to `question_id`, remembering the question being left
    pub fn step_to(&mut self, question_id: Uuid) {
        self.previous_question_id = self.current_question_id;
        self.current_question_id = Some(question_id);
    }
}

const ID_FIELDS: [&str; 5] = [
    "session_id",
    "current_iteration_id",
    "current_question_id",
    "previous_question_id",
    "project_id",
];

/// Decode a stored state blob, upgrading older versions in place.
///
/// v0 blobs carry no version tag and are otherwise v1. v1 used empty strings
/// for unset ids, a zero timestamp for an idle guard, and a free-form
/// confirmation string.
pub fn migrate(blob: Value) -> Result<ConversationState, NavigationError> {
    let Value::Object(mut fields) = blob else {
        return Err(NavigationError::CorruptState(
            "state is not an object".to_string(),
        ));
    };

    let version = match fields.get("version") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| NavigationError::CorruptState(format!("bad version: {v}")))?,
    };
    if version > CURRENT_VERSION {
        return Err(NavigationError::UnsupportedVersion(version));
    }

    if version < 1 {
        fields.insert("version".to_string(), Value::from(1));
    }
    if version < 2 {
        upgrade_v1(&mut fields);
    }

    let mut state: ConversationState = serde_json::from_value(Value::Object(fields))
        .map_err(|e| NavigationError::CorruptState(e.to_string()))?;

    // A replay with nothing to replay is over
    if state.answering_skipped && state.total_skipped_questions == 0 {
        state.reset_replay();
    }
    Ok(state)
}

fn upgrade_v1(fields: &mut Map<String, Value>) {
    fields.remove("current_question_index");
    fields.remove("project_list_offset");

    for key in ID_FIELDS {
        if fields.get(key).and_then(Value::as_str) == Some("") {
            fields.insert(key.to_string(), Value::Null);
        }
    }
    if let Some(Value::Array(ids)) = fields.get_mut("next_question_ids") {
        ids.retain(|id| id.as_str() != Some(""));
    }

    let pending = match fields.get("pending_confirmation").and_then(Value::as_str) {
        Some("cancel") => "cancel",
        Some("finish") => "finish",
        _ => "none",
    };
    fields.insert("pending_confirmation".to_string(), Value::from(pending));

    let idle_guard = match fields.get("processing_started") {
        Some(Value::String(ts)) => ts.is_empty() || ts.starts_with("0001-01-01"),
        _ => false,
    };
    if idle_guard {
        fields.insert("processing_started".to_string(), Value::Null);
    }

    let project_name_empty = fields.get("project_name").and_then(Value::as_str) == Some("");
    if project_name_empty {
        fields.insert("project_name".to_string(), Value::Null);
    }
    if fields.get("last_message_id").and_then(Value::as_i64) == Some(0) {
        fields.insert("last_message_id".to_string(), Value::Null);
    }

    fields.insert("version".to_string(), Value::from(CURRENT_VERSION));
}
