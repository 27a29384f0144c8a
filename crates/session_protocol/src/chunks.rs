use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Lifecycle status reported for one background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Returns true once the task can no longer change status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One sub-question inside an interactive question chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuestion {
    pub question: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Interactive question surfaced mid-turn. Identity is the tool-use id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionChunk {
    pub tool_use_id: String,
    #[serde(default)]
    pub questions: Vec<SubQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// Session capabilities announced at stream start.
///
/// All three lists must be present for the chunk to count as a complete
/// init; partial payloads are ignored by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
}

impl SessionInitChunk {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tools.is_some() && self.integrations.is_some() && self.skills.is_some()
    }
}

/// Progress notification for one background task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNotificationChunk {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Provider diagnostics attached to an error chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDebugInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Human title/description pair resolved by the error classifier and
/// attached to the forwarded chunk for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub title: String,
    pub description: String,
}

/// Error event emitted by the remote agent process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<ErrorDebugInfo>,
    /// Client-side annotation; never present on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<ErrorNotice>,
}

/// One normalized event from the inbound session stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChunk {
    TurnStart { session_id: Option<String> },
    TurnStepStart,
    InputConstruction,
    TextDelta { text: String },
    QuestionOpen(QuestionChunk),
    QuestionTimeout { tool_use_id: String },
    QuestionAnswered { tool_use_id: String, result: Value },
    CompactionStart,
    CompactionEnd,
    SessionInit(SessionInitChunk),
    TaskNotification(TaskNotificationChunk),
    Error(ErrorChunk),
    Finish { status: Option<String> },
    /// Unrecognized or malformed event retained for passthrough forwarding.
    Unknown { chunk_type: String, payload: Value },
}

impl SessionChunk {
    /// Maps a raw inbound value into a chunk. Total: unknown type tags and
    /// payloads that fail to decode land in [`SessionChunk::Unknown`].
    pub fn from_value(value: Value) -> Self {
        let Some(tag) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Self::Unknown {
                chunk_type: String::new(),
                payload: value,
            };
        };

        match tag.as_str() {
            "turn-start" => Self::TurnStart {
                session_id: string_field(&value, "sessionId"),
            },
            "turn-step-start" => Self::TurnStepStart,
            "input-construction" => Self::InputConstruction,
            "text-delta" => Self::TextDelta {
                text: string_field(&value, "text").unwrap_or_default(),
            },
            "question" => parse_or_unknown(&tag, value, Self::QuestionOpen),
            "timeout" => match string_field(&value, "toolUseId") {
                Some(tool_use_id) => Self::QuestionTimeout { tool_use_id },
                None => Self::Unknown {
                    chunk_type: tag,
                    payload: value,
                },
            },
            "question-answered" => match string_field(&value, "toolUseId") {
                Some(tool_use_id) => Self::QuestionAnswered {
                    tool_use_id,
                    result: value.get("result").cloned().unwrap_or(Value::Null),
                },
                None => Self::Unknown {
                    chunk_type: tag,
                    payload: value,
                },
            },
            "compaction-start" => Self::CompactionStart,
            "compaction-end" => Self::CompactionEnd,
            "session-init" => parse_or_unknown(&tag, value, Self::SessionInit),
            "task-notification" => parse_or_unknown(&tag, value, Self::TaskNotification),
            "error" => parse_or_unknown(&tag, value, Self::Error),
            "finish" => Self::Finish {
                status: string_field(&value, "status"),
            },
            _ => Self::Unknown {
                chunk_type: tag,
                payload: value,
            },
        }
    }

    /// The wire `type` tag for this chunk.
    #[must_use]
    pub fn wire_type(&self) -> &str {
        match self {
            Self::TurnStart { .. } => "turn-start",
            Self::TurnStepStart => "turn-step-start",
            Self::InputConstruction => "input-construction",
            Self::TextDelta { .. } => "text-delta",
            Self::QuestionOpen(_) => "question",
            Self::QuestionTimeout { .. } => "timeout",
            Self::QuestionAnswered { .. } => "question-answered",
            Self::CompactionStart => "compaction-start",
            Self::CompactionEnd => "compaction-end",
            Self::SessionInit(_) => "session-init",
            Self::TaskNotification(_) => "task-notification",
            Self::Error(_) => "error",
            Self::Finish { .. } => "finish",
            Self::Unknown { chunk_type, .. } => chunk_type,
        }
    }

    /// Returns true for chunk types that leave an unanswered pending
    /// question in place. Every other recognized chunk signals that the
    /// agent has moved on.
    #[must_use]
    pub fn preserves_pending_question(&self) -> bool {
        matches!(
            self.wire_type(),
            "question"
                | "timeout"
                | "question-answered"
                | "turn-start"
                | "turn-step-start"
                | "input-construction"
        )
    }

    /// Returns true when this chunk ends the turn from the remote side.
    #[must_use]
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }

    /// Serializes the chunk back to its wire shape. `Unknown` payloads
    /// round-trip verbatim.
    pub fn to_value(&self) -> Value {
        match self {
            Self::TurnStart { session_id } => match session_id {
                Some(id) => json!({ "type": "turn-start", "sessionId": id }),
                None => json!({ "type": "turn-start" }),
            },
            Self::TurnStepStart => json!({ "type": "turn-step-start" }),
            Self::InputConstruction => json!({ "type": "input-construction" }),
            Self::TextDelta { text } => json!({ "type": "text-delta", "text": text }),
            Self::QuestionOpen(payload) => tagged("question", payload),
            Self::QuestionTimeout { tool_use_id } => {
                json!({ "type": "timeout", "toolUseId": tool_use_id })
            }
            Self::QuestionAnswered {
                tool_use_id,
                result,
            } => json!({
                "type": "question-answered",
                "toolUseId": tool_use_id,
                "result": result,
            }),
            Self::CompactionStart => json!({ "type": "compaction-start" }),
            Self::CompactionEnd => json!({ "type": "compaction-end" }),
            Self::SessionInit(payload) => tagged("session-init", payload),
            Self::TaskNotification(payload) => tagged("task-notification", payload),
            Self::Error(payload) => tagged("error", payload),
            Self::Finish { status } => match status {
                Some(status) => json!({ "type": "finish", "status": status }),
                None => json!({ "type": "finish" }),
            },
            Self::Unknown { payload, .. } => payload.clone(),
        }
    }
}

fn tagged<T: Serialize>(tag: &str, payload: &T) -> Value {
    let mut map = match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert("type".to_owned(), Value::String(tag.to_owned()));
    Value::Object(map)
}

fn parse_or_unknown<T, F>(tag: &str, value: Value, wrap: F) -> SessionChunk
where
    T: DeserializeOwned,
    F: FnOnce(T) -> SessionChunk,
{
    match serde_json::from_value::<T>(value.clone()) {
        Ok(payload) => wrap(payload),
        Err(_) => SessionChunk::Unknown {
            chunk_type: tag.to_owned(),
            payload: value,
        },
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
}
