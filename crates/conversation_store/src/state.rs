use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use time::OffsetDateTime;

use session_protocol::{QuestionChunk, SubQuestion, TaskStatus};

/// Interactive question awaiting (or having outlived) a user answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuestion {
    pub tool_use_id: String,
    pub questions: Vec<SubQuestion>,
    pub timeout_seconds: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl PendingQuestion {
    pub fn from_chunk(chunk: &QuestionChunk) -> Self {
        Self {
            tool_use_id: chunk.tool_use_id.clone(),
            questions: chunk.questions.clone(),
            timeout_seconds: chunk.timeout_seconds,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}

/// One asynchronous shell/background job spawned by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    pub task_id: String,
    pub handle_id: Option<String>,
    pub status: TaskStatus,
    pub summary: String,
    pub command: Option<String>,
    pub output_file: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Tool/integration/skill capabilities announced by a session-init
/// chunk. Replaced wholesale on each complete init.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub tools: Vec<String>,
    pub integrations: Vec<String>,
    pub skills: Vec<String>,
}

/// Mutable state for one conversation. Created on first reference.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConversationState {
    pub pending_question: Option<PendingQuestion>,
    pub expired_question: Option<PendingQuestion>,
    pub compacting: bool,
    pub background_tasks: Vec<BackgroundTask>,
    pub session_metadata: Option<SessionMetadata>,
    pub answered_results: HashMap<String, Value>,
}

/// Read-only copy of a conversation's state handed to the UI layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub pending_question: Option<PendingQuestion>,
    pub expired_question: Option<PendingQuestion>,
    pub compacting: bool,
    pub background_tasks: Vec<BackgroundTask>,
    pub session_metadata: Option<SessionMetadata>,
    pub answered_results: HashMap<String, Value>,
}

impl ConversationState {
    pub(crate) fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            pending_question: self.pending_question.clone(),
            expired_question: self.expired_question.clone(),
            compacting: self.compacting,
            background_tasks: self.background_tasks.clone(),
            session_metadata: self.session_metadata.clone(),
            answered_results: self.answered_results.clone(),
        }
    }
}
