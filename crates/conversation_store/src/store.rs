use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use time::OffsetDateTime;

use session_protocol::{SessionInitChunk, TaskNotificationChunk, TaskStatus};

use crate::state::{
    BackgroundTask, ConversationSnapshot, ConversationState, PendingQuestion, SessionMetadata,
};

/// Keyed store of per-conversation ephemeral session state.
///
/// Conversations are independent; a single mutex over the map is enough
/// because every mutation is a short, non-blocking update driven by one
/// sequential dispatcher per conversation.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<String, ConversationState>>,
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only copy of a conversation's current state. Unreferenced
    /// conversations snapshot as empty rather than erroring.
    pub fn snapshot(&self, conversation_id: &str) -> ConversationSnapshot {
        let conversations = self.lock();
        conversations
            .get(conversation_id)
            .map(ConversationState::snapshot)
            .unwrap_or_default()
    }

    /// Installs a new pending question, unconditionally replacing any
    /// prior pending one and clearing a stale expired question.
    pub fn open_question(&self, conversation_id: &str, question: PendingQuestion) {
        let mut conversations = self.lock();
        let state = entry(&mut conversations, conversation_id);
        state.expired_question = None;
        state.pending_question = Some(question);
    }

    /// Moves the pending question to expired, but only while the given
    /// id is still the pending one. Late timeout chunks racing a newer
    /// question are ignored. Returns whether the transition happened.
    pub fn expire_question(&self, conversation_id: &str, tool_use_id: &str) -> bool {
        let mut conversations = self.lock();
        let state = entry(&mut conversations, conversation_id);
        let matches = state
            .pending_question
            .as_ref()
            .is_some_and(|pending| pending.tool_use_id == tool_use_id);
        if !matches {
            return false;
        }

        state.expired_question = state.pending_question.take();
        true
    }

    /// Records an answered-question result. Does not clear the pending
    /// question; that happens when the agent visibly moves on.
    pub fn record_answer(&self, conversation_id: &str, tool_use_id: &str, result: Value) {
        let mut conversations = self.lock();
        let state = entry(&mut conversations, conversation_id);
        state
            .answered_results
            .insert(tool_use_id.to_owned(), result);
    }

    pub fn clear_pending_question(&self, conversation_id: &str) {
        let mut conversations = self.lock();
        entry(&mut conversations, conversation_id).pending_question = None;
    }

    /// Explicit user dismissal of an expired question, or the start of a
    /// new user turn.
    pub fn dismiss_expired_question(&self, conversation_id: &str) {
        let mut conversations = self.lock();
        entry(&mut conversations, conversation_id).expired_question = None;
    }

    /// Idempotent in both directions.
    pub fn set_compacting(&self, conversation_id: &str, compacting: bool) {
        let mut conversations = self.lock();
        entry(&mut conversations, conversation_id).compacting = compacting;
    }

    /// Terminal-path variant of [`Self::set_compacting`]: compaction-end
    /// may never arrive on abnormal termination.
    pub fn clear_compacting(&self, conversation_id: &str) {
        self.set_compacting(conversation_id, false);
    }

    /// Replaces session metadata wholesale from a complete init chunk.
    /// Partial init chunks are ignored rather than producing a partially
    /// overwritten value.
    pub fn apply_session_init(&self, conversation_id: &str, init: &SessionInitChunk) {
        let (Some(tools), Some(integrations), Some(skills)) =
            (&init.tools, &init.integrations, &init.skills)
        else {
            tracing::debug!(conversation_id, "ignoring partial session-init chunk");
            return;
        };

        let metadata = SessionMetadata {
            tools: tools.clone(),
            integrations: integrations.clone(),
            skills: skills.clone(),
        };
        let mut conversations = self.lock();
        entry(&mut conversations, conversation_id).session_metadata = Some(metadata);
    }

    /// Appends a new running task or updates an existing one in place.
    /// Status transitions are one-way: a terminal task never reverts.
    pub fn apply_task_notification(
        &self,
        conversation_id: &str,
        notification: &TaskNotificationChunk,
    ) {
        let mut conversations = self.lock();
        let state = entry(&mut conversations, conversation_id);

        let existing = state
            .background_tasks
            .iter_mut()
            .find(|task| task.task_id == notification.task_id);

        match existing {
            None => {
                if notification.status != TaskStatus::Running {
                    tracing::warn!(
                        task_id = %notification.task_id,
                        status = notification.status.as_str(),
                        "ignoring notification for unknown task"
                    );
                    return;
                }

                state.background_tasks.push(BackgroundTask {
                    task_id: notification.task_id.clone(),
                    handle_id: notification.handle_id.clone(),
                    status: TaskStatus::Running,
                    summary: notification.summary.clone().unwrap_or_default(),
                    command: notification.command.clone(),
                    output_file: notification.output_file.clone(),
                    started_at: OffsetDateTime::now_utc(),
                    completed_at: None,
                });
            }
            Some(task) => {
                if task.status.is_terminal() && notification.status != task.status {
                    tracing::warn!(
                        task_id = %task.task_id,
                        from = task.status.as_str(),
                        to = notification.status.as_str(),
                        "ignoring status reversal for finished task"
                    );
                    return;
                }

                if task.status == TaskStatus::Running && notification.status.is_terminal() {
                    task.status = notification.status;
                    task.completed_at = Some(OffsetDateTime::now_utc());
                }
                if let Some(summary) = &notification.summary {
                    task.summary = summary.clone();
                }
                if notification.handle_id.is_some() {
                    task.handle_id = notification.handle_id.clone();
                }
                if notification.output_file.is_some() {
                    task.output_file = notification.output_file.clone();
                }
            }
        }
    }

    /// User-initiated clear of tasks that are no longer running.
    pub fn clear_finished_tasks(&self, conversation_id: &str) {
        let mut conversations = self.lock();
        entry(&mut conversations, conversation_id)
            .background_tasks
            .retain(|task| task.status == TaskStatus::Running);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConversationState>> {
        lock_unpoisoned(&self.conversations)
    }
}

fn entry<'a>(
    conversations: &'a mut HashMap<String, ConversationState>,
    conversation_id: &str,
) -> &'a mut ConversationState {
    conversations
        .entry(conversation_id.to_owned())
        .or_default()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
