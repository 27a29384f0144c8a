use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use session_protocol::{FileReference, InlineAttachment};

/// A turn preserved after an authentication failure so it can be
/// resubmitted once the user signs back in.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRetry {
    pub prompt: String,
    pub inline_attachments: Vec<InlineAttachment>,
    pub file_references: Vec<FileReference>,
    pub ready_to_retry: bool,
    pub saved_at: OffsetDateTime,
}

/// Keyed buffer of failed turns awaiting re-authentication.
#[derive(Debug, Default)]
pub struct RetryStore {
    pending: Mutex<HashMap<String, PendingRetry>>,
}

impl RetryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves a failed turn, not yet ready for resubmission. Replaces any
    /// earlier entry for the conversation.
    pub fn save(
        &self,
        conversation_id: &str,
        prompt: String,
        inline_attachments: Vec<InlineAttachment>,
        file_references: Vec<FileReference>,
    ) {
        let mut pending = self.lock();
        pending.insert(
            conversation_id.to_owned(),
            PendingRetry {
                prompt,
                inline_attachments,
                file_references,
                ready_to_retry: false,
                saved_at: OffsetDateTime::now_utc(),
            },
        );
    }

    /// Called by the host after a successful re-authentication. Returns
    /// false when no retry is pending for the conversation.
    pub fn mark_ready(&self, conversation_id: &str) -> bool {
        let mut pending = self.lock();
        match pending.get_mut(conversation_id) {
            Some(retry) => {
                retry.ready_to_retry = true;
                true
            }
            None => false,
        }
    }

    /// Consumes the preserved turn for resubmission. Returns `None`
    /// until [`Self::mark_ready`] has been called.
    pub fn take_ready(&self, conversation_id: &str) -> Option<PendingRetry> {
        let mut pending = self.lock();
        if pending
            .get(conversation_id)
            .is_some_and(|retry| retry.ready_to_retry)
        {
            return pending.remove(conversation_id);
        }
        None
    }

    pub fn discard(&self, conversation_id: &str) {
        self.lock().remove(conversation_id);
    }

    /// Read-only view, for UI affordances and tests.
    pub fn pending(&self, conversation_id: &str) -> Option<PendingRetry> {
        self.lock().get(conversation_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRetry>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
