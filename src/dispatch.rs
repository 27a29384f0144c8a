//! Per-chunk state reconciliation.
//!
//! [`apply_chunk`] is the pure state-transition half of dispatch: it
//! mutates the conversation store and reports the side effects the
//! caller should trigger, without performing any of them itself. The
//! lifecycle controller invokes it sequentially, one chunk at a time,
//! in arrival order.

use std::panic::{catch_unwind, AssertUnwindSafe};

use conversation_store::{ConversationStore, PendingQuestion};
use session_protocol::SessionChunk;

/// Side effects requested by a chunk's state transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchEffects {
    /// Label for a best-effort user-attention signal.
    pub attention_label: Option<String>,
}

/// Applies exactly one chunk's mutation to the store.
///
/// Mutation failures must never abort an otherwise-healthy turn: the
/// transition runs under `catch_unwind`, and a panic discards that
/// chunk's mutation only.
pub fn apply_chunk(
    store: &ConversationStore,
    conversation_id: &str,
    chunk: &SessionChunk,
) -> DispatchEffects {
    let applied = catch_unwind(AssertUnwindSafe(|| {
        apply_transition(store, conversation_id, chunk)
    }));

    match applied {
        Ok(effects) => effects,
        Err(_) => {
            tracing::warn!(
                conversation_id,
                chunk_type = chunk.wire_type(),
                "discarding state mutation for chunk after panic"
            );
            DispatchEffects::default()
        }
    }
}

fn apply_transition(
    store: &ConversationStore,
    conversation_id: &str,
    chunk: &SessionChunk,
) -> DispatchEffects {
    let mut effects = DispatchEffects::default();

    match chunk {
        SessionChunk::QuestionOpen(question) => {
            store.open_question(conversation_id, PendingQuestion::from_chunk(question));
            effects.attention_label = Some(attention_label(question));
        }
        SessionChunk::QuestionTimeout { tool_use_id } => {
            store.expire_question(conversation_id, tool_use_id);
        }
        SessionChunk::QuestionAnswered {
            tool_use_id,
            result,
        } => {
            store.record_answer(conversation_id, tool_use_id, result.clone());
        }
        SessionChunk::CompactionStart => store.set_compacting(conversation_id, true),
        SessionChunk::CompactionEnd => store.set_compacting(conversation_id, false),
        SessionChunk::SessionInit(init) => store.apply_session_init(conversation_id, init),
        SessionChunk::TaskNotification(notification) => {
            store.apply_task_notification(conversation_id, notification);
        }
        // Forwarded without state of their own; the moved-on rule below
        // is the only mutation they can cause.
        SessionChunk::TurnStart { .. }
        | SessionChunk::TurnStepStart
        | SessionChunk::InputConstruction
        | SessionChunk::TextDelta { .. }
        | SessionChunk::Error(_)
        | SessionChunk::Finish { .. } => {}
        // Unrecognized chunks pass through with no mutation at all.
        SessionChunk::Unknown { .. } => return effects,
    }

    // Once the agent engages in anything other than the question
    // lifecycle itself, an unanswered question is moot for the UI.
    // Expired questions deliberately survive this rule.
    if !chunk.preserves_pending_question() {
        store.clear_pending_question(conversation_id);
    }

    effects
}

fn attention_label(question: &session_protocol::QuestionChunk) -> String {
    question
        .questions
        .first()
        .map(|sub| sub.question.clone())
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| "The agent needs your input".to_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use conversation_store::ConversationStore;
    use session_protocol::SessionChunk;

    use super::{apply_chunk, DispatchEffects};

    fn chunk(value: serde_json::Value) -> SessionChunk {
        SessionChunk::from_value(value)
    }

    #[test]
    fn question_open_requests_attention_with_first_sub_question() {
        let store = ConversationStore::new();
        let effects = apply_chunk(
            &store,
            "c1",
            &chunk(json!({
                "type": "question",
                "toolUseId": "q1",
                "questions": [{ "question": "Overwrite main.rs?" }],
            })),
        );

        assert_eq!(
            effects.attention_label.as_deref(),
            Some("Overwrite main.rs?")
        );
        assert_eq!(
            store
                .snapshot("c1")
                .pending_question
                .map(|q| q.tool_use_id),
            Some("q1".to_owned())
        );
    }

    #[test]
    fn moved_on_rule_clears_pending_but_not_expired() {
        let store = ConversationStore::new();
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "question", "toolUseId": "q1" })),
        );
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "timeout", "toolUseId": "q1" })),
        );
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "question", "toolUseId": "q2" })),
        );

        // q2 pending, nothing expired (fresh question cleared q1).
        let snapshot = store.snapshot("c1");
        assert_eq!(
            snapshot.pending_question.as_ref().map(|q| q.tool_use_id.as_str()),
            Some("q2")
        );
        assert!(snapshot.expired_question.is_none());

        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "timeout", "toolUseId": "q2" })),
        );
        apply_chunk(&store, "c1", &chunk(json!({ "type": "text-delta", "text": "x" })));

        let snapshot = store.snapshot("c1");
        assert!(snapshot.pending_question.is_none());
        assert_eq!(
            snapshot.expired_question.map(|q| q.tool_use_id),
            Some("q2".to_owned())
        );
    }

    #[test]
    fn turn_progress_markers_leave_pending_question_in_place() {
        let store = ConversationStore::new();
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "question", "toolUseId": "q1" })),
        );

        for raw in [
            json!({ "type": "turn-start" }),
            json!({ "type": "turn-step-start" }),
            json!({ "type": "input-construction" }),
        ] {
            apply_chunk(&store, "c1", &chunk(raw));
        }

        assert!(store.snapshot("c1").pending_question.is_some());
    }

    #[test]
    fn unknown_chunk_mutates_nothing() {
        let store = ConversationStore::new();
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "question", "toolUseId": "q1" })),
        );

        let effects = apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "future-feature-x", "foo": 1 })),
        );

        assert_eq!(effects, DispatchEffects::default());
        // The pending question survives: unknown chunks are exempt from
        // every rule, including moved-on.
        assert!(store.snapshot("c1").pending_question.is_some());
    }

    #[test]
    fn answered_question_is_recorded_without_clearing_pending() {
        let store = ConversationStore::new();
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({ "type": "question", "toolUseId": "q1" })),
        );
        apply_chunk(
            &store,
            "c1",
            &chunk(json!({
                "type": "question-answered",
                "toolUseId": "q1",
                "result": { "choice": "yes" },
            })),
        );

        let snapshot = store.snapshot("c1");
        assert!(snapshot.pending_question.is_some());
        assert_eq!(snapshot.answered_results["q1"], json!({ "choice": "yes" }));
    }

    #[test]
    fn compaction_markers_toggle_the_flag_idempotently() {
        let store = ConversationStore::new();
        apply_chunk(&store, "c1", &chunk(json!({ "type": "compaction-start" })));
        apply_chunk(&store, "c1", &chunk(json!({ "type": "compaction-start" })));
        assert!(store.snapshot("c1").compacting);

        apply_chunk(&store, "c1", &chunk(json!({ "type": "compaction-end" })));
        apply_chunk(&store, "c1", &chunk(json!({ "type": "compaction-end" })));
        assert!(!store.snapshot("c1").compacting);
    }
}
