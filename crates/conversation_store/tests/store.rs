use pretty_assertions::assert_eq;
use serde_json::json;
use time::OffsetDateTime;

use conversation_store::{ConversationStore, PendingQuestion};
use session_protocol::{
    SessionInitChunk, SubQuestion, TaskNotificationChunk, TaskStatus,
};

fn question(tool_use_id: &str) -> PendingQuestion {
    PendingQuestion {
        tool_use_id: tool_use_id.to_owned(),
        questions: vec![SubQuestion {
            question: "Proceed?".to_owned(),
            options: vec!["yes".to_owned(), "no".to_owned()],
        }],
        timeout_seconds: Some(30),
        received_at: OffsetDateTime::now_utc(),
    }
}

fn running_task(task_id: &str, summary: &str) -> TaskNotificationChunk {
    TaskNotificationChunk {
        task_id: task_id.to_owned(),
        status: TaskStatus::Running,
        handle_id: Some(format!("handle-{task_id}")),
        summary: Some(summary.to_owned()),
        command: None,
        output_file: None,
    }
}

fn status_update(task_id: &str, status: TaskStatus) -> TaskNotificationChunk {
    TaskNotificationChunk {
        task_id: task_id.to_owned(),
        status,
        handle_id: None,
        summary: None,
        command: None,
        output_file: None,
    }
}

#[test]
fn question_moves_pending_to_expired_exactly_once() {
    let store = ConversationStore::new();
    store.open_question("c1", question("q1"));

    assert!(store.expire_question("c1", "q1"));

    let snapshot = store.snapshot("c1");
    assert!(snapshot.pending_question.is_none());
    assert_eq!(
        snapshot
            .expired_question
            .as_ref()
            .map(|q| q.tool_use_id.as_str()),
        Some("q1")
    );

    // A second expiry for the same id has nothing left to move.
    assert!(!store.expire_question("c1", "q1"));
}

#[test]
fn late_timeout_for_a_superseded_question_is_ignored() {
    let store = ConversationStore::new();
    store.open_question("c1", question("q1"));
    store.open_question("c1", question("q2"));

    assert!(!store.expire_question("c1", "q1"));

    let snapshot = store.snapshot("c1");
    assert_eq!(
        snapshot
            .pending_question
            .as_ref()
            .map(|q| q.tool_use_id.as_str()),
        Some("q2")
    );
    assert!(snapshot.expired_question.is_none());
}

#[test]
fn fresh_question_clears_a_stale_expired_question() {
    let store = ConversationStore::new();
    store.open_question("c1", question("q1"));
    store.expire_question("c1", "q1");

    store.open_question("c1", question("q2"));

    let snapshot = store.snapshot("c1");
    assert!(snapshot.expired_question.is_none());
    assert_eq!(
        snapshot
            .pending_question
            .as_ref()
            .map(|q| q.tool_use_id.as_str()),
        Some("q2")
    );
}

#[test]
fn answered_result_is_recorded_without_clearing_pending() {
    let store = ConversationStore::new();
    store.open_question("c1", question("q1"));
    store.record_answer("c1", "q1", json!({ "choice": "yes" }));

    let snapshot = store.snapshot("c1");
    assert!(snapshot.pending_question.is_some());
    assert_eq!(snapshot.answered_results["q1"], json!({ "choice": "yes" }));
}

#[test]
fn task_lifecycle_is_one_way() {
    let store = ConversationStore::new();
    store.apply_task_notification("c1", &running_task("t1", "build"));
    store.apply_task_notification("c1", &status_update("t1", TaskStatus::Completed));

    let snapshot = store.snapshot("c1");
    assert_eq!(snapshot.background_tasks.len(), 1);
    let task = &snapshot.background_tasks[0];
    assert_eq!(task.task_id, "t1");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.summary, "build");
    assert!(task.completed_at.is_some());

    // A stale "running" notification after completion must not revert.
    store.apply_task_notification("c1", &running_task("t1", "build again"));
    let snapshot = store.snapshot("c1");
    assert_eq!(snapshot.background_tasks[0].status, TaskStatus::Completed);
    assert_eq!(snapshot.background_tasks[0].summary, "build");
}

#[test]
fn non_running_notification_for_unknown_task_is_ignored() {
    let store = ConversationStore::new();
    store.apply_task_notification("c1", &status_update("ghost", TaskStatus::Failed));

    assert!(store.snapshot("c1").background_tasks.is_empty());
}

#[test]
fn clearing_finished_tasks_retains_running_ones() {
    let store = ConversationStore::new();
    store.apply_task_notification("c1", &running_task("t1", "tests"));
    store.apply_task_notification("c1", &running_task("t2", "lint"));
    store.apply_task_notification("c1", &status_update("t1", TaskStatus::Stopped));

    store.clear_finished_tasks("c1");

    let snapshot = store.snapshot("c1");
    assert_eq!(snapshot.background_tasks.len(), 1);
    assert_eq!(snapshot.background_tasks[0].task_id, "t2");
}

#[test]
fn partial_session_init_leaves_existing_metadata_untouched() {
    let store = ConversationStore::new();
    store.apply_session_init(
        "c1",
        &SessionInitChunk {
            tools: Some(vec!["bash".to_owned()]),
            integrations: Some(Vec::new()),
            skills: Some(vec!["review".to_owned()]),
        },
    );

    store.apply_session_init(
        "c1",
        &SessionInitChunk {
            tools: Some(vec!["bash".to_owned(), "edit".to_owned()]),
            integrations: None,
            skills: None,
        },
    );

    let metadata = store
        .snapshot("c1")
        .session_metadata
        .expect("complete init should have applied");
    assert_eq!(metadata.tools, vec!["bash".to_owned()]);
    assert_eq!(metadata.skills, vec!["review".to_owned()]);
}

#[test]
fn compacting_flag_is_idempotent_in_both_directions() {
    let store = ConversationStore::new();
    store.set_compacting("c1", true);
    store.set_compacting("c1", true);
    assert!(store.snapshot("c1").compacting);

    store.clear_compacting("c1");
    store.clear_compacting("c1");
    assert!(!store.snapshot("c1").compacting);
}

#[test]
fn conversations_are_independent() {
    let store = ConversationStore::new();
    store.open_question("c1", question("q1"));
    store.set_compacting("c2", true);

    assert!(store.snapshot("c1").pending_question.is_some());
    assert!(!store.snapshot("c1").compacting);
    assert!(store.snapshot("c2").pending_question.is_none());
    assert!(store.snapshot("c2").compacting);
}
