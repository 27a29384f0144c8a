#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use agent_session::{
    ChunkStream, ErrorTelemetry, SessionClient, SessionClientError, UserAttention,
};
use conversation_store::{ConversationStore, RetryStore};
use session_protocol::{ErrorCategory, ProviderKind, SessionChunk, TurnConfig, TurnRequest};

pub fn turn_request(conversation_id: &str, prompt: &str) -> TurnRequest {
    TurnRequest {
        turn_id: Uuid::new_v4(),
        conversation_id: conversation_id.to_owned(),
        prompt: prompt.to_owned(),
        inline_attachments: Vec::new(),
        file_references: Vec::new(),
        resume_session_id: None,
        config: TurnConfig {
            provider: "anthropic".to_owned(),
            model_id: "claude-sonnet-4-5".to_owned(),
            thinking_budget: None,
            feature_flags: BTreeMap::new(),
            credentials: None,
        },
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    reports: Mutex<Vec<(String, ErrorCategory, String)>>,
}

impl RecordingTelemetry {
    pub fn reports(&self) -> Vec<(String, ErrorCategory, String)> {
        lock_unpoisoned(&self.reports).clone()
    }
}

impl ErrorTelemetry for RecordingTelemetry {
    fn report_error(
        &self,
        conversation_id: &str,
        category: ErrorCategory,
        provider: &ProviderKind,
        _detail: &str,
    ) {
        lock_unpoisoned(&self.reports).push((
            conversation_id.to_owned(),
            category,
            provider.name().to_owned(),
        ));
    }
}

#[derive(Default)]
pub struct RecordingAttention {
    labels: Mutex<Vec<String>>,
}

impl RecordingAttention {
    pub fn labels(&self) -> Vec<String> {
        lock_unpoisoned(&self.labels).clone()
    }
}

impl UserAttention for RecordingAttention {
    fn notify_user_input_required(&self, label: &str) {
        lock_unpoisoned(&self.labels).push(label.to_owned());
    }
}

pub struct TestHarness {
    pub client: SessionClient,
    pub telemetry: Arc<RecordingTelemetry>,
    pub attention: Arc<RecordingAttention>,
}

impl TestHarness {
    pub fn new() -> Self {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let attention = Arc::new(RecordingAttention::default());
        let client = SessionClient::new(
            Arc::new(ConversationStore::new()),
            Arc::new(RetryStore::new()),
            Arc::clone(&telemetry) as Arc<dyn ErrorTelemetry>,
            Arc::clone(&attention) as Arc<dyn UserAttention>,
        );

        Self {
            client,
            telemetry,
            attention,
        }
    }
}

/// Reads the stream until it closes, collecting forwarded chunks and
/// the terminal error, if any.
pub async fn drain(stream: &mut ChunkStream) -> (Vec<SessionChunk>, Option<SessionClientError>) {
    let mut chunks = Vec::new();
    loop {
        let received = tokio::time::timeout(Duration::from_secs(3), stream.recv())
            .await
            .expect("stream should terminate within the test timeout");

        match received {
            None => return (chunks, None),
            Some(Ok(chunk)) => chunks.push(chunk),
            Some(Err(error)) => return (chunks, Some(error)),
        }
    }
}

/// Polls until the predicate holds or the timeout elapses.
pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    predicate()
}

// Wire-shape chunk builders.

pub fn question(tool_use_id: &str, text: &str) -> Value {
    json!({
        "type": "question",
        "toolUseId": tool_use_id,
        "questions": [{ "question": text, "options": ["yes", "no"] }],
        "timeoutSeconds": 30,
    })
}

pub fn question_timeout(tool_use_id: &str) -> Value {
    json!({ "type": "timeout", "toolUseId": tool_use_id })
}

pub fn text_delta(text: &str) -> Value {
    json!({ "type": "text-delta", "text": text })
}

pub fn task(task_id: &str, status: &str, summary: &str) -> Value {
    json!({
        "type": "task-notification",
        "taskId": task_id,
        "status": status,
        "summary": summary,
    })
}

pub fn error_chunk(category: &str, provider: &str) -> Value {
    json!({
        "type": "error",
        "debugInfo": { "category": category, "providerType": provider },
    })
}

pub fn finish() -> Value {
    json!({ "type": "finish", "status": "ok" })
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
