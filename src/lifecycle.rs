//! Stream lifecycle control.
//!
//! [`SessionClient`] owns the subscription for exactly one in-flight
//! turn per conversation. Observer callbacks from the host channel are
//! bridged into an in-order queue drained by one dispatcher task per
//! turn, so chunk handling is sequential even though delivery is
//! callback-driven.
//!
//! Invariant: every turn converges on [`TurnWorker::finish`] exactly
//! once — whether it ends in a `finish` chunk, a transport error, an
//! authentication stop, or a caller abort — and that path unsubscribes,
//! clears the compaction flag, and closes the outbound sink behind a
//! close-once gate.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio_stream::Stream;
use uuid::Uuid;

use conversation_store::{ConversationStore, RetryStore};
use session_protocol::{
    classify_error_text, ProviderKind, SessionChunk, SubscriptionHandle, SubscriptionObserver,
    TransportError, TurnRequest, TurnSubscriber,
};

use crate::collaborators::{ErrorTelemetry, UserAttention};
use crate::dispatch;
use crate::error::SessionClientError;
use crate::recovery::{self, RecoveryAction};

/// Shared cancellation flag for one turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Label passed to the attention collaborator when re-auth is needed.
const REAUTH_ATTENTION_LABEL: &str = "Sign in to continue";

/// Client root owning per-conversation turn lifecycles.
#[derive(Clone)]
pub struct SessionClient {
    store: Arc<ConversationStore>,
    retries: Arc<RetryStore>,
    telemetry: Arc<dyn ErrorTelemetry>,
    attention: Arc<dyn UserAttention>,
    active: Arc<Mutex<HashMap<String, ActiveTurn>>>,
}

struct ActiveTurn {
    turn_id: Uuid,
    cancel: CancelSignal,
    abort_wake: Arc<Notify>,
}

impl SessionClient {
    #[must_use]
    pub fn new(
        store: Arc<ConversationStore>,
        retries: Arc<RetryStore>,
        telemetry: Arc<dyn ErrorTelemetry>,
        attention: Arc<dyn UserAttention>,
    ) -> Self {
        Self {
            store,
            retries,
            telemetry,
            attention,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn retries(&self) -> &Arc<RetryStore> {
        &self.retries
    }

    /// Opens the subscription for one turn and returns the outbound
    /// chunk stream plus an abort handle. Does not await first-chunk
    /// arrival. Must be called from within a tokio runtime: each turn
    /// spawns one dispatcher task.
    ///
    /// A conversation can have at most one active turn: a second start
    /// before the first reaches a terminal state is refused. Starting a
    /// new turn clears stale pending/expired questions — they belong to
    /// the turn the user just moved past.
    pub fn start_turn(
        &self,
        request: TurnRequest,
        subscriber: &dyn TurnSubscriber,
    ) -> Result<(ChunkStream, TurnHandle), SessionClientError> {
        let conversation_id = request.conversation_id.clone();
        let mut active = lock_unpoisoned(&self.active);
        if active.contains_key(&conversation_id) {
            return Err(SessionClientError::TurnAlreadyActive { conversation_id });
        }

        self.store.clear_pending_question(&conversation_id);
        self.store.dismiss_expired_question(&conversation_id);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let observer = Arc::new(ChannelObserver { events: event_tx });

        let handle = subscriber
            .subscribe(&request, observer)
            .map_err(SessionClientError::Subscribe)?;

        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let abort_wake = Arc::new(Notify::new());
        let turn_id = request.turn_id;

        active.insert(
            conversation_id.clone(),
            ActiveTurn {
                turn_id,
                cancel: Arc::clone(&cancel),
                abort_wake: Arc::clone(&abort_wake),
            },
        );
        drop(active);

        let worker = TurnWorker {
            conversation_id: conversation_id.clone(),
            turn_id,
            request: Arc::new(request),
            store: Arc::clone(&self.store),
            retries: Arc::clone(&self.retries),
            telemetry: Arc::clone(&self.telemetry),
            attention: Arc::clone(&self.attention),
            active: Arc::clone(&self.active),
            events: event_rx,
            cancel: Arc::clone(&cancel),
            abort_wake: Arc::clone(&abort_wake),
            handle: Some(handle),
            sink: SinkGate::new(chunk_tx),
            cleaned_up: false,
        };
        tokio::spawn(worker.run());

        Ok((
            ChunkStream { receiver: chunk_rx },
            TurnHandle {
                conversation_id,
                turn_id,
                cancel,
                abort_wake,
            },
        ))
    }

    /// Aborts the conversation's active turn, if any.
    pub fn abort_turn(&self, conversation_id: &str) -> bool {
        let active = lock_unpoisoned(&self.active);
        match active.get(conversation_id) {
            Some(turn) => {
                turn.cancel.store(true, Ordering::SeqCst);
                turn.abort_wake.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_turn_active(&self, conversation_id: &str) -> bool {
        lock_unpoisoned(&self.active).contains_key(conversation_id)
    }
}

/// Abort handle for one started turn.
#[derive(Debug, Clone)]
pub struct TurnHandle {
    conversation_id: String,
    turn_id: Uuid,
    cancel: CancelSignal,
    abort_wake: Arc<Notify>,
}

impl TurnHandle {
    /// Requests cancellation. The chunk currently being dispatched
    /// completes; nothing further is dispatched. Repeated aborts, and
    /// aborts racing a final `finish`, are no-ops after the first
    /// terminal action.
    pub fn abort(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.abort_wake.notify_one();
    }

    #[must_use]
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

/// Ordered stream of forwarded chunks for one turn. Yields `Err` once
/// (terminally) for aborted, auth-required, and transport-failed turns.
#[derive(Debug)]
pub struct ChunkStream {
    receiver: UnboundedReceiver<Result<SessionChunk, SessionClientError>>,
}

impl ChunkStream {
    pub async fn recv(&mut self) -> Option<Result<SessionChunk, SessionClientError>> {
        self.receiver.recv().await
    }
}

impl Stream for ChunkStream {
    type Item = Result<SessionChunk, SessionClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

enum InboundEvent {
    Chunk(Value),
    TransportError(TransportError),
    Completed,
}

struct ChannelObserver {
    events: UnboundedSender<InboundEvent>,
}

impl SubscriptionObserver for ChannelObserver {
    fn on_chunk(&self, chunk: Value) {
        let _ = self.events.send(InboundEvent::Chunk(chunk));
    }

    fn on_error(&self, error: TransportError) {
        let _ = self.events.send(InboundEvent::TransportError(error));
    }

    fn on_complete(&self) {
        let _ = self.events.send(InboundEvent::Completed);
    }
}

enum TurnOutcome {
    Finished,
    Aborted,
    AuthRequired,
    Transport(TransportError),
}

enum ChunkFlow {
    Continue,
    Finished,
    AuthRequired,
}

struct TurnWorker {
    conversation_id: String,
    turn_id: Uuid,
    request: Arc<TurnRequest>,
    store: Arc<ConversationStore>,
    retries: Arc<RetryStore>,
    telemetry: Arc<dyn ErrorTelemetry>,
    attention: Arc<dyn UserAttention>,
    active: Arc<Mutex<HashMap<String, ActiveTurn>>>,
    events: UnboundedReceiver<InboundEvent>,
    cancel: CancelSignal,
    abort_wake: Arc<Notify>,
    handle: Option<Box<dyn SubscriptionHandle>>,
    sink: SinkGate,
    cleaned_up: bool,
}

impl TurnWorker {
    async fn run(mut self) {
        let outcome = self.pump().await;
        self.finish(outcome);
    }

    async fn pump(&mut self) -> TurnOutcome {
        loop {
            if self.cancel.load(Ordering::Acquire) {
                return TurnOutcome::Aborted;
            }

            tokio::select! {
                biased;
                _ = self.abort_wake.notified() => return TurnOutcome::Aborted,
                event = self.events.recv() => match event {
                    None => return TurnOutcome::Transport(TransportError::ClosedBeforeFinish),
                    Some(InboundEvent::Chunk(value)) => {
                        match self.process_chunk(SessionChunk::from_value(value)) {
                            ChunkFlow::Continue => {}
                            ChunkFlow::Finished => return TurnOutcome::Finished,
                            ChunkFlow::AuthRequired => return TurnOutcome::AuthRequired,
                        }
                    }
                    Some(InboundEvent::TransportError(error)) => {
                        self.telemetry.report_error(
                            &self.conversation_id,
                            classify_error_text(&error.to_string()),
                            &ProviderKind::Unspecified,
                            &error.to_string(),
                        );
                        return TurnOutcome::Transport(error);
                    }
                    Some(InboundEvent::Completed) => {
                        return TurnOutcome::Transport(TransportError::ClosedBeforeFinish);
                    }
                },
            }
        }
    }

    fn process_chunk(&mut self, chunk: SessionChunk) -> ChunkFlow {
        match chunk {
            SessionChunk::Error(error) => self.process_error_chunk(error),
            chunk => {
                let effects = dispatch::apply_chunk(&self.store, &self.conversation_id, &chunk);
                if let Some(label) = effects.attention_label {
                    self.attention.notify_user_input_required(&label);
                }

                let finished = chunk.is_finish();
                self.sink.forward(chunk);
                if finished {
                    ChunkFlow::Finished
                } else {
                    ChunkFlow::Continue
                }
            }
        }
    }

    /// Error chunks are classified before forwarding, and forwarded with
    /// the resolved notice attached so the UI never re-derives it.
    fn process_error_chunk(&mut self, error: session_protocol::ErrorChunk) -> ChunkFlow {
        let assessment = recovery::assess(&error);
        self.telemetry.report_error(
            &self.conversation_id,
            assessment.category,
            &assessment.provider,
            error.detail_text().unwrap_or_default(),
        );

        let mut annotated = error;
        annotated.notice = Some(assessment.notice);
        let chunk = SessionChunk::Error(annotated);
        dispatch::apply_chunk(&self.store, &self.conversation_id, &chunk);

        match assessment.action {
            RecoveryAction::Reauthenticate => {
                self.retries.save(
                    &self.conversation_id,
                    self.request.prompt.clone(),
                    self.request.inline_attachments.clone(),
                    self.request.file_references.clone(),
                );
                self.attention
                    .notify_user_input_required(REAUTH_ATTENTION_LABEL);
                self.sink.forward(chunk);
                ChunkFlow::AuthRequired
            }
            RecoveryAction::Notify => {
                self.sink.forward(chunk);
                ChunkFlow::Continue
            }
        }
    }

    /// The single terminal cleanup path. Safe to reach from any outcome;
    /// guarded so racing terminal triggers collapse to one execution.
    fn finish(&mut self, outcome: TurnOutcome) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        if let Some(mut handle) = self.handle.take() {
            handle.unsubscribe();
        }

        // Compaction-end may never arrive on abnormal termination.
        self.store.clear_compacting(&self.conversation_id);

        let error = match outcome {
            TurnOutcome::Finished => None,
            TurnOutcome::Aborted => Some(SessionClientError::Aborted),
            TurnOutcome::AuthRequired => Some(SessionClientError::AuthenticationRequired),
            TurnOutcome::Transport(error) => Some(SessionClientError::Transport(error)),
        };
        self.sink.close(error);
        self.release_active_slot();
    }

    fn release_active_slot(&self) {
        let mut active = lock_unpoisoned(&self.active);
        let matches = active
            .get(&self.conversation_id)
            .map(|turn| turn.turn_id)
            == Some(self.turn_id);
        if matches {
            active.remove(&self.conversation_id);
        }
    }
}

impl Drop for TurnWorker {
    fn drop(&mut self) {
        // The dispatcher task never leaks a half-open turn, even if the
        // runtime drops it mid-pump.
        self.finish(TurnOutcome::Transport(TransportError::ClosedBeforeFinish));
    }
}

/// Close-once guard around the outbound sink. Closing a closed sink is
/// a no-op, never an error.
struct SinkGate {
    tx: Mutex<Option<UnboundedSender<Result<SessionChunk, SessionClientError>>>>,
}

impl SinkGate {
    fn new(tx: UnboundedSender<Result<SessionChunk, SessionClientError>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn forward(&self, chunk: SessionChunk) {
        if let Some(tx) = lock_unpoisoned(&self.tx).as_ref() {
            let _ = tx.send(Ok(chunk));
        }
    }

    fn close(&self, error: Option<SessionClientError>) {
        if let Some(tx) = lock_unpoisoned(&self.tx).take() {
            if let Some(error) = error {
                let _ = tx.send(Err(error));
            }
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use session_protocol::SessionChunk;

    use super::SinkGate;
    use crate::error::SessionClientError;

    #[test]
    fn sink_gate_closes_exactly_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = SinkGate::new(tx);

        gate.forward(SessionChunk::TurnStepStart);
        gate.close(Some(SessionClientError::Aborted));
        // Second close and late forwards are silent no-ops.
        gate.close(None);
        gate.forward(SessionChunk::TurnStepStart);

        assert!(matches!(rx.try_recv(), Ok(Ok(SessionChunk::TurnStepStart))));
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(SessionClientError::Aborted))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sink_gate_clean_close_just_drops_the_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<SessionChunk, SessionClientError>>();
        let gate = SinkGate::new(tx);

        gate.close(None);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
