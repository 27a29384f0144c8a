//! Deterministic scripted implementation of the subscription contract.
//!
//! This crate contains no transport logic and is intended for
//! contract-level integration testing of the session client: each
//! subscribe replays a fixed step script on a background thread, then
//! holds the stream open until unsubscribed (unless the script says
//! otherwise).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use session_protocol::{
    SubscriptionHandle, SubscriptionObserver, TransportError, TurnRequest, TurnSubscriber,
};

const IDLE_POLL_MS: u64 = 5;

/// One scripted delivery action.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver a raw chunk value via `on_chunk`.
    Chunk(Value),
    /// Sleep before the next step.
    Delay(Duration),
    /// Report a transport failure via `on_error` and stop.
    TransportError(String),
    /// Invoke `on_complete` and stop, without any terminal chunk.
    Complete,
}

/// Scripted subscriber replaying the same steps for every subscribe.
pub struct ScriptedSubscriber {
    steps: Vec<ScriptStep>,
    unsubscribe_count: Arc<AtomicUsize>,
}

impl ScriptedSubscriber {
    /// Creates a subscriber that replays `steps`, then keeps the stream
    /// open until the handle is unsubscribed.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            unsubscribe_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times any handle from this subscriber was unsubscribed.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribe_count.load(Ordering::SeqCst)
    }
}

impl TurnSubscriber for ScriptedSubscriber {
    fn subscribe(
        &self,
        _request: &TurnRequest,
        observer: Arc<dyn SubscriptionObserver>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError> {
        let steps = self.steps.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);

        thread::spawn(move || {
            for step in steps {
                if thread_cancel.load(Ordering::SeqCst) {
                    return;
                }

                match step {
                    ScriptStep::Chunk(value) => observer.on_chunk(value),
                    ScriptStep::Delay(duration) => thread::sleep(duration),
                    ScriptStep::TransportError(message) => {
                        observer.on_error(TransportError::Stream(message));
                        return;
                    }
                    ScriptStep::Complete => {
                        observer.on_complete();
                        return;
                    }
                }
            }

            // Script exhausted: emulate a live channel that stays open
            // until the client unsubscribes.
            while !thread_cancel.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(IDLE_POLL_MS));
            }
        });

        Ok(Box::new(ScriptedHandle {
            cancel,
            unsubscribe_count: Arc::clone(&self.unsubscribe_count),
        }))
    }
}

struct ScriptedHandle {
    cancel: Arc<AtomicBool>,
    unsubscribe_count: Arc<AtomicUsize>,
}

impl SubscriptionHandle for ScriptedHandle {
    fn unsubscribe(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.unsubscribe_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A subscriber whose subscribe call itself fails, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingSubscriber;

impl TurnSubscriber for FailingSubscriber {
    fn subscribe(
        &self,
        _request: &TurnRequest,
        _observer: Arc<dyn SubscriptionObserver>,
    ) -> Result<Box<dyn SubscriptionHandle>, TransportError> {
        Err(TransportError::Connect("scripted refusal".to_owned()))
    }
}
