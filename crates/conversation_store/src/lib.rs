//! Ephemeral per-conversation session state.
//!
//! One [`ConversationStore`] instance is owned by the application root
//! and handed to the stream lifecycle controller and chunk dispatcher;
//! the UI layer only reads snapshots. State lives for the lifetime of a
//! conversation and carries no persistence guarantees of its own.

mod retry;
mod state;
mod store;

pub use retry::{PendingRetry, RetryStore};
pub use state::{
    BackgroundTask, ConversationSnapshot, PendingQuestion, SessionMetadata,
};
pub use store::ConversationStore;
