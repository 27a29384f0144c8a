//! Wire-level contract for the agent-session stream protocol.
//!
//! This crate owns the chunk model, outbound turn payload shapes, the
//! error taxonomy, and the host subscription contract. It intentionally
//! contains no transport implementation, no state store, and no runtime
//! UI coupling.
//!
//! Chunk normalization is total: unrecognized or malformed inbound
//! payloads are retained as [`SessionChunk::Unknown`] for parity-safe
//! passthrough forwarding rather than rejected.

pub mod chunks;
pub mod error;
pub mod payload;
pub mod subscribe;

pub use chunks::{
    ErrorChunk, ErrorDebugInfo, ErrorNotice, QuestionChunk, SessionChunk, SessionInitChunk,
    SubQuestion, TaskNotificationChunk, TaskStatus,
};
pub use error::{
    classify_error_text, requires_reauthentication, ErrorCategory, ProviderKind, TransportError,
};
pub use payload::{
    FileReference, InlineAttachment, ProviderCredentials, TurnConfig, TurnRequest,
};
pub use subscribe::{SubscriptionHandle, SubscriptionObserver, TurnSubscriber};
