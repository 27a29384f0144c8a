//! Streaming agent-session protocol client.
//!
//! The client opens one long-lived event stream per in-flight turn,
//! demultiplexes the heterogeneous chunk sequence into durable
//! per-conversation state, and reconciles that state against user
//! actions (aborts, retries, re-authentication) under partial failure.
//!
//! The pieces compose leaf-first:
//!
//! - [`attachments`] buckets outbound message parts into inline payloads
//!   and file references around a fixed decoded-size threshold.
//! - [`turn`] assembles one immutable [`session_protocol::TurnRequest`]
//!   per send from conversation history and a configuration snapshot.
//! - [`lifecycle`] owns the subscription for exactly one active turn per
//!   conversation and guarantees single-shot terminal cleanup.
//! - [`dispatch`] applies each chunk's state mutation in arrival order
//!   before forwarding it to the outbound sink.
//! - [`recovery`] classifies error chunks and decides between silent
//!   continuation, a user-facing notice, and a hard re-authentication
//!   stop.
//!
//! Presentation concerns live entirely outside this crate: consumers
//! read [`conversation_store::ConversationSnapshot`] values and the
//! forwarded chunk stream.

pub mod attachments;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod recovery;
pub mod turn;

pub use collaborators::{ErrorTelemetry, NoopAttention, NoopTelemetry, UserAttention};
pub use config::{CatalogError, ConfigStore, ModelSelection, ProviderCatalog};
pub use error::SessionClientError;
pub use lifecycle::{ChunkStream, SessionClient, TurnHandle};
pub use turn::{ChatMessage, MessageRole, TurnRequestBuilder};
