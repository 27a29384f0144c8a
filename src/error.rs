use thiserror::Error;

use session_protocol::TransportError;

/// Terminal client-side failure for one turn.
#[derive(Debug, Error)]
pub enum SessionClientError {
    #[error("a turn is already active for conversation '{conversation_id}'")]
    TurnAlreadyActive { conversation_id: String },

    /// The primary provider rejected the turn's credentials. The failed
    /// prompt is preserved in the retry store for resubmission after a
    /// successful re-authentication.
    #[error("authentication required before this conversation can continue")]
    AuthenticationRequired,

    #[error("turn aborted by caller")]
    Aborted,

    #[error("failed to open subscription: {0}")]
    Subscribe(TransportError),

    #[error("transport failure: {0}")]
    Transport(TransportError),

    #[error("conversation history has no user message to send")]
    MissingUserMessage,
}
