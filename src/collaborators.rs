//! Fire-and-forget collaborator seams supplied by the host application.

use session_protocol::{ErrorCategory, ProviderKind};

/// External telemetry collector. Implementations must not block; the
/// dispatcher calls this synchronously between chunks.
pub trait ErrorTelemetry: Send + Sync + 'static {
    fn report_error(
        &self,
        conversation_id: &str,
        category: ErrorCategory,
        provider: &ProviderKind,
        detail: &str,
    );
}

/// Side-channel user-attention signal (sound, OS notification).
/// At-least-once best effort; not part of state correctness.
pub trait UserAttention: Send + Sync + 'static {
    fn notify_user_input_required(&self, label: &str);
}

#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl ErrorTelemetry for NoopTelemetry {
    fn report_error(
        &self,
        _conversation_id: &str,
        _category: ErrorCategory,
        _provider: &ProviderKind,
        _detail: &str,
    ) {
    }
}

#[derive(Debug, Default)]
pub struct NoopAttention;

impl UserAttention for NoopAttention {
    fn notify_user_input_required(&self, _label: &str) {}
}
