//! Error-chunk classification and recovery decisions.
//!
//! The classifier runs ahead of forwarding: auth-class failures from the
//! primary provider become a hard stop with the failed turn preserved
//! for resubmission; everything else is annotated for the UI and the
//! stream continues to its own natural termination.

use session_protocol::{
    requires_reauthentication, ErrorCategory, ErrorChunk, ErrorNotice, ProviderKind,
};

/// Raw error text is truncated to this many characters when no curated
/// notice exists for the category.
pub const MAX_RAW_DETAIL_LEN: usize = 280;

/// What the stream should do about an error chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Persist the turn for retry, prompt for login, terminate the
    /// stream with an authentication-required error.
    Reauthenticate,
    /// Surface the notice; keep forwarding until natural termination.
    Notify,
}

/// Classification outcome for one error chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub category: ErrorCategory,
    pub provider: ProviderKind,
    pub action: RecoveryAction,
    pub notice: ErrorNotice,
}

/// Classifies an error chunk and resolves its user-facing notice.
pub fn assess(error: &ErrorChunk) -> Assessment {
    let category = error.category();
    let provider = error.provider();
    let action = if requires_reauthentication(category, &provider) {
        RecoveryAction::Reauthenticate
    } else {
        RecoveryAction::Notify
    };

    Assessment {
        category,
        provider,
        action,
        notice: resolve_notice(category, error),
    }
}

/// Resolves the human title/description pair for a category, falling
/// back to bounded raw error text when no curated copy exists.
pub fn resolve_notice(category: ErrorCategory, error: &ErrorChunk) -> ErrorNotice {
    if let Some((title, description)) = category.notice_text() {
        return ErrorNotice {
            title: title.to_owned(),
            description: description.to_owned(),
        };
    }

    let raw = error.detail_text().unwrap_or("An unknown error occurred");
    ErrorNotice {
        title: "Something went wrong".to_owned(),
        description: truncate_detail(raw),
    }
}

fn truncate_detail(text: &str) -> String {
    if text.chars().count() <= MAX_RAW_DETAIL_LEN {
        return text.to_owned();
    }

    let mut truncated: String = text.chars().take(MAX_RAW_DETAIL_LEN).collect();
    truncated.push('…');
    truncated
}
