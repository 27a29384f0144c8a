use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::chunks::ErrorChunk;

/// Canonical error category mapped from error-chunk diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    AuthenticationFailed,
    InvalidCredential,
    GenericAuthFailure,
    RateLimited,
    Overloaded,
    ProcessCrashed,
    SessionExpired,
    ExecutableMissing,
    NetworkError,
    UsagePolicyViolation,
    Unclassified,
}

impl ErrorCategory {
    /// Maps a provider category tag (e.g. `AUTH_FAILED_SDK`) to a category.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "AUTH_FAILED_SDK" | "AUTH_FAILED" | "AUTHENTICATION_FAILED" => {
                Self::AuthenticationFailed
            }
            "INVALID_API_KEY" | "INVALID_CREDENTIAL" | "CREDENTIAL_REJECTED" => {
                Self::InvalidCredential
            }
            "AUTH_ERROR" | "AUTH_FAILURE" => Self::GenericAuthFailure,
            "RATE_LIMITED" | "RATE_LIMIT_EXCEEDED" => Self::RateLimited,
            "OVERLOADED" => Self::Overloaded,
            "PROCESS_CRASHED" | "PROCESS_EXITED" => Self::ProcessCrashed,
            "SESSION_EXPIRED" => Self::SessionExpired,
            "EXECUTABLE_NOT_FOUND" | "EXECUTABLE_MISSING" => Self::ExecutableMissing,
            "NETWORK_ERROR" | "NETWORK_FAILURE" => Self::NetworkError,
            "USAGE_POLICY_VIOLATION" | "POLICY_VIOLATION" => Self::UsagePolicyViolation,
            _ => Self::Unclassified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::InvalidCredential => "invalid_credential",
            Self::GenericAuthFailure => "generic_auth_failure",
            Self::RateLimited => "rate_limited",
            Self::Overloaded => "overloaded",
            Self::ProcessCrashed => "process_crashed",
            Self::SessionExpired => "session_expired",
            Self::ExecutableMissing => "executable_missing",
            Self::NetworkError => "network_error",
            Self::UsagePolicyViolation => "usage_policy_violation",
            Self::Unclassified => "unclassified",
        }
    }

    /// Categories that invalidate the current credential or account state.
    #[must_use]
    pub fn is_auth_class(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidCredential
                | Self::GenericAuthFailure
                | Self::UsagePolicyViolation
        )
    }

    /// Human title/description for user-facing surfacing. `None` for
    /// unclassified errors, where callers fall back to raw detail text.
    #[must_use]
    pub fn notice_text(&self) -> Option<(&'static str, &'static str)> {
        Some(match self {
            Self::AuthenticationFailed => (
                "Authentication failed",
                "Your session is no longer valid. Sign in again to continue.",
            ),
            Self::InvalidCredential => (
                "Invalid credential",
                "The stored credential was rejected by the provider.",
            ),
            Self::GenericAuthFailure => (
                "Authentication required",
                "The provider rejected this request. Sign in again to continue.",
            ),
            Self::RateLimited => (
                "Rate limited",
                "The provider is throttling requests. Try again shortly.",
            ),
            Self::Overloaded => (
                "Provider overloaded",
                "The provider is under heavy load. Try again shortly.",
            ),
            Self::ProcessCrashed => (
                "Agent process crashed",
                "The agent process exited unexpectedly.",
            ),
            Self::SessionExpired => (
                "Session expired",
                "The agent session expired. Start a new turn to continue.",
            ),
            Self::ExecutableMissing => (
                "Agent executable missing",
                "The agent executable could not be found on this machine.",
            ),
            Self::NetworkError => (
                "Network error",
                "The connection to the agent was interrupted.",
            ),
            Self::UsagePolicyViolation => (
                "Request declined",
                "The request was declined by the provider's usage policy.",
            ),
            Self::Unclassified => return None,
        })
    }
}

/// Originating provider of an error chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// The primary first-party provider.
    Anthropic,
    Other(String),
    /// No provider tag was present on the chunk.
    Unspecified,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("anthropic") {
            Self::Anthropic
        } else {
            Self::Other(trimmed.to_owned())
        }
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Anthropic)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Other(name) => name,
            Self::Unspecified => "unspecified",
        }
    }
}

/// Auth-class failures from the primary provider require a fresh login;
/// everything else is surfaced and the stream left to run its course.
#[must_use]
pub fn requires_reauthentication(category: ErrorCategory, provider: &ProviderKind) -> bool {
    category.is_auth_class() && provider.is_primary()
}

fn text_rules() -> &'static [(Regex, ErrorCategory)] {
    static RULES: OnceLock<Vec<(Regex, ErrorCategory)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)rate.?limit", ErrorCategory::RateLimited),
            (
                r"(?i)overloaded|service.?unavailable",
                ErrorCategory::Overloaded,
            ),
            (r"(?i)session.?expired", ErrorCategory::SessionExpired),
            (
                r"(?i)executable.{0,20}not.?found|no such executable",
                ErrorCategory::ExecutableMissing,
            ),
            (
                r"(?i)network|connection.?(refused|reset|closed)|dns failure|ECONNREFUSED",
                ErrorCategory::NetworkError,
            ),
            (
                r"(?i)crashed|panicked|exited unexpectedly",
                ErrorCategory::ProcessCrashed,
            ),
        ]
        .into_iter()
        .map(|(pattern, category)| {
            (
                Regex::new(pattern).expect("error-text regex must compile"),
                category,
            )
        })
        .collect()
    })
}

/// Best-effort classification of untagged free-form error text.
pub fn classify_error_text(text: &str) -> ErrorCategory {
    for (pattern, category) in text_rules() {
        if pattern.is_match(text) {
            return *category;
        }
    }
    ErrorCategory::Unclassified
}

impl ErrorChunk {
    /// Resolves the error category: explicit tag first, then free-text
    /// classification of whatever detail is available.
    pub fn category(&self) -> ErrorCategory {
        if let Some(tag) = self
            .debug_info
            .as_ref()
            .and_then(|info| info.category.as_deref())
        {
            let parsed = ErrorCategory::parse(tag);
            if parsed != ErrorCategory::Unclassified {
                return parsed;
            }
        }

        match self.detail_text() {
            Some(text) => classify_error_text(text),
            None => ErrorCategory::Unclassified,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self
            .debug_info
            .as_ref()
            .and_then(|info| info.provider_type.as_deref())
        {
            Some(tag) if !tag.trim().is_empty() => ProviderKind::parse(tag),
            _ => ProviderKind::Unspecified,
        }
    }

    /// The most specific non-empty free text carried by the chunk.
    pub fn detail_text(&self) -> Option<&str> {
        let non_empty = |text: &&str| !text.trim().is_empty();
        self.debug_info
            .as_ref()
            .and_then(|info| info.detail.as_deref())
            .filter(non_empty)
            .or_else(|| self.message.as_deref().filter(non_empty))
    }
}

/// Failure reported by the underlying subscription channel.
#[derive(Debug)]
pub enum TransportError {
    Connect(String),
    Status(u16, String),
    Stream(String),
    ClosedBeforeFinish,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(message) => write!(f, "failed to connect: {message}"),
            Self::Status(status, message) => write!(f, "HTTP {status}: {message}"),
            Self::Stream(message) => write!(f, "stream error: {message}"),
            Self::ClosedBeforeFinish => write!(f, "stream closed before a finish chunk arrived"),
        }
    }
}

impl std::error::Error for TransportError {}
