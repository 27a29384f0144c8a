//! Outbound turn assembly.
//!
//! One [`TurnRequest`] is produced per user-initiated send and handed to
//! the lifecycle controller; it is never mutated afterwards. Building is
//! the only suspension point in the client: the builder may await remote
//! catalog lookups, all of which are optional enrichment.

use uuid::Uuid;

use session_protocol::{ProviderKind, TurnConfig, TurnRequest};

use crate::attachments::{classify_attachments, MessagePart};
use crate::config::{ConfigStore, ModelSelection, ProviderCatalog};
use crate::error::SessionClientError;

/// Model used when configuration names nothing at all.
const FALLBACK_MODEL_ID: &str = "claude-sonnet-4-5";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry of the conversation history, as the host presents it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub parts: Vec<MessagePart>,
    /// Resumable backend session id, carried by assistant messages that
    /// completed (or aborted) a streamed turn.
    pub session_id: Option<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn user(parts: Vec<MessagePart>) -> Self {
        Self {
            role: MessageRole::User,
            parts,
            session_id: None,
        }
    }

    #[must_use]
    pub fn assistant(session_id: Option<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            parts: Vec::new(),
            session_id,
        }
    }
}

/// Builds one immutable [`TurnRequest`] from history and configuration.
pub struct TurnRequestBuilder<'a> {
    config: &'a dyn ConfigStore,
    catalog: &'a dyn ProviderCatalog,
}

impl<'a> TurnRequestBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a dyn ConfigStore, catalog: &'a dyn ProviderCatalog) -> Self {
        Self { config, catalog }
    }

    /// Assembles the outbound turn from the latest user message, the
    /// latest assistant message's resumable session id, and a snapshot
    /// of dynamic configuration taken now.
    pub async fn build(
        &self,
        conversation_id: &str,
        history: &[ChatMessage],
    ) -> Result<TurnRequest, SessionClientError> {
        let user = history
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::User)
            .ok_or(SessionClientError::MissingUserMessage)?;

        let prompt = compose_prompt(&user.parts);
        let classified = classify_attachments(&user.parts);
        for dropped in &classified.dropped {
            tracing::warn!(
                conversation_id,
                file_name = dropped.file_name.as_deref().unwrap_or("<unnamed>"),
                decoded_len = dropped.decoded_len,
                reason = ?dropped.reason,
                "dropping attachment from outbound turn"
            );
        }

        let resume_session_id = history
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant)
            .and_then(|message| message.session_id.clone());

        Ok(TurnRequest {
            turn_id: Uuid::new_v4(),
            conversation_id: conversation_id.to_owned(),
            prompt,
            inline_attachments: classified.inline,
            file_references: classified.file_references,
            resume_session_id,
            config: self.snapshot_config().await,
        })
    }

    async fn snapshot_config(&self) -> TurnConfig {
        let selection = self.config.model_selection().unwrap_or_else(|| ModelSelection {
            provider: ProviderKind::Anthropic,
            model_id: FALLBACK_MODEL_ID.to_owned(),
        });

        let model_id = self.validated_model(&selection).await;
        let credentials = match self.catalog.provider_credentials(&selection.provider).await {
            Ok(credentials) => credentials,
            Err(error) => {
                tracing::warn!(
                    provider = selection.provider.name(),
                    %error,
                    "credential lookup failed; sending without custom credentials"
                );
                None
            }
        };

        TurnConfig {
            provider: selection.provider.name().to_owned(),
            model_id,
            thinking_budget: self.config.thinking_budget(),
            feature_flags: self.config.feature_flags(),
            credentials,
        }
    }

    /// Validates the selected model against the provider's enabled set,
    /// falling back to the provider default when it is no longer
    /// enabled. Lookup failures keep the selection as-is.
    async fn validated_model(&self, selection: &ModelSelection) -> String {
        let enabled = match self.catalog.enabled_models(&selection.provider).await {
            Ok(enabled) => enabled,
            Err(error) => {
                tracing::warn!(
                    provider = selection.provider.name(),
                    %error,
                    "could not verify enabled models; keeping selection"
                );
                return selection.model_id.clone();
            }
        };

        if enabled.iter().any(|model| *model == selection.model_id) {
            return selection.model_id.clone();
        }

        match self.catalog.default_model(&selection.provider).await {
            Ok(default) => {
                tracing::warn!(
                    provider = selection.provider.name(),
                    selected = %selection.model_id,
                    fallback = %default,
                    "selected model is no longer enabled"
                );
                default
            }
            Err(error) => {
                tracing::warn!(
                    provider = selection.provider.name(),
                    %error,
                    "default-model lookup failed; keeping selection"
                );
                selection.model_id.clone()
            }
        }
    }
}

fn compose_prompt(parts: &[MessagePart]) -> String {
    let mut prompt = parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    for part in parts {
        if let MessagePart::FileContent { path, content } = part {
            prompt.push_str(&format!("\n\nContents of {path}:\n```\n{content}\n```"));
        }
    }

    prompt
}
