//! Configuration collaborators read at turn-build time.
//!
//! The builder snapshots everything it needs from these seams when the
//! request is constructed, not when the connection opens, so later
//! configuration changes never retroactively alter an in-flight turn.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use session_protocol::{ProviderCredentials, ProviderKind};

/// Model chosen in process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model_id: String,
}

/// Synchronous read access to the process-wide key-value configuration.
pub trait ConfigStore: Send + Sync {
    fn model_selection(&self) -> Option<ModelSelection>;
    fn thinking_budget(&self) -> Option<u32>;
    fn feature_flags(&self) -> BTreeMap<String, bool>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("provider catalog lookup failed: {0}")]
    Unavailable(String),
}

/// Asynchronous remote lookups for provider capabilities. Every lookup
/// is optional enrichment: failures degrade the request, never the send.
#[async_trait]
pub trait ProviderCatalog: Send + Sync {
    /// Models currently enabled for the provider.
    async fn enabled_models(&self, provider: &ProviderKind) -> Result<Vec<String>, CatalogError>;

    /// The provider's own default model.
    async fn default_model(&self, provider: &ProviderKind) -> Result<String, CatalogError>;

    /// Custom credentials for the provider, when configured.
    async fn provider_credentials(
        &self,
        provider: &ProviderKind,
    ) -> Result<Option<ProviderCredentials>, CatalogError>;
}
