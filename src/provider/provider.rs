use crate::provider::types::{CompletionRequest, CompletionResponse, ProviderError};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

/// Interface to a remote completion service.
///
/// Implementations classify every failure into a [`ProviderError`] variant so
/// the layers above never inspect transport details.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Execute a single completion request
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap connectivity check, used by availability probes
    async fn probe(&self) -> Result<(), ProviderError>;

    /// Get provider name/identifier
    fn provider_name(&self) -> &'static str;
}

/// Swappable handle to the active provider.
///
/// Runtime configuration updates replace the provider behind this handle;
/// workers fetch a fresh reference per task so in-flight calls keep the
/// instance they started with.
#[derive(Clone)]
pub struct SharedProvider {
    inner: Arc<RwLock<Arc<dyn CompletionProvider>>>,
}

impl SharedProvider {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(provider)),
        }
    }

    /// Current provider; the returned handle stays valid across replacements
    pub fn get(&self) -> Arc<dyn CompletionProvider> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, provider: Arc<dyn CompletionProvider>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = provider;
    }
}

impl std::fmt::Debug for SharedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedProvider")
            .field("provider", &self.get().provider_name())
            .finish()
    }
}
