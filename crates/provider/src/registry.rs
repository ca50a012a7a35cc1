use std::collections::HashMap;
use std::sync::Arc;

use faultline_core::ChannelKind;

use crate::provider::ChannelProvider;

/// Registry mapping channel kinds to their providers.
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    providers: HashMap<ChannelKind, Arc<dyn ChannelProvider>>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("kinds", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ChannelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own kind, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn ChannelProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Look up the provider for a channel kind.
    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Registered channel kinds.
    #[must_use]
    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.providers.keys().copied().collect()
    }
}
