// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheme to provider lookup

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use ufl_core::{FileRef, InstantiationParams, Location, ProtocolProvider, UflError, UflResult};

use crate::local::LocalProvider;
use crate::memory::MemoryProvider;

/// Registry of protocol providers
///
/// Filled at startup, then shared immutably behind an `Arc`. Registration is
/// additive: a scheme keeps its first provider.
#[derive(Default)]
pub struct ProtocolRegistry {
    providers: HashMap<String, Arc<dyn ProtocolProvider>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `file` and `mem` providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.providers.insert("file".into(), Arc::new(LocalProvider::new()));
        registry.providers.insert("mem".into(), Arc::new(MemoryProvider::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn ProtocolProvider>) -> UflResult<()> {
        let scheme = provider.scheme().to_ascii_lowercase();
        if self.providers.contains_key(&scheme) {
            return Err(UflError::AlreadyExists(format!("provider for scheme '{scheme}'")));
        }
        tracing::debug!("Registered {} provider for '{}'", provider.display_name(), scheme);
        self.providers.insert(scheme, provider);
        Ok(())
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ProtocolProvider>> {
        self.providers.get(scheme).cloned()
    }

    pub fn get_or_err(&self, scheme: &str) -> UflResult<Arc<dyn ProtocolProvider>> {
        self.get(scheme)
            .ok_or_else(|| UflError::UnknownScheme(scheme.to_string()))
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.providers.contains_key(scheme)
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        schemes.sort_unstable();
        schemes
    }

    pub async fn resolve(&self, location: &Location) -> UflResult<FileRef> {
        self.resolve_with(location, InstantiationParams::new()).await
    }

    pub async fn resolve_with(
        &self,
        location: &Location,
        params: InstantiationParams,
    ) -> UflResult<FileRef> {
        let provider = self.get_or_err(location.scheme())?;
        tracing::debug!("Resolving {} with {}", location, provider.display_name());
        provider.get_file(location, params).await
    }
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
