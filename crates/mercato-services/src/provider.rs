//! # Provider Registry
//!
//! Named implementations of a capability (tax calculation, exchange rates),
//! registered once at startup and looked up by system name.
//!
//! ## Resolution
//! ```text
//! settings.active_..._system_name
//!        │
//!        ├── Some(name) and registered ──► that provider
//!        ├── Some(name), not registered ──┐
//!        └── None ────────────────────────┴─► first by display order
//!                                              (None when registry empty)
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};

/// Descriptive data of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Unique key, e.g. `"Tax.FixedRate"`.
    pub system_name: String,
    pub friendly_name: String,
    pub display_order: i32,
}

impl ProviderMetadata {
    pub fn new(system_name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        ProviderMetadata {
            system_name: system_name.into(),
            friendly_name: friendly_name.into(),
            display_order: 0,
        }
    }

    pub fn with_display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }
}

/// A provider together with its metadata.
pub struct Provider<P: ?Sized> {
    pub metadata: ProviderMetadata,
    pub value: Arc<P>,
}

impl<P: ?Sized> Clone for Provider<P> {
    fn clone(&self) -> Self {
        Provider {
            metadata: self.metadata.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<P: ?Sized> fmt::Debug for Provider<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Providers of one capability, kept sorted by display order.
pub struct ProviderRegistry<P: ?Sized> {
    providers: Vec<Provider<P>>,
}

impl<P: ?Sized> Default for ProviderRegistry<P> {
    fn default() -> Self {
        ProviderRegistry {
            providers: Vec::new(),
        }
    }
}

impl<P: ?Sized> fmt::Debug for ProviderRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| &p.metadata.system_name))
            .finish()
    }
}

impl<P: ?Sized> ProviderRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider.
    ///
    /// ## Errors
    /// `InvalidConfig` if the system name is empty or already registered.
    pub fn register(&mut self, metadata: ProviderMetadata, provider: Arc<P>) -> ServiceResult<()> {
        if metadata.system_name.trim().is_empty() {
            return Err(ServiceError::InvalidConfig(
                "Provider system name must not be empty".into(),
            ));
        }

        if self.get(&metadata.system_name).is_some() {
            return Err(ServiceError::InvalidConfig(format!(
                "Provider '{}' is already registered",
                metadata.system_name
            )));
        }

        debug!(system_name = %metadata.system_name, "Provider registered");

        let order = metadata.display_order;
        let index = self
            .providers
            .partition_point(|p| p.metadata.display_order <= order);
        self.providers.insert(
            index,
            Provider {
                metadata,
                value: provider,
            },
        );

        Ok(())
    }

    /// Provider by system name (case-insensitive).
    pub fn get(&self, system_name: &str) -> Option<&Provider<P>> {
        self.providers
            .iter()
            .find(|p| p.metadata.system_name.eq_ignore_ascii_case(system_name))
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn require(&self, system_name: &str) -> ServiceResult<&Provider<P>> {
        self.get(system_name)
            .ok_or_else(|| ServiceError::ProviderNotFound(system_name.to_string()))
    }

    /// All providers by display order.
    pub fn all(&self) -> &[Provider<P>] {
        &self.providers
    }

    /// The named provider, otherwise the first by display order.
    pub fn active(&self, system_name: Option<&str>) -> Option<&Provider<P>> {
        if let Some(name) = system_name.filter(|n| !n.is_empty()) {
            match self.get(name) {
                Some(provider) => return Some(provider),
                None => warn!(system_name = %name, "Configured provider not registered, using first"),
            }
        }

        self.providers.first()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
