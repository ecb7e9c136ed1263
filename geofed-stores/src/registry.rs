//! Store factory registry.
//!
//! Concrete store implementations are selected by the `store_type` string of
//! a configuration record. The registry replaces an inheritance hierarchy:
//! each variant is an independent type behind the [`DataStore`] trait, and
//! adding a variant means registering one more builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use geofed_core::{DataStore, StoreConfig, StoreError};

use crate::{FormStore, GeoJsonStore, LocationStore, WfsStore};

type Builder = Box<dyn Fn(&StoreConfig) -> Arc<dyn DataStore> + Send + Sync>;

/// Registry mapping store type strings to store builders.
pub struct StoreRegistry {
    builders: BTreeMap<String, Builder>,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StoreRegistry {
    /// An empty registry with no builders.
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// A registry knowing the built-in store types
    /// (`geojson`, `wfs`, `form`, `location`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("geojson", |config| {
            Arc::new(GeoJsonStore::from_config(config))
        });
        registry.register("wfs", |config| Arc::new(WfsStore::from_config(config)));
        registry.register("form", |config| Arc::new(FormStore::from_config(config)));
        registry.register("location", |config| {
            Arc::new(LocationStore::from_config(config))
        });
        registry
    }

    /// Register (or replace) the builder for one store type.
    pub fn register(
        &mut self,
        store_type: impl Into<String>,
        builder: impl Fn(&StoreConfig) -> Arc<dyn DataStore> + Send + Sync + 'static,
    ) {
        self.builders.insert(store_type.into(), Box::new(builder));
    }

    /// Store types this registry can build, in sorted order.
    pub fn store_types(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Build a store for the given configuration.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownStoreType`] when no builder matches the
    /// record's `store_type`.
    pub fn build(&self, config: &StoreConfig) -> Result<Arc<dyn DataStore>, StoreError> {
        self.builders
            .get(&config.store_type)
            .map(|builder| builder(config))
            .ok_or_else(|| StoreError::UnknownStoreType(config.store_type.clone()))
    }
}
