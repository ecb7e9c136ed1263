//! Locally cached backend configuration.
//!
//! Store and form configuration records received from the backend are kept
//! here so the engine can provision stores while offline. The cache is the
//! single local authority: config updates mutate it first, then the store
//! registry is reconciled against it.

use std::collections::BTreeMap;
use std::sync::RwLock;

use geofed_core::StoreConfig;

use crate::message::FormConfig;

/// Cached store and form configuration, keyed by id.
#[derive(Default)]
pub struct ConfigCache {
    stores: RwLock<BTreeMap<String, StoreConfig>>,
    forms: RwLock<BTreeMap<String, FormConfig>>,
}

impl ConfigCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded with store configuration records.
    ///
    /// Records without an id receive a generated one, which is also written
    /// back into the cached record so later lookups stay stable.
    pub fn with_stores(configs: impl IntoIterator<Item = StoreConfig>) -> Self {
        let cache = Self::new();
        for config in configs {
            cache.upsert_store(config);
        }
        cache
    }

    /// Insert or replace one store record, returning its (possibly
    /// generated) id.
    pub fn upsert_store(&self, mut config: StoreConfig) -> String {
        let id = config.id_or_generate();
        config.id = Some(id.clone());
        self.stores
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id.clone(), config);
        id
    }

    /// Remove one store record; `false` when it was not cached.
    pub fn remove_store(&self, id: &str) -> bool {
        self.stores
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Look up one store record.
    pub fn store(&self, id: &str) -> Option<StoreConfig> {
        self.stores
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// All cached store records, ordered by id.
    pub fn stores(&self) -> Vec<StoreConfig> {
        self.stores
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Insert or replace one form record.
    pub fn upsert_form(&self, form: FormConfig) {
        self.forms
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(form.id.clone(), form);
    }

    /// Remove one form record; `false` when it was not cached.
    pub fn remove_form(&self, id: &str) -> bool {
        self.forms
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// All cached form records, ordered by id.
    pub fn forms(&self) -> Vec<FormConfig> {
        self.forms
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
