//! Shared in-memory feature table with a pending-edit ledger.
//!
//! Every embedded store variant keeps its records in a [`FeatureTable`]:
//! a feature map keyed by (layer, feature id), a ledger of locally-edited
//! keys awaiting backend acknowledgment, and a broadcast channel carrying
//! every successful create/update.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use geofed_core::{FeatureResult, KeyTuple, QueryFilter, SpatialFeature, StoreError};

type LayerAndId = (String, String);

/// In-memory feature storage shared by the concrete store variants.
pub struct FeatureTable {
    store_id: String,
    features: RwLock<BTreeMap<LayerAndId, SpatialFeature>>,
    pending: RwLock<BTreeSet<KeyTuple>>,
    edited_tx: broadcast::Sender<SpatialFeature>,
}

impl FeatureTable {
    /// Create an empty table owned by the given store.
    pub fn new(store_id: impl Into<String>) -> Self {
        let (edited_tx, _) = broadcast::channel(256);
        Self {
            store_id: store_id.into(),
            features: RwLock::new(BTreeMap::new()),
            pending: RwLock::new(BTreeSet::new()),
            edited_tx,
        }
    }

    /// Number of stored features.
    pub fn len(&self) -> usize {
        self.features.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether the table holds no features.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a feature loaded from the backing source.
    ///
    /// No edit notification is emitted and the pending ledger is untouched:
    /// loaded content is already in sync with its source.
    pub fn insert_initial(&self, mut feature: SpatialFeature) {
        feature.store_id = self.store_id.clone();
        self.features
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((feature.layer_id.clone(), feature.id.clone()), feature);
    }

    /// Drop all features and pending entries.
    pub fn clear(&self) {
        self.features.write().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
        self.pending.write().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
    }

    /// Persist a new feature, stamping the owning store id.
    ///
    /// The feature is marked pending and an edit notification is emitted.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] when a record with the same layer and
    /// id already exists.
    pub fn create(&self, mut feature: SpatialFeature) -> Result<SpatialFeature, StoreError> {
        feature.store_id = self.store_id.clone();
        let slot = (feature.layer_id.clone(), feature.id.clone());
        {
            let mut features = self.features.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            if features.contains_key(&slot) {
                return Err(StoreError::Write {
                    id: self.store_id.clone(),
                    reason: format!("record {} already exists", feature.key()),
                });
            }
            features.insert(slot, feature.clone());
        }
        self.mark_pending(&feature);
        Ok(feature)
    }

    /// Replace an existing feature, refreshing its modification time.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] when the target record does not exist.
    pub fn update(&self, mut feature: SpatialFeature) -> Result<bool, StoreError> {
        feature.store_id = self.store_id.clone();
        feature.touch();
        let slot = (feature.layer_id.clone(), feature.id.clone());
        {
            let mut features = self.features.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            let Some(existing) = features.get_mut(&slot) else {
                return Err(StoreError::Write {
                    id: self.store_id.clone(),
                    reason: format!("no record {}", feature.key()),
                });
            };
            feature.created = existing.created;
            *existing = feature.clone();
        }
        self.mark_pending(&feature);
        Ok(true)
    }

    /// Remove a feature; `false` when no record matched.
    pub fn delete(&self, key: &KeyTuple) -> bool {
        let slot = (key.layer_id.clone(), key.feature_id.clone());
        let removed = self
            .features
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&slot)
            .is_some();
        if removed {
            self.pending.write().unwrap_or_else(std::sync::PoisonError::into_inner).remove(key);
        }
        removed
    }

    /// Fetch one feature by key.
    pub fn get(&self, key: &KeyTuple) -> Option<SpatialFeature> {
        let slot = (key.layer_id.clone(), key.feature_id.clone());
        self.features
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&slot)
            .cloned()
    }

    /// Snapshot the features matching a filter, as a fresh stream.
    pub fn query(&self, filter: &QueryFilter) -> BoxStream<'static, FeatureResult> {
        let items: Vec<FeatureResult> = self
            .features
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|feature| filter.matches(feature))
            .take(filter.limit())
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(items).boxed()
    }

    /// Features edited locally and not yet acknowledged by the backend.
    pub fn unsent(&self) -> Vec<SpatialFeature> {
        let pending = self.pending.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let features = self.features.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        pending
            .iter()
            .filter_map(|key| {
                features
                    .get(&(key.layer_id.clone(), key.feature_id.clone()))
                    .cloned()
            })
            .collect()
    }

    /// Acknowledge one pending edit; `false` when it was not pending.
    pub fn mark_sent(&self, key: &KeyTuple) -> bool {
        self.pending.write().unwrap_or_else(std::sync::PoisonError::into_inner).remove(key)
    }

    /// Subscribe to edit notifications.
    pub fn edited(&self) -> BoxStream<'static, SpatialFeature> {
        BroadcastStream::new(self.edited_tx.subscribe())
            .filter_map(|item| async move { item.ok() })
            .boxed()
    }

    fn mark_pending(&self, feature: &SpatialFeature) {
        self.pending
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(feature.key());
        // Send fails only when nobody subscribes, which is fine.
        let _ = self.edited_tx.send(feature.clone());
    }
}
