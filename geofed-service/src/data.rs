//! Federated data service.
//!
//! The data service keeps the registry of data stores keyed by store id and
//! exposes federated query and mutation operations across them. Federated
//! queries fan out over the targeted `Running` stores through a channel and
//! merge into one stream: order across stores is unspecified, order within
//! one store is preserved, and one store's mid-stream error is surfaced as
//! an `Err` item without cancelling the sibling streams. Dropping the
//! merged stream cancels every forwarder.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use log::debug;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};

use geofed_core::{
    DataStore, FeatureResult, FeatureStream, KeyTuple, QueryFilter, SpatialFeature, StoreError,
    StoreStatus,
};

struct Registered {
    store: Arc<dyn DataStore>,
    /// Forwards the store's edit notifications into the aggregated feed.
    forwarder: tokio::task::JoinHandle<()>,
}

/// Registry of data stores plus the federated query/mutation surface.
pub struct DataService {
    stores: RwLock<BTreeMap<String, Registered>>,
    edited_tx: broadcast::Sender<SpatialFeature>,
}

impl Default for DataService {
    fn default() -> Self {
        Self::new()
    }
}

impl DataService {
    /// A service with no registered stores.
    pub fn new() -> Self {
        let (edited_tx, _) = broadcast::channel(256);
        Self {
            stores: RwLock::new(BTreeMap::new()),
            edited_tx,
        }
    }

    /// Register a store under its own id.
    ///
    /// Must be called within a tokio runtime: the store's edit notifications
    /// are forwarded into the aggregated [`edited`](Self::edited) feed by a
    /// spawned task.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateStore`] when the id is taken.
    pub fn register(&self, store: Arc<dyn DataStore>) -> Result<(), StoreError> {
        let id = store.id().to_owned();
        let mut stores = self.stores.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if stores.contains_key(&id) {
            return Err(StoreError::DuplicateStore(id));
        }
        let mut edits = store.edited();
        let aggregated = self.edited_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(feature) = edits.next().await {
                // Send fails only when nobody subscribes, which is fine.
                let _ = aggregated.send(feature);
            }
        });
        debug!("data service: registered store {id}");
        stores.insert(id, Registered { store, forwarder });
        Ok(())
    }

    /// Unregister a store, stopping it and closing its connections.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownStore`] when the id is not registered.
    pub async fn unregister(&self, id: &str) -> Result<(), StoreError> {
        let removed = self
            .stores
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| StoreError::UnknownStore(id.to_owned()))?;
        removed.forwarder.abort();
        removed.store.stop().await;
        debug!("data service: unregistered store {id}");
        Ok(())
    }

    /// Look up one store by id.
    pub fn store(&self, id: &str) -> Option<Arc<dyn DataStore>> {
        self.stores
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(id)
            .map(|registered| Arc::clone(&registered.store))
    }

    /// All registered stores.
    pub fn stores(&self) -> Vec<Arc<dyn DataStore>> {
        self.stores
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(|registered| Arc::clone(&registered.store))
            .collect()
    }

    /// The stores currently in the `Running` state.
    pub fn active_stores(&self) -> Vec<Arc<dyn DataStore>> {
        self.stores()
            .into_iter()
            .filter(|store| store.status() == StoreStatus::Running)
            .collect()
    }

    /// Query a single store.
    ///
    /// A store that exists but is not `Running` yields an empty stream with
    /// a normal completion, so transient unavailability does not propagate
    /// as a hard failure. An unknown id is a hard failure, surfaced as one
    /// `Err` item.
    pub fn query_store(&self, id: &str, filter: &QueryFilter) -> FeatureStream {
        let Some(store) = self.store(id) else {
            let error = StoreError::UnknownStore(id.to_owned());
            return stream::once(async move { Err(error) }).boxed();
        };
        if store.status() != StoreStatus::Running {
            return stream::empty().boxed();
        }
        store.query(filter)
    }

    /// Federated query across every active store.
    pub fn query_all_stores(&self, filter: &QueryFilter) -> FeatureStream {
        Self::merge(self.active_stores(), filter.clone())
    }

    /// Federated query across the active stores named by `ids`.
    ///
    /// Ids that are unknown or not `Running` are skipped, per the federated
    /// policy of isolating callers from transient unavailability.
    pub fn query_stores_by_ids(&self, ids: &[String], filter: &QueryFilter) -> FeatureStream {
        let targets = ids
            .iter()
            .filter_map(|id| self.store(id))
            .filter(|store| store.status() == StoreStatus::Running)
            .collect();
        Self::merge(targets, filter.clone())
    }

    fn merge(targets: Vec<Arc<dyn DataStore>>, filter: QueryFilter) -> FeatureStream {
        let (tx, rx) = mpsc::channel::<FeatureResult>(32);
        for store in targets {
            let tx = tx.clone();
            let filter = filter.clone();
            tokio::spawn(async move {
                let mut results = store.query(&filter);
                while let Some(item) = results.next().await {
                    if tx.send(item).await.is_err() {
                        // Consumer dropped the merged stream.
                        break;
                    }
                }
            });
        }
        ReceiverStream::new(rx).boxed()
    }

    fn running_store(&self, id: &str) -> Result<Arc<dyn DataStore>, StoreError> {
        let store = self
            .store(id)
            .ok_or_else(|| StoreError::UnknownStore(id.to_owned()))?;
        let status = store.status();
        if status != StoreStatus::Running {
            return Err(StoreError::NotRunning {
                id: id.to_owned(),
                status,
            });
        }
        Ok(store)
    }

    /// Create a feature in the store named by its `store_id`.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownStore`] or [`StoreError::NotRunning`]
    /// when routing fails, or the store's own write error.
    pub async fn create(&self, feature: SpatialFeature) -> Result<SpatialFeature, StoreError> {
        let store = self.running_store(&feature.store_id)?;
        store.create(feature).await
    }

    /// Update a feature in the store named by its `store_id`.
    ///
    /// # Errors
    /// Same routing errors as [`create`](Self::create).
    pub async fn update(&self, feature: SpatialFeature) -> Result<bool, StoreError> {
        let store = self.running_store(&feature.store_id)?;
        store.update(feature).await
    }

    /// Delete the feature addressed by the key.
    ///
    /// # Errors
    /// Same routing errors as [`create`](Self::create).
    pub async fn delete(&self, key: &KeyTuple) -> Result<bool, StoreError> {
        let store = self.running_store(&key.store_id)?;
        store.delete(key).await
    }

    /// Aggregated edit notifications across every registered store.
    pub fn edited(&self) -> BoxStream<'static, SpatialFeature> {
        BroadcastStream::new(self.edited_tx.subscribe())
            .filter_map(|item| async move { item.ok() })
            .boxed()
    }
}
