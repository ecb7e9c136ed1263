//! Test-only, in-memory [`DataStore`] implementation used by unit and
//! integration tests across the workspace.
//!
//! The store performs a linear scan and is intended only for small datasets.
//! Its status is scriptable, and a mid-stream failure can be injected to
//! exercise federated-query error isolation.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    DataStore, FeatureResult, FeatureStream, KeyTuple, QueryFilter, SpatialFeature, StoreError,
    StoreStatus, SyncableStore,
};

/// In-memory store with scriptable status and failure injection.
pub struct MemoryStore {
    id: String,
    name: String,
    status: RwLock<StoreStatus>,
    features: RwLock<Vec<SpatialFeature>>,
    /// When set, `query` emits this many items and then one error.
    fail_after: RwLock<Option<usize>>,
    pending: RwLock<BTreeSet<KeyTuple>>,
    edited_tx: broadcast::Sender<SpatialFeature>,
}

impl MemoryStore {
    /// Create an empty store in the `Stopped` state.
    pub fn new(id: impl Into<String>) -> Self {
        let (edited_tx, _) = broadcast::channel(64);
        let id = id.into();
        Self {
            name: format!("memory store {id}"),
            id,
            status: RwLock::new(StoreStatus::Stopped),
            features: RwLock::new(Vec::new()),
            fail_after: RwLock::new(None),
            pending: RwLock::new(BTreeSet::new()),
            edited_tx,
        }
    }

    /// Create a `Running` store preloaded with features.
    pub fn running_with(
        id: impl Into<String>,
        features: impl IntoIterator<Item = SpatialFeature>,
    ) -> Self {
        let store = Self::new(id);
        store.set_status(StoreStatus::Running);
        store
            .features
            .write()
            .expect("lock poisoned")
            .extend(features);
        store
    }

    /// Override the store status.
    pub fn set_status(&self, status: StoreStatus) {
        *self.status.write().expect("lock poisoned") = status;
    }

    /// Make every subsequent `query` emit `count` items and then an error.
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.write().expect("lock poisoned") = Some(count);
    }

    fn snapshot(&self, filter: &QueryFilter) -> Vec<FeatureResult> {
        let features = self.features.read().expect("lock poisoned");
        let mut items: Vec<FeatureResult> = features
            .iter()
            .filter(|feature| filter.matches(feature))
            .take(filter.limit())
            .cloned()
            .map(Ok)
            .collect();
        let fail_after = *self
            .fail_after
            .read()
            .expect("lock poisoned");
        if let Some(count) = fail_after {
            items.truncate(count);
            items.push(Err(StoreError::Write {
                id: self.id.clone(),
                reason: "injected mid-stream failure".to_owned(),
            }));
        }
        items
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn store_type(&self) -> &str {
        "memory"
    }

    fn version(&self) -> u32 {
        1
    }

    fn status(&self) -> StoreStatus {
        *self.status.read().expect("lock poisoned")
    }

    async fn start(&self) -> Result<(), StoreError> {
        self.set_status(StoreStatus::Running);
        Ok(())
    }

    async fn stop(&self) {
        self.set_status(StoreStatus::Stopped);
    }

    async fn pause(&self) {
        self.set_status(StoreStatus::Paused);
    }

    async fn resume(&self) -> Result<(), StoreError> {
        self.set_status(StoreStatus::Running);
        Ok(())
    }

    fn query(&self, filter: &QueryFilter) -> FeatureStream {
        stream::iter(self.snapshot(filter)).boxed()
    }

    fn query_by_id(&self, key: &KeyTuple) -> FeatureStream {
        let features = self.features.read().expect("lock poisoned");
        let found = features.iter().find(|f| f.key() == *key).cloned();
        stream::iter(found.into_iter().map(Ok)).boxed()
    }

    async fn create(&self, mut feature: SpatialFeature) -> Result<SpatialFeature, StoreError> {
        feature.store_id = self.id.clone();
        self.features
            .write()
            .expect("lock poisoned")
            .push(feature.clone());
        self.pending
            .write()
            .expect("lock poisoned")
            .insert(feature.key());
        let _ = self.edited_tx.send(feature.clone());
        Ok(feature)
    }

    async fn update(&self, mut feature: SpatialFeature) -> Result<bool, StoreError> {
        feature.touch();
        let mut features = self
            .features
            .write()
            .expect("lock poisoned");
        let Some(slot) = features
            .iter_mut()
            .find(|f| f.layer_id == feature.layer_id && f.id == feature.id)
        else {
            return Err(StoreError::Write {
                id: self.id.clone(),
                reason: format!("no record {}", feature.key()),
            });
        };
        *slot = feature.clone();
        drop(features);
        self.pending
            .write()
            .expect("lock poisoned")
            .insert(feature.key());
        let _ = self.edited_tx.send(feature);
        Ok(true)
    }

    async fn delete(&self, key: &KeyTuple) -> Result<bool, StoreError> {
        let mut features = self
            .features
            .write()
            .expect("lock poisoned");
        let before = features.len();
        features.retain(|f| f.key() != *key);
        Ok(features.len() < before)
    }

    fn edited(&self) -> BoxStream<'static, SpatialFeature> {
        BroadcastStream::new(self.edited_tx.subscribe())
            .filter_map(|item| async move { item.ok() })
            .boxed()
    }

    fn as_syncable(&self) -> Option<&dyn SyncableStore> {
        Some(self)
    }
}

#[async_trait]
impl SyncableStore for MemoryStore {
    fn sync_topic(&self) -> String {
        format!("sync/{}", self.id)
    }

    async fn unsent(&self) -> Vec<SpatialFeature> {
        let pending = self
            .pending
            .read()
            .expect("lock poisoned")
            .clone();
        self.features
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|f| pending.contains(&f.key()))
            .cloned()
            .collect()
    }

    async fn mark_sent(&self, key: &KeyTuple) -> bool {
        self.pending
            .write()
            .expect("lock poisoned")
            .remove(key)
    }
}
