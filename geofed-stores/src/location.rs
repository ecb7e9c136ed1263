//! Location-tracking store.
//!
//! An append-only store of device positions. Tracks are immutable history:
//! `create` appends a point, while `update` and `delete` are rejected.

use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use geofed_core::{
    DataStore, FeatureStream, KeyTuple, QueryFilter, SpatialFeature, StoreConfig, StoreError,
    StoreStatus, SyncableStore,
};

use crate::table::FeatureTable;

/// Layer all positions are appended to.
const TRACK_LAYER: &str = "locations";

/// Append-only store of location fixes.
pub struct LocationStore {
    id: String,
    name: String,
    version: u32,
    status: RwLock<StoreStatus>,
    table: FeatureTable,
}

impl LocationStore {
    /// Build a store from its configuration record.
    pub fn from_config(config: &StoreConfig) -> Self {
        let id = config.id_or_generate();
        Self {
            table: FeatureTable::new(id.clone()),
            name: config.name.clone(),
            version: config.version,
            status: RwLock::new(StoreStatus::Stopped),
            id,
        }
    }

    fn set_status(&self, status: StoreStatus) {
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }
}

#[async_trait]
impl DataStore for LocationStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn store_type(&self) -> &str {
        "location"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn status(&self) -> StoreStatus {
        *self.status.read().unwrap_or_else(std::sync::PoisonError::into_inner)
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
        self.table.query(filter)
    }

    fn query_by_id(&self, key: &KeyTuple) -> FeatureStream {
        stream::iter(self.table.get(key).into_iter().map(Ok)).boxed()
    }

    async fn create(&self, mut feature: SpatialFeature) -> Result<SpatialFeature, StoreError> {
        if feature.geometry.is_none() {
            return Err(StoreError::Write {
                id: self.id.clone(),
                reason: "a location fix requires a geometry".to_owned(),
            });
        }
        feature.layer_id = TRACK_LAYER.to_owned();
        self.table.create(feature)
    }

    async fn update(&self, _feature: SpatialFeature) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported {
            id: self.id.clone(),
            operation: "update",
        })
    }

    async fn delete(&self, _key: &KeyTuple) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported {
            id: self.id.clone(),
            operation: "delete",
        })
    }

    fn edited(&self) -> BoxStream<'static, SpatialFeature> {
        self.table.edited()
    }

    fn as_syncable(&self) -> Option<&dyn SyncableStore> {
        Some(self)
    }
}

#[async_trait]
impl SyncableStore for LocationStore {
    fn sync_topic(&self) -> String {
        format!("sync/locations/{}", self.id)
    }

    async fn unsent(&self) -> Vec<SpatialFeature> {
        self.table.unsent()
    }

    async fn mark_sent(&self, key: &KeyTuple) -> bool {
        self.table.mark_sent(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Geometry, Point};

    fn store() -> LocationStore {
        LocationStore::from_config(&StoreConfig {
            store_type: "location".to_owned(),
            version: 1,
            uri: String::new(),
            id: Some("L1".to_owned()),
            name: "device tracks".to_owned(),
            default_layers: Vec::new(),
        })
    }

    #[tokio::test]
    async fn appends_fixes_to_the_track_layer() {
        let store = store();
        store.start().await.unwrap();
        let fix = SpatialFeature::new("L1", "ignored")
            .with_geometry(Geometry::Point(Point::new(1.0, 2.0)));
        let created = store.create(fix).await.unwrap();
        assert_eq!(created.layer_id, "locations");
        assert_eq!(store.unsent().await.len(), 1);
    }

    #[tokio::test]
    async fn rejects_non_spatial_fixes() {
        let store = store();
        store.start().await.unwrap();
        let result = store.create(SpatialFeature::new("L1", "locations")).await;
        assert!(matches!(result, Err(StoreError::Write { .. })));
    }

    #[tokio::test]
    async fn track_history_is_immutable() {
        let store = store();
        let key = KeyTuple::new("L1", "locations", "f");
        assert!(matches!(
            store.update(SpatialFeature::new("L1", "locations")).await,
            Err(StoreError::Unsupported { .. })
        ));
        assert!(matches!(
            store.delete(&key).await,
            Err(StoreError::Unsupported { .. })
        ));
    }
}
