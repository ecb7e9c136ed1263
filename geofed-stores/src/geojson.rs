//! Embedded GeoJSON bundle store.
//!
//! The bundle is a GeoJSON `FeatureCollection` file on local storage.
//! `start()` reads and parses the whole bundle before the store reports
//! `Running`; a missing or malformed bundle leaves the store `Stopped` so
//! that failure is never mistaken for an empty dataset.

use std::sync::RwLock;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use log::{debug, warn};
use serde_json::Value;

use geofed_core::{
    DataStore, FeatureStream, GeoJsonError, KeyTuple, QueryFilter, SpatialFeature, StoreConfig,
    StoreError, StoreStatus, SyncableStore, geojson,
};

use crate::table::FeatureTable;

/// Store serving features from an embedded GeoJSON bundle file.
pub struct GeoJsonStore {
    id: String,
    name: String,
    version: u32,
    path: Utf8PathBuf,
    default_layer: String,
    status: RwLock<StoreStatus>,
    progress: RwLock<f64>,
    table: FeatureTable,
}

impl GeoJsonStore {
    /// Build a store from its configuration record.
    pub fn from_config(config: &StoreConfig) -> Self {
        let id = config.id_or_generate();
        let default_layer = config
            .default_layers
            .first()
            .cloned()
            .unwrap_or_else(|| "features".to_owned());
        Self {
            table: FeatureTable::new(id.clone()),
            name: config.name.clone(),
            version: config.version,
            path: Utf8PathBuf::from(config.uri.clone()),
            default_layer,
            status: RwLock::new(StoreStatus::Stopped),
            progress: RwLock::new(0.0),
            id,
        }
    }

    fn set_status(&self, status: StoreStatus) {
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }

    fn set_progress(&self, progress: f64) {
        *self.progress.write().unwrap_or_else(std::sync::PoisonError::into_inner) = progress;
    }

    async fn load(&self) -> Result<(), StoreError> {
        let text = tokio::fs::read_to_string(self.path.as_std_path())
            .await
            .map_err(|source| StoreError::Source {
                id: self.id.clone(),
                source,
            })?;
        self.set_progress(0.5);
        let value: Value =
            serde_json::from_str(&text).map_err(|source| StoreError::Parse {
                id: self.id.clone(),
                source,
            })?;
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Geometry {
                id: self.id.clone(),
                source: GeoJsonError::MissingMember("features"),
            })?;
        let total = features.len().max(1);
        self.table.clear();
        for (index, raw) in features.iter().enumerate() {
            let layer = raw
                .get("properties")
                .and_then(|p| p.get("layer"))
                .and_then(Value::as_str)
                .unwrap_or(&self.default_layer);
            let feature = geojson::feature_from_json(raw, &self.id, layer).map_err(|source| {
                StoreError::Geometry {
                    id: self.id.clone(),
                    source,
                }
            })?;
            self.table.insert_initial(feature);
            #[allow(clippy::cast_precision_loss, reason = "progress is informational")]
            self.set_progress(0.5 + 0.5 * ((index + 1) as f64 / total as f64));
        }
        debug!(
            "store {}: loaded {} features from {}",
            self.id,
            self.table.len(),
            self.path
        );
        Ok(())
    }
}

#[async_trait]
impl DataStore for GeoJsonStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn store_type(&self) -> &str {
        "geojson"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn status(&self) -> StoreStatus {
        *self.status.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn download_progress(&self) -> f64 {
        *self.progress.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn start(&self) -> Result<(), StoreError> {
        self.set_status(StoreStatus::Started);
        self.set_progress(0.0);
        self.set_status(StoreStatus::Downloading);
        match self.load().await {
            Ok(()) => {
                self.set_progress(1.0);
                self.set_status(StoreStatus::Running);
                Ok(())
            }
            Err(error) => {
                warn!("store {}: start failed: {error}", self.id);
                self.set_status(StoreStatus::Stopped);
                Err(error)
            }
        }
    }

    async fn stop(&self) {
        self.table.clear();
        self.set_progress(0.0);
        self.set_status(StoreStatus::Stopped);
    }

    async fn pause(&self) {
        self.set_status(StoreStatus::Paused);
    }

    async fn resume(&self) -> Result<(), StoreError> {
        if self.status() == StoreStatus::Paused {
            self.set_status(StoreStatus::Running);
            return Ok(());
        }
        self.start().await
    }

    fn query(&self, filter: &QueryFilter) -> FeatureStream {
        self.table.query(filter)
    }

    fn query_by_id(&self, key: &KeyTuple) -> FeatureStream {
        stream::iter(self.table.get(key).into_iter().map(Ok)).boxed()
    }

    async fn create(&self, feature: SpatialFeature) -> Result<SpatialFeature, StoreError> {
        self.table.create(feature)
    }

    async fn update(&self, feature: SpatialFeature) -> Result<bool, StoreError> {
        self.table.update(feature)
    }

    async fn delete(&self, key: &KeyTuple) -> Result<bool, StoreError> {
        Ok(self.table.delete(key))
    }

    fn edited(&self) -> BoxStream<'static, SpatialFeature> {
        self.table.edited()
    }

    fn as_syncable(&self) -> Option<&dyn SyncableStore> {
        Some(self)
    }
}

#[async_trait]
impl SyncableStore for GeoJsonStore {
    fn sync_topic(&self) -> String {
        format!("sync/{}", self.id)
    }

    async fn unsent(&self) -> Vec<SpatialFeature> {
        self.table.unsent()
    }

    async fn mark_sent(&self, key: &KeyTuple) -> bool {
        self.table.mark_sent(key)
    }
}
