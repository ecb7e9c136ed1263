//! The polymorphic data-store contract.
//!
//! Every concrete store — embedded bundle, remote WFS endpoint, form store,
//! location tracker — implements [`DataStore`]. Queries return lazy,
//! per-call-restartable streams; mutations are single-result async
//! operations. Stores that track locally-edited, unacknowledged records
//! additionally implement [`SyncableStore`], the only hook the sync
//! dispatcher needs.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::{GeoJsonError, KeyError, KeyTuple, QueryFilter, SpatialFeature, geojson};

/// Lifecycle state of a data store.
///
/// Transitions: `Stopped → Started → (Downloading →) Running`,
/// `Running ⇄ Paused`, and any state `→ Stopped`. A store that cannot reach
/// its data source surfaces `Stopped` rather than silently returning empty
/// results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// Not started, or terminally failed.
    Stopped,
    /// `start()` accepted; content not yet available.
    Started,
    /// Remote content is being fetched.
    Downloading,
    /// Content ready; queries and mutations are served.
    Running,
    /// Explicitly paused or connectivity lost; resumable.
    Paused,
}

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No store with the given id is registered.
    #[error("no store registered with id {0:?}")]
    UnknownStore(String),
    /// The addressed store exists but is not running.
    #[error("store {id:?} is not running (status {status:?})")]
    NotRunning {
        /// Identifier of the addressed store.
        id: String,
        /// Status observed at dispatch time.
        status: StoreStatus,
    },
    /// A store with this id is already registered.
    #[error("a store with id {0:?} is already registered")]
    DuplicateStore(String),
    /// No builder is registered for the configured store type.
    #[error("unknown store type {0:?}")]
    UnknownStoreType(String),
    /// The underlying persistence operation failed.
    #[error("write failed in store {id:?}: {reason}")]
    Write {
        /// Identifier of the store that failed.
        id: String,
        /// Store-specific failure description.
        reason: String,
    },
    /// The store does not support the requested operation.
    #[error("store {id:?} does not support {operation}")]
    Unsupported {
        /// Identifier of the store.
        id: String,
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// Reading the store's backing source failed.
    #[error("failed to read source for store {id:?}: {source}")]
    Source {
        /// Identifier of the store.
        id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The backing source held malformed content.
    #[error("malformed content in store {id:?}: {source}")]
    Parse {
        /// Identifier of the store.
        id: String,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The backing source held a malformed geometry.
    #[error("malformed geometry in store {id:?}: {source}")]
    Geometry {
        /// Identifier of the store.
        id: String,
        /// GeoJSON reader failure.
        #[source]
        source: GeoJsonError,
    },
    /// An HTTP request to a remote store failed.
    #[error("http request failed for store {id:?}: {reason}")]
    Http {
        /// Identifier of the store.
        id: String,
        /// Transport failure description.
        reason: String,
    },
    /// A composite key failed to decode.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// One item of a store result stream.
pub type FeatureResult = Result<SpatialFeature, StoreError>;

/// A lazy, cancellable sequence of features.
///
/// Each `query` invocation produces a fresh stream; dropping the stream
/// cancels it without affecting other subscribers.
pub type FeatureStream = BoxStream<'static, FeatureResult>;

/// Uniform contract over store implementations.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Unique store identifier within a data service.
    fn id(&self) -> &str;

    /// Human-readable store name.
    fn name(&self) -> &str;

    /// Store type string used by the factory registry (`geojson`, `wfs`, …).
    fn store_type(&self) -> &str;

    /// Configuration schema version of the store.
    fn version(&self) -> u32;

    /// Current lifecycle status.
    fn status(&self) -> StoreStatus;

    /// Fraction of remote content fetched so far, in `0.0..=1.0`.
    fn download_progress(&self) -> f64 {
        if self.status() == StoreStatus::Running {
            1.0
        } else {
            0.0
        }
    }

    /// Begin serving content.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the backing source is unreachable or
    /// malformed; the store's status is `Stopped` afterwards.
    async fn start(&self) -> Result<(), StoreError>;

    /// Stop serving and release the underlying connection.
    async fn stop(&self);

    /// Suspend serving; content is retained for `resume`.
    async fn pause(&self);

    /// Return to `Running` after a pause or directly from `Stopped`.
    ///
    /// # Errors
    /// Returns [`StoreError`] when re-probing the backing source fails.
    async fn resume(&self) -> Result<(), StoreError>;

    /// Produce a fresh lazy stream of features matching the filter.
    ///
    /// The filter's predicate, layer restriction, and limit are applied by
    /// the store. Emission order within the stream follows the store's own
    /// retrieval order.
    fn query(&self, filter: &QueryFilter) -> FeatureStream;

    /// Produce a stream of zero or one feature addressed by the key.
    fn query_by_id(&self, key: &KeyTuple) -> FeatureStream;

    /// Persist a new feature, finalizing its id, and return it.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] when persistence fails.
    async fn create(&self, feature: SpatialFeature) -> Result<SpatialFeature, StoreError>;

    /// Replace an existing feature.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] when the target record does not exist.
    async fn update(&self, feature: SpatialFeature) -> Result<bool, StoreError>;

    /// Remove a feature; `false` when no record matched the key.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the store cannot perform deletions.
    async fn delete(&self, key: &KeyTuple) -> Result<bool, StoreError>;

    /// Notification stream of every successfully created or updated feature.
    fn edited(&self) -> BoxStream<'static, SpatialFeature>;

    /// Downcast to the sync capability, when the store tracks unsent edits.
    fn as_syncable(&self) -> Option<&dyn SyncableStore> {
        None
    }
}

/// Capability of stores that track locally-edited, unacknowledged features.
#[async_trait]
pub trait SyncableStore: Send + Sync {
    /// Backend channel this store's edits are published on.
    fn sync_topic(&self) -> String;

    /// Enumerate features edited locally but not yet acknowledged.
    async fn unsent(&self) -> Vec<SpatialFeature>;

    /// Mark one feature as acknowledged; `false` when it was not pending.
    ///
    /// Repeated calls for the same key are harmless: only the first returns
    /// `true`.
    async fn mark_sent(&self, key: &KeyTuple) -> bool;

    /// Store-specific serialization of a feature for the backend.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the feature cannot be serialized.
    fn payload(&self, feature: &SpatialFeature) -> Result<String, StoreError> {
        Ok(geojson::feature_to_json(feature).to_string())
    }
}
