//! Facade crate for the geofed data-synchronization engine.
//!
//! This crate re-exports the core domain types, the built-in store
//! implementations, the orchestration layer, and the sync engine.

#![forbid(unsafe_code)]

pub use geofed_core::{
    DataStore, FeatureResult, FeatureStream, KeyError, KeyTuple, PropertyValue, QueryFilter,
    QueryFilterError, Service, ServiceError, ServiceStatus, SpatialFeature, SpatialPredicate,
    StoreConfig, StoreError, StoreStatus, SyncableStore,
};

pub use geofed_service::{DataService, GraphError, ServiceGraph};

pub use geofed_stores::{
    FeatureTable, FormStore, GeoJsonStore, LocationStore, StoreRegistry, WfsStore,
};

pub use geofed_sync::{
    Broker, ConfigCache, ConfigUpdate, Engine, EngineBuilder, FormConfig, InMemoryBroker,
    SyncDispatcher, SyncEnvelope, SyncError, SyncReply,
};
