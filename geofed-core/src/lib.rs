//! Core domain types and trait seams for the geofed engine.
//!
//! This crate defines the vocabulary shared by every other geofed crate:
//! composite feature keys, spatial features with typed property values,
//! query filters, the polymorphic [`DataStore`] contract, and the
//! [`Service`] lifecycle contract driven by the orchestrator.
//!
//! Constructors validate their input and return `Result` so that invalid
//! state is surfaced at the boundary rather than deep inside a store.

#![forbid(unsafe_code)]

mod config;
mod feature;
mod filter;
pub mod geojson;
mod key;
mod service;
mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::StoreConfig;
pub use feature::{PropertyValue, SpatialFeature};
pub use filter::{DEFAULT_LIMIT, QueryFilter, QueryFilterError, SpatialPredicate};
pub use geojson::GeoJsonError;
pub use key::{KeyError, KeyTuple};
pub use service::{Service, ServiceError, ServiceStatus};
pub use store::{
    DataStore, FeatureResult, FeatureStream, StoreError, StoreStatus, SyncableStore,
};
