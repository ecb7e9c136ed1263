//! Concrete store implementations for the geofed engine.
//!
//! Four store variants sit behind the [`geofed_core::DataStore`] contract:
//! embedded GeoJSON bundles, remote WFS endpoints, form records, and
//! location tracks. A [`StoreRegistry`] keyed by store type string builds
//! them from [`geofed_core::StoreConfig`] records.

#![forbid(unsafe_code)]

mod form;
mod geojson;
mod location;
mod registry;
mod table;
mod wfs;

pub use form::{ColumnType, FormStore, column_type};
pub use geojson::GeoJsonStore;
pub use location::LocationStore;
pub use registry::StoreRegistry;
pub use table::FeatureTable;
pub use wfs::WfsStore;
