//! Spatial features and their typed property values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geo::{BoundingRect, Geometry, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::KeyTuple;

/// A dynamically-typed property value carried by a feature.
///
/// Modelled as a tagged variant rather than an untyped map value so that
/// serialization and column-type inference stay exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// UTF-8 text.
    Text(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Opaque byte blob.
    Bytes(Vec<u8>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// One geographic record, addressed by (store, layer, feature) id.
///
/// A feature may be non-spatial: `geometry` is optional. The triple
/// `store_id`/`layer_id`/`id` addresses exactly one persisted record once
/// committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFeature {
    /// Feature identifier, generated when the caller supplies none.
    pub id: String,
    /// Identifier of the owning store.
    pub store_id: String,
    /// Identifier of the layer within the store.
    pub layer_id: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last-modification timestamp.
    pub modified: DateTime<Utc>,
    /// Optional geometry; `None` marks a non-spatial record.
    pub geometry: Option<Geometry<f64>>,
    /// Typed attribute map.
    pub properties: BTreeMap<String, PropertyValue>,
}

impl SpatialFeature {
    /// Create a feature with a freshly generated identifier.
    pub fn new(store_id: impl Into<String>, layer_id: impl Into<String>) -> Self {
        Self::with_id(store_id, layer_id, Uuid::new_v4().to_string())
    }

    /// Create a feature with a caller-supplied identifier.
    pub fn with_id(
        store_id: impl Into<String>,
        layer_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            store_id: store_id.into(),
            layer_id: layer_id.into(),
            created: now,
            modified: now,
            geometry: None,
            properties: BTreeMap::new(),
        }
    }

    /// Attach a geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Attach one property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The composite key addressing this feature.
    pub fn key(&self) -> KeyTuple {
        KeyTuple::new(
            self.store_id.clone(),
            self.layer_id.clone(),
            self.id.clone(),
        )
    }

    /// Axis-aligned bounding rectangle of the geometry, if any.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometry.as_ref().and_then(BoundingRect::bounding_rect)
    }

    /// Refresh the modification timestamp.
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}
