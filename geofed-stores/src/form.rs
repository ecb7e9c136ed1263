//! Form-record store.
//!
//! Forms are non-spatial (or optionally georeferenced) records grouped by
//! form layer. The store infers one column type per field from the typed
//! property values it holds, which keeps downstream tabular rendering and
//! serialization exhaustive.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};

use geofed_core::{
    DataStore, FeatureStream, KeyTuple, PropertyValue, QueryFilter, SpatialFeature, StoreConfig,
    StoreError, StoreStatus, SyncableStore,
};

use crate::table::FeatureTable;

/// Column type inferred from a form field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// UTF-8 text column.
    Text,
    /// Signed integer column.
    Integer,
    /// Floating-point column.
    Real,
    /// Boolean column.
    Boolean,
    /// Opaque blob column.
    Blob,
}

/// Infer the column type for one property value.
pub fn column_type(value: &PropertyValue) -> ColumnType {
    match value {
        PropertyValue::Text(_) => ColumnType::Text,
        PropertyValue::Integer(_) => ColumnType::Integer,
        PropertyValue::Real(_) => ColumnType::Real,
        PropertyValue::Boolean(_) => ColumnType::Boolean,
        PropertyValue::Bytes(_) => ColumnType::Blob,
    }
}

/// Store holding submitted form records, one layer per form.
pub struct FormStore {
    id: String,
    name: String,
    version: u32,
    status: RwLock<StoreStatus>,
    table: FeatureTable,
}

impl FormStore {
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

    /// Infer the column schema of one form layer from its records.
    ///
    /// A field that appears with more than one value type widens to
    /// [`ColumnType::Text`].
    pub async fn infer_columns(&self, layer_id: &str) -> BTreeMap<String, ColumnType> {
        let filter = QueryFilter::new().with_layer(layer_id);
        let mut columns: BTreeMap<String, ColumnType> = BTreeMap::new();
        let mut records = self.table.query(&filter);
        while let Some(Ok(record)) = records.next().await {
            for (field, value) in &record.properties {
                let inferred = column_type(value);
                columns
                    .entry(field.clone())
                    .and_modify(|current| {
                        if *current != inferred {
                            *current = ColumnType::Text;
                        }
                    })
                    .or_insert(inferred);
            }
        }
        columns
    }
}

#[async_trait]
impl DataStore for FormStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn store_type(&self) -> &str {
        "form"
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
impl SyncableStore for FormStore {
    fn sync_topic(&self) -> String {
        format!("sync/forms/{}", self.id)
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
    use rstest::rstest;

    fn store() -> FormStore {
        FormStore::from_config(&StoreConfig {
            store_type: "form".to_owned(),
            version: 1,
            uri: String::new(),
            id: Some("F1".to_owned()),
            name: "survey forms".to_owned(),
            default_layers: Vec::new(),
        })
    }

    #[rstest]
    #[case(PropertyValue::Text("x".to_owned()), ColumnType::Text)]
    #[case(PropertyValue::Integer(1), ColumnType::Integer)]
    #[case(PropertyValue::Real(1.5), ColumnType::Real)]
    #[case(PropertyValue::Boolean(true), ColumnType::Boolean)]
    #[case(PropertyValue::Bytes(vec![1, 2]), ColumnType::Blob)]
    fn column_types_are_exhaustive(#[case] value: PropertyValue, #[case] expected: ColumnType) {
        assert_eq!(column_type(&value), expected);
    }

    #[tokio::test]
    async fn infers_columns_per_form_layer() {
        let store = store();
        store.start().await.unwrap();
        store
            .create(
                SpatialFeature::new("F1", "survey")
                    .with_property("comment", "dry")
                    .with_property("depth", 3.5),
            )
            .await
            .unwrap();
        store
            .create(
                SpatialFeature::new("F1", "survey")
                    .with_property("comment", "wet")
                    .with_property("flooded", true),
            )
            .await
            .unwrap();
        let columns = store.infer_columns("survey").await;
        assert_eq!(columns["comment"], ColumnType::Text);
        assert_eq!(columns["depth"], ColumnType::Real);
        assert_eq!(columns["flooded"], ColumnType::Boolean);
    }

    #[tokio::test]
    async fn conflicting_field_types_widen_to_text() {
        let store = store();
        store.start().await.unwrap();
        store
            .create(SpatialFeature::new("F1", "survey").with_property("v", 1i64))
            .await
            .unwrap();
        store
            .create(SpatialFeature::new("F1", "survey").with_property("v", "one"))
            .await
            .unwrap();
        let columns = store.infer_columns("survey").await;
        assert_eq!(columns["v"], ColumnType::Text);
    }
}
