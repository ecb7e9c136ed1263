//! Remote WFS store.
//!
//! Each query issues a fresh `GetFeature` request with
//! `outputFormat=application/json` and parses the returned feature
//! collection, so results always reflect the remote state. The store is
//! read-only: WFS endpoints accept no mutations through this adapter.
//!
//! Startup probes the endpoint with a `GetCapabilities` request; an
//! unreachable host leaves the store `Stopped`. Lost connectivity is
//! reported by pausing the store, and `resume()` re-probes.

use std::sync::RwLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use log::warn;
use serde_json::Value;

use geofed_core::{
    DataStore, FeatureResult, FeatureStream, GeoJsonError, KeyTuple, QueryFilter, SpatialFeature,
    StoreConfig, StoreError, StoreStatus, geojson,
};

/// The remote endpoint a [`WfsStore`] reads from.
///
/// Cloneable so that each lazy query stream owns its own handle.
#[derive(Clone)]
struct WfsEndpoint {
    id: String,
    base_url: String,
    type_names: Vec<String>,
    client: reqwest::Client,
}

impl WfsEndpoint {
    async fn probe(&self) -> Result<(), StoreError> {
        self.client
            .get(&self.base_url)
            .query(&[("service", "WFS"), ("request", "GetCapabilities")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| StoreError::Http {
                id: self.id.clone(),
                reason: error.to_string(),
            })?;
        Ok(())
    }

    fn request_params(&self, filter: &QueryFilter) -> Vec<(String, String)> {
        let mut params = vec![
            ("service".to_owned(), "WFS".to_owned()),
            ("version".to_owned(), "2.0.0".to_owned()),
            ("request".to_owned(), "GetFeature".to_owned()),
            ("outputFormat".to_owned(), "application/json".to_owned()),
            ("count".to_owned(), filter.limit().to_string()),
        ];
        let layers: Vec<String> = if filter.layer_ids().is_empty() {
            self.type_names.clone()
        } else {
            filter.layer_ids().iter().cloned().collect()
        };
        if !layers.is_empty() {
            params.push(("typeNames".to_owned(), layers.join(",")));
        }
        if let Some(predicate) = filter.predicate() {
            let rect = predicate.rect();
            params.push((
                "bbox".to_owned(),
                format!(
                    "{},{},{},{}",
                    rect.min().x,
                    rect.min().y,
                    rect.max().x,
                    rect.max().y
                ),
            ));
        }
        params
    }

    async fn fetch(&self, filter: QueryFilter) -> Result<Vec<FeatureResult>, StoreError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.request_params(&filter))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| StoreError::Http {
                id: self.id.clone(),
                reason: error.to_string(),
            })?;
        let value: Value = response.json().await.map_err(|error| StoreError::Http {
            id: self.id.clone(),
            reason: error.to_string(),
        })?;
        let raw_features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Geometry {
                id: self.id.clone(),
                source: GeoJsonError::MissingMember("features"),
            })?;
        let default_layer = self
            .type_names
            .first()
            .cloned()
            .unwrap_or_else(|| "features".to_owned());
        let mut items = Vec::new();
        for raw in raw_features {
            let layer = raw
                .get("properties")
                .and_then(|p| p.get("layer"))
                .and_then(Value::as_str)
                .unwrap_or(&default_layer);
            // The endpoint already filtered by bbox and layer, but servers
            // differ in strictness; re-apply the filter locally.
            match geojson::feature_from_json(raw, &self.id, layer) {
                Ok(feature) if filter.matches(&feature) => items.push(Ok(feature)),
                Ok(_) => {}
                Err(source) => items.push(Err(StoreError::Geometry {
                    id: self.id.clone(),
                    source,
                })),
            }
            if items.len() >= filter.limit() {
                break;
            }
        }
        Ok(items)
    }
}

/// Store reading features from a remote WFS endpoint.
pub struct WfsStore {
    name: String,
    version: u32,
    endpoint: WfsEndpoint,
    status: RwLock<StoreStatus>,
}

impl WfsStore {
    /// Build a store from its configuration record.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version,
            endpoint: WfsEndpoint {
                id: config.id_or_generate(),
                base_url: config.uri.clone(),
                type_names: config.default_layers.clone(),
                client: reqwest::Client::new(),
            },
            status: RwLock::new(StoreStatus::Stopped),
        }
    }

    fn set_status(&self, status: StoreStatus) {
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = status;
    }
}

#[async_trait]
impl DataStore for WfsStore {
    fn id(&self) -> &str {
        &self.endpoint.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn store_type(&self) -> &str {
        "wfs"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn status(&self) -> StoreStatus {
        *self.status.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn start(&self) -> Result<(), StoreError> {
        self.set_status(StoreStatus::Started);
        match self.endpoint.probe().await {
            Ok(()) => {
                self.set_status(StoreStatus::Running);
                Ok(())
            }
            Err(error) => {
                warn!("store {}: endpoint unreachable: {error}", self.endpoint.id);
                self.set_status(StoreStatus::Stopped);
                Err(error)
            }
        }
    }

    async fn stop(&self) {
        self.set_status(StoreStatus::Stopped);
    }

    async fn pause(&self) {
        self.set_status(StoreStatus::Paused);
    }

    async fn resume(&self) -> Result<(), StoreError> {
        match self.endpoint.probe().await {
            Ok(()) => {
                self.set_status(StoreStatus::Running);
                Ok(())
            }
            Err(error) => {
                self.set_status(StoreStatus::Paused);
                Err(error)
            }
        }
    }

    fn query(&self, filter: &QueryFilter) -> FeatureStream {
        if self.status() != StoreStatus::Running {
            return stream::empty().boxed();
        }
        let endpoint = self.endpoint.clone();
        let filter = filter.clone();
        stream::once(async move { endpoint.fetch(filter).await })
            .map(|result| {
                stream::iter(match result {
                    Ok(items) => items,
                    Err(error) => vec![Err(error)],
                })
            })
            .flatten()
            .boxed()
    }

    fn query_by_id(&self, key: &KeyTuple) -> FeatureStream {
        let feature_id = key.feature_id.clone();
        let filter = QueryFilter::new().with_layer(key.layer_id.clone());
        self.query(&filter)
            .filter(move |item| {
                let keep = match item {
                    Ok(feature) => feature.id == feature_id,
                    Err(_) => true,
                };
                async move { keep }
            })
            .take(1)
            .boxed()
    }

    async fn create(&self, _feature: SpatialFeature) -> Result<SpatialFeature, StoreError> {
        Err(StoreError::Unsupported {
            id: self.endpoint.id.clone(),
            operation: "create",
        })
    }

    async fn update(&self, _feature: SpatialFeature) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported {
            id: self.endpoint.id.clone(),
            operation: "update",
        })
    }

    async fn delete(&self, _key: &KeyTuple) -> Result<bool, StoreError> {
        Err(StoreError::Unsupported {
            id: self.endpoint.id.clone(),
            operation: "delete",
        })
    }

    fn edited(&self) -> BoxStream<'static, SpatialFeature> {
        // Read-only store: nothing is ever edited locally.
        stream::empty().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store() -> WfsStore {
        WfsStore::from_config(&StoreConfig {
            store_type: "wfs".to_owned(),
            version: 2,
            uri: "http://127.0.0.1:1/wfs".to_owned(),
            id: Some("W1".to_owned()),
            name: "remote".to_owned(),
            default_layers: vec!["roads".to_owned(), "rivers".to_owned()],
        })
    }

    #[rstest]
    fn request_carries_wfs_parameters() {
        let store = store();
        let filter = QueryFilter::new()
            .with_predicate(geofed_core::SpatialPredicate::within([
                -10.0, -10.0, 10.0, 10.0,
            ]))
            .with_limit(25)
            .unwrap();
        let params = store.endpoint.request_params(&filter);
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("request").as_deref(), Some("GetFeature"));
        assert_eq!(get("count").as_deref(), Some("25"));
        assert_eq!(get("typeNames").as_deref(), Some("roads,rivers"));
        assert_eq!(get("bbox").as_deref(), Some("-10,-10,10,10"));
    }

    #[rstest]
    fn layer_restriction_overrides_default_type_names() {
        let store = store();
        let filter = QueryFilter::new().with_layer("buildings");
        let params = store.endpoint.request_params(&filter);
        assert!(params.contains(&("typeNames".to_owned(), "buildings".to_owned())));
    }

    #[tokio::test]
    async fn unreachable_host_leaves_store_stopped() {
        let store = store();
        assert!(store.start().await.is_err());
        assert_eq!(store.status(), StoreStatus::Stopped);
    }

    #[tokio::test]
    async fn query_outside_running_is_empty() {
        use futures_util::StreamExt as _;
        let store = store();
        let found: Vec<_> = store.query(&QueryFilter::new()).collect().await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn mutations_are_unsupported() {
        let store = store();
        let result = store.create(SpatialFeature::new("W1", "roads")).await;
        assert!(matches!(result, Err(StoreError::Unsupported { .. })));
    }
}
