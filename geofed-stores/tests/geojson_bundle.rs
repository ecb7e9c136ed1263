//! Lifecycle and query behaviour of the embedded GeoJSON bundle store.

use std::io::Write as _;

use futures_util::StreamExt;
use geofed_core::{
    DataStore, KeyTuple, QueryFilter, SpatialPredicate, StoreConfig, StoreStatus,
};
use geofed_stores::GeoJsonStore;

const BUNDLE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "museum",
      "geometry": {"type": "Point", "coordinates": [1.0, 1.0]},
      "properties": {"name": "museum", "layer": "pois"}
    },
    {
      "type": "Feature",
      "id": "lighthouse",
      "geometry": {"type": "Point", "coordinates": [50.0, 50.0]},
      "properties": {"name": "lighthouse", "layer": "pois"}
    },
    {
      "type": "Feature",
      "id": "note",
      "geometry": null,
      "properties": {"text": "no geometry"}
    }
  ]
}"#;

fn write_bundle(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp bundle");
    file.write_all(content.as_bytes()).expect("write bundle");
    file
}

fn store_for(path: &std::path::Path) -> GeoJsonStore {
    GeoJsonStore::from_config(&StoreConfig {
        store_type: "geojson".to_owned(),
        version: 1,
        uri: path.to_string_lossy().into_owned(),
        id: Some("S1".to_owned()),
        name: "city bundle".to_owned(),
        default_layers: vec!["notes".to_owned()],
    })
}

#[tokio::test]
async fn bundle_load_reaches_running_with_full_progress() {
    let file = write_bundle(BUNDLE);
    let store = store_for(file.path());
    assert_eq!(store.status(), StoreStatus::Stopped);
    store.start().await.expect("bundle must load");
    assert_eq!(store.status(), StoreStatus::Running);
    assert!((store.download_progress() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn bbox_query_filters_features() {
    let file = write_bundle(BUNDLE);
    let store = store_for(file.path());
    store.start().await.expect("bundle must load");
    let filter =
        QueryFilter::new().with_predicate(SpatialPredicate::within([-10.0, -10.0, 10.0, 10.0]));
    let found: Vec<_> = store.query(&filter).collect().await;
    assert_eq!(found.len(), 1);
    let feature = found[0].as_ref().expect("stream item must be a feature");
    assert_eq!(feature.id, "museum");
    assert_eq!(feature.store_id, "S1");
}

#[tokio::test]
async fn features_without_layer_fall_back_to_default() {
    let file = write_bundle(BUNDLE);
    let store = store_for(file.path());
    store.start().await.expect("bundle must load");
    let key = KeyTuple::new("S1", "notes", "note");
    let found: Vec<_> = store.query_by_id(&key).collect().await;
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn malformed_bundle_leaves_store_stopped() {
    let file = write_bundle("{ not json");
    let store = store_for(file.path());
    assert!(store.start().await.is_err());
    assert_eq!(store.status(), StoreStatus::Stopped);
}

#[tokio::test]
async fn missing_bundle_leaves_store_stopped() {
    let store = store_for(std::path::Path::new("/nonexistent/bundle.json"));
    assert!(store.start().await.is_err());
    assert_eq!(store.status(), StoreStatus::Stopped);
}

#[tokio::test]
async fn local_edits_become_unsent_until_acknowledged() {
    let file = write_bundle(BUNDLE);
    let store = store_for(file.path());
    store.start().await.expect("bundle must load");
    let syncable = store.as_syncable().expect("bundle store is sync-capable");
    assert!(syncable.unsent().await.is_empty());

    let created = store
        .create(geofed_core::SpatialFeature::new("S1", "pois").with_property("name", "kiosk"))
        .await
        .expect("create must succeed");
    let unsent = syncable.unsent().await;
    assert_eq!(unsent.len(), 1);
    assert!(syncable.mark_sent(&created.key()).await);
    assert!(syncable.unsent().await.is_empty());
}

#[tokio::test]
async fn stop_releases_content() {
    let file = write_bundle(BUNDLE);
    let store = store_for(file.path());
    store.start().await.expect("bundle must load");
    store.stop().await;
    assert_eq!(store.status(), StoreStatus::Stopped);
    let found: Vec<_> = store.query(&QueryFilter::new()).collect().await;
    assert!(found.is_empty());
}
