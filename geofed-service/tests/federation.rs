//! End-to-end federated query behaviour over the data service.

use std::sync::Arc;

use futures_util::StreamExt;
use geo::{Geometry, Point};
use geofed_core::test_support::MemoryStore;
use geofed_core::{
    DataStore, QueryFilter, SpatialFeature, SpatialPredicate, StoreError, StoreStatus,
};
use geofed_service::DataService;

fn point_feature(store_id: &str, layer: &str, x: f64, y: f64) -> SpatialFeature {
    SpatialFeature::new(store_id, layer).with_geometry(Geometry::Point(Point::new(x, y)))
}

fn bbox_filter() -> QueryFilter {
    QueryFilter::new().with_predicate(SpatialPredicate::within([-10.0, -10.0, 10.0, 10.0]))
}

/// Two running stores, one matching feature: the merged stream must carry
/// exactly that feature, tagged with its source store.
#[tokio::test]
async fn federated_query_merges_matching_features() {
    let service = DataService::new();
    service
        .register(Arc::new(MemoryStore::running_with(
            "S1",
            vec![
                point_feature("S1", "poi", 0.0, 0.0),
                point_feature("S1", "poi", 50.0, 50.0),
                point_feature("S1", "poi", -80.0, 12.0),
            ],
        )))
        .unwrap();
    service
        .register(Arc::new(MemoryStore::running_with(
            "S2",
            vec![
                point_feature("S2", "poi", 90.0, 0.0),
                point_feature("S2", "poi", 0.0, 80.0),
            ],
        )))
        .unwrap();

    let results: Vec<_> = service.query_all_stores(&bbox_filter()).collect().await;
    assert_eq!(results.len(), 1);
    let feature = results[0].as_ref().unwrap();
    assert_eq!(feature.store_id, "S1");
}

/// A mid-stream failure in one store surfaces as an `Err` item while the
/// sibling store's results still arrive intact.
#[tokio::test]
async fn one_failing_store_does_not_cancel_siblings() {
    let service = DataService::new();
    let flaky = Arc::new(MemoryStore::running_with(
        "flaky",
        vec![point_feature("flaky", "poi", 1.0, 1.0)],
    ));
    flaky.fail_after(0);
    service.register(flaky).unwrap();
    service
        .register(Arc::new(MemoryStore::running_with(
            "steady",
            vec![
                point_feature("steady", "poi", 2.0, 2.0),
                point_feature("steady", "poi", 3.0, 3.0),
            ],
        )))
        .unwrap();

    let results: Vec<_> = service.query_all_stores(&bbox_filter()).collect().await;
    let errors = results.iter().filter(|item| item.is_err()).count();
    let features: Vec<_> = results
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .collect();
    assert_eq!(errors, 1);
    assert_eq!(features.len(), 2);
    assert!(features.iter().all(|f| f.store_id == "steady"));
}

/// Stores that are not `Running` are silently skipped by the federated
/// query instead of failing it.
#[tokio::test]
async fn non_running_stores_are_skipped() {
    let service = DataService::new();
    let paused = Arc::new(MemoryStore::running_with(
        "paused",
        vec![point_feature("paused", "poi", 0.0, 0.0)],
    ));
    paused.set_status(StoreStatus::Paused);
    service.register(paused).unwrap();
    service
        .register(Arc::new(MemoryStore::running_with(
            "up",
            vec![point_feature("up", "poi", 1.0, 1.0)],
        )))
        .unwrap();

    let results: Vec<_> = service.query_all_stores(&bbox_filter()).collect().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().store_id, "up");
}

/// A direct single-store query of a known but non-running store completes
/// empty; an unknown id is a hard failure.
#[tokio::test]
async fn single_store_query_policies() {
    let service = DataService::new();
    let store = Arc::new(MemoryStore::running_with(
        "S1",
        vec![point_feature("S1", "poi", 0.0, 0.0)],
    ));
    store.set_status(StoreStatus::Stopped);
    service.register(store).unwrap();

    let empty: Vec<_> = service.query_store("S1", &bbox_filter()).collect().await;
    assert!(empty.is_empty());

    let missing: Vec<_> = service
        .query_store("nowhere", &bbox_filter())
        .collect()
        .await;
    assert_eq!(missing.len(), 1);
    assert!(matches!(
        missing[0],
        Err(StoreError::UnknownStore(ref id)) if id == "nowhere"
    ));
}

/// Targeted federation only consults the named stores.
#[tokio::test]
async fn federation_by_ids_restricts_the_target_set() {
    let service = DataService::new();
    service
        .register(Arc::new(MemoryStore::running_with(
            "S1",
            vec![point_feature("S1", "poi", 0.0, 0.0)],
        )))
        .unwrap();
    service
        .register(Arc::new(MemoryStore::running_with(
            "S2",
            vec![point_feature("S2", "poi", 1.0, 1.0)],
        )))
        .unwrap();

    let results: Vec<_> = service
        .query_stores_by_ids(&["S2".to_owned()], &bbox_filter())
        .collect()
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().store_id, "S2");
}

/// Mutations route to the store named by the feature's own `store_id`.
#[tokio::test]
async fn mutations_route_by_store_id() {
    let service = DataService::new();
    service
        .register(Arc::new(MemoryStore::running_with("S1", Vec::new())))
        .unwrap();

    let created = service
        .create(point_feature("S1", "poi", 3.0, 4.0))
        .await
        .unwrap();
    assert_eq!(created.store_id, "S1");

    let err = service
        .create(point_feature("ghost", "poi", 0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownStore(_)));

    let deleted = service.delete(&created.key()).await.unwrap();
    assert!(deleted);
}

/// Edits made through any registered store show up on the aggregated feed.
#[tokio::test]
async fn aggregated_edit_feed_carries_store_edits() {
    let service = DataService::new();
    let store = Arc::new(MemoryStore::running_with("S1", Vec::new()));
    service.register(Arc::clone(&store) as Arc<dyn DataStore>).unwrap();

    let mut edits = service.edited();
    let created = store
        .create(point_feature("S1", "poi", 1.0, 2.0))
        .await
        .unwrap();

    let observed = tokio::time::timeout(std::time::Duration::from_secs(1), edits.next())
        .await
        .expect("edit notification should arrive")
        .expect("feed should stay open");
    assert_eq!(observed.id, created.id);
    assert_eq!(observed.store_id, "S1");
}
