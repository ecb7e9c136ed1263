//! End-to-end engine wiring: provisioning, background sync, and inbound
//! configuration traffic.

use std::sync::Arc;
use std::time::Duration;

use geo::{Geometry, Point};
use geofed_core::test_support::MemoryStore;
use geofed_core::{QueryFilter, ServiceStatus, SpatialFeature, StoreConfig, StoreStatus};
use geofed_stores::StoreRegistry;
use geofed_sync::{
    Broker, CONFIG_ADD_STORE, CONFIG_TOPIC, DATA_SERVICE_ID, Engine, InMemoryBroker,
    SYNC_SERVICE_ID, SyncEnvelope,
};

fn memory_registry() -> StoreRegistry {
    let mut registry = StoreRegistry::empty();
    registry.register("memory", |config| {
        Arc::new(MemoryStore::new(config.id_or_generate()))
    });
    registry
}

fn memory_config(id: &str) -> StoreConfig {
    StoreConfig {
        store_type: "memory".to_owned(),
        version: 1,
        uri: String::new(),
        id: Some(id.to_owned()),
        name: format!("memory {id}"),
        default_layers: Vec::new(),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within the deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn start_provisions_configured_stores() {
    let engine = Engine::builder()
        .with_registry(memory_registry())
        .with_store(memory_config("M1"))
        .with_store(memory_config("M2"))
        .build()
        .unwrap();

    engine.start().await;

    assert_eq!(engine.graph().status(DATA_SERVICE_ID), Some(ServiceStatus::Running));
    assert_eq!(engine.graph().status(SYNC_SERVICE_ID), Some(ServiceStatus::Running));
    assert_eq!(engine.data().active_stores().len(), 2);

    engine.stop().await;
    assert_eq!(engine.graph().status(SYNC_SERVICE_ID), Some(ServiceStatus::Stopped));
    assert_eq!(
        engine.data().store("M1").unwrap().status(),
        StoreStatus::Stopped
    );
}

#[tokio::test]
async fn starting_only_sync_pulls_the_data_service_up() {
    let engine = Engine::builder()
        .with_registry(memory_registry())
        .with_store(memory_config("M1"))
        .build()
        .unwrap();

    // The sync service declares `data` as its dependency; the data service
    // declares none. Starting the top of the chain must provision both.
    engine.graph().start_service(SYNC_SERVICE_ID).await.unwrap();

    assert_eq!(engine.graph().status(DATA_SERVICE_ID), Some(ServiceStatus::Running));
    assert_eq!(engine.graph().status(SYNC_SERVICE_ID), Some(ServiceStatus::Running));
    assert_eq!(engine.data().active_stores().len(), 1);

    engine.stop().await;
}

#[tokio::test]
async fn local_edits_reach_the_broker_in_the_background() {
    let broker = Arc::new(InMemoryBroker::auto_acknowledging());
    let engine = Engine::builder()
        .with_broker(Arc::clone(&broker) as Arc<dyn Broker>)
        .with_registry(memory_registry())
        .with_store(memory_config("M1"))
        .with_jwt("token-123")
        .build()
        .unwrap();
    engine.start().await;

    engine
        .data()
        .create(
            SpatialFeature::new("M1", "poi")
                .with_geometry(Geometry::Point(Point::new(3.0, 4.0))),
        )
        .await
        .unwrap();

    // The feature stays enumerable as unsent until acknowledged, so a
    // connectivity pulse retriggers the flush if the edit notification
    // raced the dispatcher's startup.
    let probe = Arc::clone(&broker);
    wait_until(move || {
        if probe.published().is_empty() {
            probe.set_connected(false);
            probe.set_connected(true);
            return false;
        }
        true
    })
    .await;
    let envelope = broker.published().remove(0);
    assert_eq!(envelope.to, "sync/M1");
    assert_eq!(envelope.jwt, "token-123");

    engine.stop().await;
}

#[tokio::test]
async fn inbound_config_adds_a_queryable_store() {
    let broker = Arc::new(InMemoryBroker::auto_acknowledging());
    let engine = Engine::builder()
        .with_broker(Arc::clone(&broker) as Arc<dyn Broker>)
        .with_registry(memory_registry())
        .build()
        .unwrap();
    engine.start().await;

    // Repeat the publication while polling: broadcast traffic sent before
    // the dispatcher subscribes is not replayed.
    let data = Arc::clone(engine.data());
    let publisher = Arc::clone(&broker);
    wait_until(move || {
        if data.store("M9").is_some() {
            return true;
        }
        publisher.push_inbound(SyncEnvelope {
            action: CONFIG_ADD_STORE,
            payload: serde_json::to_string(&memory_config("M9")).unwrap(),
            to: CONFIG_TOPIC.to_owned(),
            correlation_id: 1,
            jwt: String::new(),
        });
        false
    })
    .await;
    assert_eq!(
        engine.data().store("M9").unwrap().status(),
        StoreStatus::Running
    );
    assert_eq!(engine.config().store("M9").unwrap().name, "memory M9");

    // The new store participates in federated queries.
    use futures_util::StreamExt;
    engine
        .data()
        .create(SpatialFeature::new("M9", "poi").with_property("note", "hi"))
        .await
        .unwrap();
    let results: Vec<_> = engine.query(&QueryFilter::new()).collect().await;
    assert_eq!(results.len(), 1);

    engine.stop().await;
}
