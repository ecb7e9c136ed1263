//! Application context.
//!
//! An [`Engine`] owns the whole runtime wiring: the service graph, the data
//! service, the store registry, the cached configuration, and the broker
//! handle. There are no global singletons; the application constructs one
//! engine and passes references down. Tests build one engine per case.
//!
//! Two services are registered out of the box: `data`, which provisions
//! stores from the cached configuration, and `sync`, which depends on
//! `data` and runs the dispatcher in a background task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use tokio::task::JoinHandle;

use geofed_core::{
    FeatureStream, QueryFilter, Service, ServiceError, ServiceStatus, StoreConfig, StoreStatus,
};
use geofed_service::{DataService, GraphError, ServiceGraph};
use geofed_stores::StoreRegistry;

use crate::broker::{Broker, InMemoryBroker};
use crate::cache::ConfigCache;
use crate::dispatcher::{DEFAULT_REPLY_TIMEOUT, SyncDispatcher};

/// Graph id of the store-provisioning service.
pub const DATA_SERVICE_ID: &str = "data";
/// Graph id of the sync service.
pub const SYNC_SERVICE_ID: &str = "sync";

/// Provisions data stores from the cached configuration.
struct DataProvisioner {
    data: Arc<DataService>,
    registry: Arc<StoreRegistry>,
    cache: Arc<ConfigCache>,
    status: RwLock<ServiceStatus>,
}

#[async_trait]
impl Service for DataProvisioner {
    fn id(&self) -> &str {
        DATA_SERVICE_ID
    }

    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    fn status(&self) -> ServiceStatus {
        *self.status.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn start(
        &self,
        _dependencies: &HashMap<String, Arc<dyn Service>>,
    ) -> Result<(), ServiceError> {
        for config in self.cache.stores() {
            let id = config.id_or_generate();
            if self.data.store(&id).is_none() {
                let store = match self.registry.build(&config) {
                    Ok(store) => store,
                    Err(error) => {
                        warn!("data: could not build store {id}: {error}");
                        continue;
                    }
                };
                if let Err(error) = self.data.register(store) {
                    warn!("data: could not register store {id}: {error}");
                    continue;
                }
            }
            if let Some(store) = self.data.store(&id) {
                if store.status() != StoreStatus::Running {
                    if let Err(error) = store.start().await {
                        warn!("data: store {id} failed to start: {error}");
                    }
                }
            }
        }
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) {
        for store in self.data.stores() {
            store.stop().await;
        }
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Stopped;
    }

    async fn pause(&self) {
        for store in self.data.active_stores() {
            store.pause().await;
        }
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Paused;
    }

    async fn resume(&self) -> Result<(), ServiceError> {
        for store in self.data.stores() {
            if store.status() == StoreStatus::Paused {
                if let Err(error) = store.resume().await {
                    warn!("data: store {} failed to resume: {error}", store.id());
                }
            }
        }
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Running;
        Ok(())
    }
}

/// Runs the sync dispatcher in a background task.
struct SyncService {
    dispatcher: Arc<SyncDispatcher>,
    status: RwLock<ServiceStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    fn spawn(&self) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::spawn(async move { dispatcher.run().await });
        if let Some(previous) = self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(task)
        {
            previous.abort();
        }
    }

    fn halt(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Service for SyncService {
    fn id(&self) -> &str {
        SYNC_SERVICE_ID
    }

    fn requires(&self) -> Vec<String> {
        vec![DATA_SERVICE_ID.to_owned()]
    }

    fn status(&self) -> ServiceStatus {
        *self.status.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn start(
        &self,
        _dependencies: &HashMap<String, Arc<dyn Service>>,
    ) -> Result<(), ServiceError> {
        self.spawn();
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) {
        self.halt();
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Stopped;
    }

    async fn pause(&self) {
        self.halt();
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Paused;
    }

    async fn resume(&self) -> Result<(), ServiceError> {
        self.spawn();
        *self.status.write().unwrap_or_else(std::sync::PoisonError::into_inner) = ServiceStatus::Running;
        Ok(())
    }
}

/// The assembled application context.
pub struct Engine {
    graph: ServiceGraph,
    data: Arc<DataService>,
    cache: Arc<ConfigCache>,
    broker: Arc<dyn Broker>,
}

impl Engine {
    /// Start assembling an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Start every registered service in dependency order.
    pub async fn start(&self) {
        self.graph.start_all_services().await;
    }

    /// Stop every registered service, dependents first.
    pub async fn stop(&self) {
        self.graph.stop_all_services().await;
    }

    /// Federated query across every active store.
    pub fn query(&self, filter: &QueryFilter) -> FeatureStream {
        self.data.query_all_stores(filter)
    }

    /// The data service.
    pub fn data(&self) -> &Arc<DataService> {
        &self.data
    }

    /// The cached configuration.
    pub fn config(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    /// The broker handle.
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// The service graph.
    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    /// Mutable access for registering application services.
    pub fn graph_mut(&mut self) -> &mut ServiceGraph {
        &mut self.graph
    }
}

/// Builder wiring an [`Engine`] from its parts.
///
/// Every part has a default: an auto-acknowledging in-memory broker, the
/// built-in store registry, an empty configuration, and the default reply
/// timeout.
pub struct EngineBuilder {
    broker: Option<Arc<dyn Broker>>,
    registry: Option<StoreRegistry>,
    configs: Vec<StoreConfig>,
    jwt: String,
    reply_timeout: Duration,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            broker: None,
            registry: None,
            configs: Vec::new(),
            jwt: String::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

impl EngineBuilder {
    /// Use this broker instead of the in-memory default.
    #[must_use]
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Use this store registry instead of the built-in defaults.
    #[must_use]
    pub fn with_registry(mut self, registry: StoreRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Seed the cached configuration with one store record.
    #[must_use]
    pub fn with_store(mut self, config: StoreConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Seed the cached configuration with store records.
    #[must_use]
    pub fn with_stores(mut self, configs: impl IntoIterator<Item = StoreConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    /// Carry this bearer token in outbound sync envelopes.
    #[must_use]
    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = jwt.into();
        self
    }

    /// Replace the sync reply wait budget.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Assemble the engine and register the built-in services.
    ///
    /// # Errors
    /// Returns [`GraphError`] when service registration fails.
    pub fn build(self) -> Result<Engine, GraphError> {
        let broker = self
            .broker
            .unwrap_or_else(|| Arc::new(InMemoryBroker::auto_acknowledging()));
        let registry = Arc::new(self.registry.unwrap_or_default());
        let cache = Arc::new(ConfigCache::with_stores(self.configs));
        let data = Arc::new(DataService::new());
        let dispatcher = Arc::new(
            SyncDispatcher::new(
                Arc::clone(&data),
                Arc::clone(&broker),
                Arc::clone(&registry),
                Arc::clone(&cache),
            )
            .with_jwt(self.jwt)
            .with_reply_timeout(self.reply_timeout),
        );

        let mut graph = ServiceGraph::new();
        graph.add_service(Arc::new(DataProvisioner {
            data: Arc::clone(&data),
            registry,
            cache: Arc::clone(&cache),
            status: RwLock::new(ServiceStatus::Stopped),
        }))?;
        graph.add_service(Arc::new(SyncService {
            dispatcher,
            status: RwLock::new(ServiceStatus::Stopped),
            task: Mutex::new(None),
        }))?;

        Ok(Engine {
            graph,
            data,
            cache,
            broker,
        })
    }
}
