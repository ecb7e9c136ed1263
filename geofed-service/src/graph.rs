//! Service dependency graph and lifecycle orchestrator.
//!
//! Services register with declared dependency ids. Registration order must
//! be a topological pre-order: a service's dependencies must already be in
//! the graph, which also makes cycles unrepresentable. Starting a service
//! first starts its whole dependency closure in dependency order; a
//! dependency that fails to start does not abort its dependents, which
//! receive whichever dependencies reached `Running` and decide for
//! themselves whether to proceed degraded.
//!
//! The graph is driven from one coordinating task; callers serialize
//! registration against in-flight start sequences.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use geofed_core::{Service, ServiceStatus};

/// Errors raised by graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A declared dependency has not been registered yet.
    #[error("service {service:?} declares unregistered dependency {dependency:?}")]
    MissingDependency {
        /// Identifier of the service being registered.
        service: String,
        /// Identifier of the missing dependency.
        dependency: String,
    },
    /// A service with this id is already registered.
    #[error("a service with id {0:?} is already registered")]
    DuplicateService(String),
    /// No service with this id is registered.
    #[error("no service registered with id {0:?}")]
    UnknownService(String),
}

/// One registered service plus its resolved dependency relations.
struct ServiceNode {
    service: Arc<dyn Service>,
    requires: Vec<String>,
    /// Ids of services depending on this one. Back-reference only.
    recipients: Vec<String>,
}

/// Dependency-ordered registry of orchestrated services.
#[derive(Default)]
pub struct ServiceGraph {
    nodes: BTreeMap<String, ServiceNode>,
}

impl ServiceGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a service with this id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Current status of one service.
    pub fn status(&self, id: &str) -> Option<ServiceStatus> {
        self.nodes.get(id).map(|node| node.service.status())
    }

    /// Register a service, resolving its declared dependencies.
    ///
    /// # Errors
    /// Returns [`GraphError::MissingDependency`] when a declared dependency
    /// has not been registered, and [`GraphError::DuplicateService`] when
    /// the id is taken.
    pub fn add_service(&mut self, service: Arc<dyn Service>) -> Result<(), GraphError> {
        let id = service.id().to_owned();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateService(id));
        }
        let requires = service.requires();
        for dependency in &requires {
            if !self.nodes.contains_key(dependency) {
                return Err(GraphError::MissingDependency {
                    service: id,
                    dependency: dependency.clone(),
                });
            }
        }
        for dependency in &requires {
            if let Some(node) = self.nodes.get_mut(dependency) {
                node.recipients.push(id.clone());
            }
        }
        debug!("graph: registered service {id} (requires {requires:?})");
        self.nodes.insert(
            id,
            ServiceNode {
                service,
                requires,
                recipients: Vec::new(),
            },
        );
        Ok(())
    }

    /// Remove a service, cascading over everything that depends on it.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownService`] when the id is not registered.
    pub fn remove_service(&mut self, id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::UnknownService(id.to_owned()));
        }
        self.remove_cascade(id);
        Ok(())
    }

    fn remove_cascade(&mut self, id: &str) {
        let recipients = self
            .nodes
            .get(id)
            .map(|node| node.recipients.clone())
            .unwrap_or_default();
        for recipient in recipients {
            self.remove_cascade(&recipient);
        }
        if self.nodes.remove(id).is_some() {
            debug!("graph: removed service {id}");
        }
        for node in self.nodes.values_mut() {
            node.recipients.retain(|recipient| recipient != id);
        }
    }

    /// Dependency closure of `id` in start order (dependencies first,
    /// `id` last), skipping already-visited nodes.
    fn start_order(&self, id: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = std::collections::BTreeSet::new();
        self.visit(id, &mut visited, &mut order);
        order
    }

    fn visit(
        &self,
        id: &str,
        visited: &mut std::collections::BTreeSet<String>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(id.to_owned()) {
            return;
        }
        if let Some(node) = self.nodes.get(id) {
            for dependency in &node.requires {
                self.visit(dependency, visited, order);
            }
            order.push(id.to_owned());
        }
    }

    /// Start a service after starting its whole dependency closure in
    /// dependency order.
    ///
    /// A dependency that fails to reach `Running` is logged and skipped;
    /// its dependents still start, receiving only the dependencies that are
    /// `Running`.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownService`] when the id is not registered.
    pub async fn start_service(&self, id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::UnknownService(id.to_owned()));
        }
        for next in self.start_order(id) {
            self.start_one(&next).await;
        }
        Ok(())
    }

    async fn start_one(&self, id: &str) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.service.status() == ServiceStatus::Running {
            return;
        }
        let mut running_deps: HashMap<String, Arc<dyn Service>> = HashMap::new();
        for dependency in &node.requires {
            if let Some(dep_node) = self.nodes.get(dependency) {
                if dep_node.service.status() == ServiceStatus::Running {
                    running_deps.insert(dependency.clone(), Arc::clone(&dep_node.service));
                }
            }
        }
        if let Err(error) = node.service.start(&running_deps).await {
            warn!("graph: service {id} failed to start: {error}");
        }
    }

    /// Start every registered service.
    ///
    /// Order across independent services is unspecified; each service's own
    /// dependency walk still applies.
    pub async fn start_all_services(&self) {
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        for id in ids {
            for next in self.start_order(&id) {
                self.start_one(&next).await;
            }
        }
    }

    /// Stop one service after stopping everything that depends on it.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownService`] when the id is not registered.
    pub async fn stop_service(&self, id: &str) -> Result<(), GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::UnknownService(id.to_owned()));
        }
        for next in self.stop_order(id) {
            if let Some(node) = self.nodes.get(&next) {
                if node.service.status() != ServiceStatus::Stopped {
                    node.service.stop().await;
                }
            }
        }
        Ok(())
    }

    /// Recipient closure of `id` in stop order (dependents first, `id`
    /// last).
    fn stop_order(&self, id: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = std::collections::BTreeSet::new();
        self.visit_recipients(id, &mut visited, &mut order);
        order
    }

    fn visit_recipients(
        &self,
        id: &str,
        visited: &mut std::collections::BTreeSet<String>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(id.to_owned()) {
            return;
        }
        if let Some(node) = self.nodes.get(id) {
            for recipient in &node.recipients {
                self.visit_recipients(recipient, visited, order);
            }
            order.push(id.to_owned());
        }
    }

    /// Stop every registered service, dependents before dependencies.
    pub async fn stop_all_services(&self) {
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        for id in ids {
            for next in self.stop_order(&id) {
                if let Some(node) = self.nodes.get(&next) {
                    if node.service.status() != ServiceStatus::Stopped {
                        node.service.stop().await;
                    }
                }
            }
        }
    }

    /// Pause one service.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownService`] when the id is not registered.
    pub async fn pause_service(&self, id: &str) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::UnknownService(id.to_owned()))?;
        node.service.pause().await;
        Ok(())
    }

    /// Resume one service.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownService`] when the id is not registered.
    pub async fn resume_service(&self, id: &str) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::UnknownService(id.to_owned()))?;
        if let Err(error) = node.service.resume().await {
            warn!("graph: service {id} failed to resume: {error}");
        }
        Ok(())
    }
}
