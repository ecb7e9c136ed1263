//! Dependency-ordering, cascade-removal, and degradation behaviour of the
//! service graph.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use geofed_core::{Service, ServiceError, ServiceStatus};
use geofed_service::{GraphError, ServiceGraph};

/// Test service that records, at the moment it starts, which of its
/// dependencies were handed over as `Running`.
struct RecordingService {
    id: String,
    requires: Vec<String>,
    status: RwLock<ServiceStatus>,
    fail_start: bool,
    log: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl RecordingService {
    fn new(
        id: &str,
        requires: &[&str],
        log: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            requires: requires.iter().map(|&r| r.to_owned()).collect(),
            status: RwLock::new(ServiceStatus::Stopped),
            fail_start: false,
            log,
        })
    }

    fn failing(
        id: &str,
        requires: &[&str],
        log: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            requires: requires.iter().map(|&r| r.to_owned()).collect(),
            status: RwLock::new(ServiceStatus::Stopped),
            fail_start: true,
            log,
        })
    }
}

#[async_trait]
impl Service for RecordingService {
    fn id(&self) -> &str {
        &self.id
    }

    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn status(&self) -> ServiceStatus {
        *self.status.read().expect("lock poisoned")
    }

    async fn start(
        &self,
        dependencies: &HashMap<String, Arc<dyn Service>>,
    ) -> Result<(), ServiceError> {
        let mut running: Vec<String> = dependencies.keys().cloned().collect();
        running.sort();
        self.log
            .lock()
            .expect("lock poisoned")
            .push((self.id.clone(), running));
        if self.fail_start {
            return Err(ServiceError::StartFailed {
                id: self.id.clone(),
                reason: "scripted failure".to_owned(),
            });
        }
        *self.status.write().expect("lock poisoned") = ServiceStatus::Running;
        Ok(())
    }

    async fn stop(&self) {
        *self.status.write().expect("lock poisoned") = ServiceStatus::Stopped;
    }

    async fn pause(&self) {
        *self.status.write().expect("lock poisoned") = ServiceStatus::Paused;
    }

    async fn resume(&self) -> Result<(), ServiceError> {
        *self.status.write().expect("lock poisoned") = ServiceStatus::Running;
        Ok(())
    }
}

type Log = Arc<Mutex<Vec<(String, Vec<String>)>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn registration_requires_dependencies_first() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    let result = graph.add_service(RecordingService::new("Y", &["X"], Arc::clone(&log)));
    assert!(matches!(
        result,
        Err(GraphError::MissingDependency { service, dependency })
            if service == "Y" && dependency == "X"
    ));
    graph
        .add_service(RecordingService::new("X", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("Y", &["X"], log))
        .unwrap();
}

#[tokio::test]
async fn dependency_is_running_before_dependent_starts() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("B", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("A", &["B"], Arc::clone(&log)))
        .unwrap();
    graph.start_all_services().await;
    let entries = log.lock().unwrap().clone();
    let b_pos = entries.iter().position(|(id, _)| id == "B").unwrap();
    let a_pos = entries.iter().position(|(id, _)| id == "A").unwrap();
    assert!(b_pos < a_pos, "B must start before A");
    // A observed B as a running dependency at the moment of its start.
    assert_eq!(entries[a_pos].1, vec!["B".to_owned()]);
}

#[tokio::test]
async fn deep_chains_start_in_topological_order() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("C", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("B", &["C"], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("A", &["B"], Arc::clone(&log)))
        .unwrap();
    // Starting only the top of a three-level chain must start all of it.
    graph.start_service("A").await.unwrap();
    let order: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .map(|(id, _)| id.clone())
        .collect();
    assert_eq!(order, vec!["C", "B", "A"]);
    assert_eq!(graph.status("C"), Some(ServiceStatus::Running));
}

#[tokio::test]
async fn failed_dependency_does_not_block_dependent() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::failing("B", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("A", &["B"], Arc::clone(&log)))
        .unwrap();
    graph.start_service("A").await.unwrap();
    let entries = log.lock().unwrap().clone();
    let a_entry = entries.iter().find(|(id, _)| id == "A").unwrap();
    // A still started, with an empty dependency map: degraded mode.
    assert!(a_entry.1.is_empty());
    assert_eq!(graph.status("A"), Some(ServiceStatus::Running));
    assert_eq!(graph.status("B"), Some(ServiceStatus::Stopped));
}

#[tokio::test]
async fn already_running_services_are_not_restarted() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("B", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("A", &["B"], Arc::clone(&log)))
        .unwrap();
    graph.start_all_services().await;
    graph.start_all_services().await;
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn cascade_removal_takes_transitive_recipients() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("C", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("B", &["C"], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("A", &["B"], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("D", &[], log))
        .unwrap();
    graph.remove_service("C").unwrap();
    assert!(!graph.contains("C"));
    assert!(!graph.contains("B"));
    assert!(!graph.contains("A"));
    assert!(graph.contains("D"));
    assert_eq!(graph.len(), 1);
}

#[test]
fn duplicate_ids_are_rejected() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("X", &[], Arc::clone(&log)))
        .unwrap();
    assert!(matches!(
        graph.add_service(RecordingService::new("X", &[], log)),
        Err(GraphError::DuplicateService(_))
    ));
}

#[tokio::test]
async fn stop_takes_recipients_down_first() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("B", &[], Arc::clone(&log)))
        .unwrap();
    graph
        .add_service(RecordingService::new("A", &["B"], log))
        .unwrap();
    graph.start_all_services().await;
    graph.stop_service("B").await.unwrap();
    assert_eq!(graph.status("A"), Some(ServiceStatus::Stopped));
    assert_eq!(graph.status("B"), Some(ServiceStatus::Stopped));
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let log = new_log();
    let mut graph = ServiceGraph::new();
    graph
        .add_service(RecordingService::new("X", &[], log))
        .unwrap();
    graph.start_all_services().await;
    graph.pause_service("X").await.unwrap();
    assert_eq!(graph.status("X"), Some(ServiceStatus::Paused));
    graph.resume_service("X").await.unwrap();
    assert_eq!(graph.status("X"), Some(ServiceStatus::Running));
}
