//! The named-service contract driven by the lifecycle orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Lifecycle state of an orchestrated service.
///
/// Transitions: `Stopped → Running ⇄ Paused → Stopped`. `resume()` reaches
/// `Running` directly from `Stopped` when no explicit pause occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not started or stopped.
    Stopped,
    /// Actively serving.
    Running,
    /// Suspended; resumable.
    Paused,
}

/// Errors raised by service lifecycle operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service failed to reach `Running`.
    #[error("service {id:?} failed to start: {reason}")]
    StartFailed {
        /// Identifier of the failing service.
        id: String,
        /// Service-specific failure description.
        reason: String,
    },
}

/// A named unit with a status state machine and declared dependencies.
///
/// Services are registered with the service graph, which resolves the
/// declared dependency ids and drives ordered start/stop.
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier within a graph.
    fn id(&self) -> &str;

    /// Identifiers of the services this one depends on.
    fn requires(&self) -> Vec<String>;

    /// Current lifecycle status.
    fn status(&self) -> ServiceStatus;

    /// Start the service.
    ///
    /// `dependencies` maps dependency ids to whichever declared dependencies
    /// reached `Running`; the service decides whether it can proceed in a
    /// degraded mode when some are missing.
    ///
    /// # Errors
    /// Returns [`ServiceError::StartFailed`] when the service cannot reach
    /// `Running`.
    async fn start(
        &self,
        dependencies: &HashMap<String, Arc<dyn Service>>,
    ) -> Result<(), ServiceError>;

    /// Stop the service.
    async fn stop(&self);

    /// Suspend the service.
    async fn pause(&self);

    /// Return to `Running` after a pause, or directly from `Stopped`.
    ///
    /// # Errors
    /// Returns [`ServiceError::StartFailed`] when the service cannot reach
    /// `Running`.
    async fn resume(&self) -> Result<(), ServiceError>;
}
