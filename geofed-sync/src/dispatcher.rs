//! Background sync dispatcher.
//!
//! The dispatcher guarantees that every locally created or updated feature
//! in a sync-capable store eventually reaches the backend. It is driven by
//! two triggers: connectivity transitions to connected, and edit
//! notifications from the data service. On each trigger it enumerates every
//! store's unsent features and sends them one by one; a feature is only
//! marked sent after an acceptance reply matched by correlation id.
//! Failures leave the feature unsent, so retries cost nothing beyond the
//! next trigger. There is no backoff timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use geofed_core::{SpatialFeature, StoreError, SyncableStore};
use geofed_service::DataService;
use geofed_stores::StoreRegistry;

use crate::broker::Broker;
use crate::cache::ConfigCache;
use crate::message::{
    ACTION_SYNC_FEATURE, CONFIG_TOPIC, ConfigUpdate, ConfigUpdateError, SyncEnvelope, SyncReply,
};

/// Reply wait budget applied when the application does not set one.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while synchronizing one feature or applying one config
/// update. All of them are retry-eligible and are logged, never escalated
/// to application callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend processed the envelope and refused it.
    #[error("backend rejected feature {key}: {reason}")]
    Rejected {
        /// Wire form of the feature's key.
        key: String,
        /// Backend-supplied error message.
        reason: String,
    },
    /// The envelope never reached the backend.
    #[error("transport failure on {topic}: {reason}")]
    Transport {
        /// Topic the publication targeted.
        topic: String,
        /// Transport-level description.
        reason: String,
    },
    /// No matching reply arrived within the reply timeout.
    #[error("no reply for correlation id {0} within the timeout")]
    ReplyTimeout(i64),
    /// The shared reply channel closed while waiting.
    #[error("reply channel closed")]
    ReplyChannelClosed,
    /// The store could not serialize the feature.
    #[error("could not serialize feature {key}")]
    Serialize {
        /// Wire form of the feature's key.
        key: String,
        /// Store-reported serialization error.
        #[source]
        source: StoreError,
    },
    /// An inbound config envelope could not be decoded.
    #[error(transparent)]
    Config(#[from] ConfigUpdateError),
}

/// Dispatcher pushing local edits to the backend and applying inbound
/// configuration updates.
pub struct SyncDispatcher {
    data: Arc<DataService>,
    broker: Arc<dyn Broker>,
    registry: Arc<StoreRegistry>,
    cache: Arc<ConfigCache>,
    jwt: String,
    reply_timeout: Duration,
    correlation: AtomicI64,
}

impl SyncDispatcher {
    /// Wire a dispatcher over the data service and broker.
    pub fn new(
        data: Arc<DataService>,
        broker: Arc<dyn Broker>,
        registry: Arc<StoreRegistry>,
        cache: Arc<ConfigCache>,
    ) -> Self {
        Self {
            data,
            broker,
            registry,
            cache,
            jwt: String::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            correlation: AtomicI64::new(0),
        }
    }

    /// Carry this bearer token in every outbound envelope.
    #[must_use]
    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = jwt.into();
        self
    }

    /// Replace the per-send reply wait budget.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Enumerate and send the unsent features of every sync-capable store.
    ///
    /// Send failures are logged and leave the feature unsent; the next
    /// trigger retries it. Within one store, the acknowledgment of a sent
    /// feature lands before the next enumeration, so a feature is never
    /// in flight twice.
    pub async fn flush(&self) {
        for store in self.data.stores() {
            let Some(syncable) = store.as_syncable() else {
                continue;
            };
            for feature in syncable.unsent().await {
                match self.send(syncable, &feature).await {
                    Ok(()) => debug!("sync: sent {}", feature.key()),
                    Err(error) => warn!("sync: {error}; will retry"),
                }
            }
        }
    }

    /// Send one feature and wait for its acknowledgment.
    ///
    /// # Errors
    /// Any [`SyncError`]; the feature stays unsent in every failure case.
    async fn send(
        &self,
        store: &dyn SyncableStore,
        feature: &SpatialFeature,
    ) -> Result<(), SyncError> {
        let key = feature.key();
        let payload = store.payload(feature).map_err(|source| SyncError::Serialize {
            key: key.encode(),
            source,
        })?;
        let correlation_id = self.correlation.fetch_add(1, Ordering::Relaxed) + 1;
        // Subscribe before publishing so the reply cannot slip past.
        let mut replies = self.broker.replies();
        self.broker
            .publish(SyncEnvelope {
                action: ACTION_SYNC_FEATURE,
                payload,
                to: store.sync_topic(),
                correlation_id,
                jwt: self.jwt.clone(),
            })
            .await?;
        let reply = self.await_reply(&mut replies, correlation_id).await?;
        if reply.result {
            store.mark_sent(&key).await;
            Ok(())
        } else {
            Err(SyncError::Rejected {
                key: key.encode(),
                reason: reply.error.unwrap_or_else(|| "unspecified".to_owned()),
            })
        }
    }

    async fn await_reply(
        &self,
        replies: &mut broadcast::Receiver<SyncReply>,
        correlation_id: i64,
    ) -> Result<SyncReply, SyncError> {
        let deadline = tokio::time::Instant::now() + self.reply_timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, replies.recv())
                .await
                .map_err(|_| SyncError::ReplyTimeout(correlation_id))?;
            match next {
                Ok(reply) if reply.correlation_id == correlation_id => return Ok(reply),
                // Replies to other in-flight sends share the channel.
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SyncError::ReplyChannelClosed);
                }
            }
        }
    }

    /// Apply one decoded configuration change against the cache and the
    /// store registry, keeping the two consistent.
    pub async fn apply(&self, update: ConfigUpdate) {
        match update {
            ConfigUpdate::AddStore(config) | ConfigUpdate::UpdateStore(config) => {
                let id = self.cache.upsert_store(config);
                // The cached record now carries the pinned id.
                let Some(config) = self.cache.store(&id) else {
                    return;
                };
                if self.data.store(&id).is_some() {
                    if let Err(error) = self.data.unregister(&id).await {
                        warn!("config: could not replace store {id}: {error}");
                        return;
                    }
                }
                let store = match self.registry.build(&config) {
                    Ok(store) => store,
                    Err(error) => {
                        warn!("config: could not build store {id}: {error}");
                        return;
                    }
                };
                if let Err(error) = self.data.register(Arc::clone(&store)) {
                    warn!("config: could not register store {id}: {error}");
                    return;
                }
                if let Err(error) = store.start().await {
                    warn!("config: store {id} failed to start: {error}");
                }
                info!("config: provisioned store {id}");
            }
            ConfigUpdate::RemoveStore(id) => {
                self.cache.remove_store(&id);
                match self.data.unregister(&id).await {
                    Ok(()) => info!("config: removed store {id}"),
                    Err(error) => warn!("config: could not remove store {id}: {error}"),
                }
            }
            ConfigUpdate::AddForm(form) | ConfigUpdate::UpdateForm(form) => {
                info!("config: cached form {}", form.id);
                self.cache.upsert_form(form);
            }
            ConfigUpdate::RemoveForm(id) => {
                self.cache.remove_form(&id);
                info!("config: removed form {id}");
            }
        }
    }

    async fn handle_inbound(&self, envelope: SyncEnvelope) {
        if envelope.to != CONFIG_TOPIC {
            debug!("sync: ignoring inbound envelope for {}", envelope.to);
            return;
        }
        match ConfigUpdate::from_envelope(&envelope) {
            Ok(update) => self.apply(update).await,
            Err(error) => warn!("sync: dropped config envelope: {error}"),
        }
    }

    /// Drive the dispatcher until every input channel closes.
    ///
    /// Flushes immediately when starting connected, then reacts to
    /// connectivity regains, edit notifications, and inbound configuration
    /// envelopes.
    pub async fn run(&self) {
        let mut connectivity = self.broker.connectivity();
        let mut inbound = self.broker.inbound();
        let mut edits = self.data.edited();
        if *connectivity.borrow_and_update() {
            self.flush().await;
        }
        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *connectivity.borrow_and_update() {
                        debug!("sync: backend reconnected");
                        self.flush().await;
                    }
                }
                edit = edits.next() => {
                    let Some(feature) = edit else { break };
                    debug!("sync: edit observed on {}", feature.store_id);
                    if *connectivity.borrow() {
                        self.flush().await;
                    }
                }
                envelope = inbound.recv() => {
                    match envelope {
                        Ok(envelope) => self.handle_inbound(envelope).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("sync: lagged past {skipped} inbound envelopes");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        info!("sync: dispatcher stopped");
    }
}
