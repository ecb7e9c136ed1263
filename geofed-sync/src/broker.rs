//! Backend broker abstraction.
//!
//! The dispatcher only ever talks to a [`Broker`]: publish an envelope,
//! watch connectivity, and subscribe to the shared reply channel and the
//! inbound config channel. The [`InMemoryBroker`] implementation backs the
//! test suite and the demo CLI; a production binding (e.g. MQTT) implements
//! the same trait.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::dispatcher::SyncError;
use crate::message::{SyncEnvelope, SyncReply};

/// Connection to the synchronization backend.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish one envelope with at-least-once delivery.
    ///
    /// # Errors
    /// Returns [`SyncError::Transport`] when the message cannot be handed
    /// to the backend.
    async fn publish(&self, envelope: SyncEnvelope) -> Result<(), SyncError>;

    /// Subscribe to the shared reply channel.
    fn replies(&self) -> broadcast::Receiver<SyncReply>;

    /// Subscribe to backend-originated envelopes (configuration traffic).
    fn inbound(&self) -> broadcast::Receiver<SyncEnvelope>;

    /// Watch backend connectivity; `true` means connected.
    fn connectivity(&self) -> watch::Receiver<bool>;
}

/// Scriptable in-process broker.
///
/// Connectivity, replies, and inbound traffic are driven by the caller.
/// With `auto_ack` enabled every published envelope is immediately
/// acknowledged, which is enough for most wiring tests.
pub struct InMemoryBroker {
    published: Mutex<Vec<SyncEnvelope>>,
    replies_tx: broadcast::Sender<SyncReply>,
    inbound_tx: broadcast::Sender<SyncEnvelope>,
    connected_tx: watch::Sender<bool>,
    auto_ack: AtomicBool,
    /// When set, auto-acknowledgement rejects with this message instead.
    reject_with: Mutex<Option<String>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// A connected broker that does not acknowledge anything by itself.
    pub fn new() -> Self {
        let (replies_tx, _) = broadcast::channel(64);
        let (inbound_tx, _) = broadcast::channel(64);
        let (connected_tx, _) = watch::channel(true);
        Self {
            published: Mutex::new(Vec::new()),
            replies_tx,
            inbound_tx,
            connected_tx,
            auto_ack: AtomicBool::new(false),
            reject_with: Mutex::new(None),
        }
    }

    /// A connected broker that acknowledges every publication.
    pub fn auto_acknowledging() -> Self {
        let broker = Self::new();
        broker.auto_ack.store(true, Ordering::Relaxed);
        broker
    }

    /// Flip the connectivity flag.
    pub fn set_connected(&self, connected: bool) {
        // send_replace never fails; the broker holds the sender.
        self.connected_tx.send_replace(connected);
    }

    /// Make auto-acknowledgement reject with this error message.
    pub fn reject_with(&self, error: impl Into<String>) {
        self.auto_ack.store(true, Ordering::Relaxed);
        *self.reject_with.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error.into());
    }

    /// Clear a previous [`reject_with`](Self::reject_with) and accept again.
    pub fn accept(&self) {
        self.auto_ack.store(true, Ordering::Relaxed);
        *self.reject_with.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    /// Inject a reply onto the shared reply channel.
    pub fn reply(&self, reply: SyncReply) {
        let _ = self.replies_tx.send(reply);
    }

    /// Inject a backend-originated envelope.
    pub fn push_inbound(&self, envelope: SyncEnvelope) {
        let _ = self.inbound_tx.send(envelope);
    }

    /// Every envelope published so far, oldest first.
    pub fn published(&self) -> Vec<SyncEnvelope> {
        self.published.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, envelope: SyncEnvelope) -> Result<(), SyncError> {
        if !*self.connected_tx.borrow() {
            return Err(SyncError::Transport {
                topic: envelope.to,
                reason: "broker disconnected".to_owned(),
            });
        }
        let correlation_id = envelope.correlation_id;
        self.published
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(envelope);
        if self.auto_ack.load(Ordering::Relaxed) {
            let rejection = self.reject_with.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
            let reply = match rejection {
                Some(error) => SyncReply::rejected(correlation_id, error),
                None => SyncReply::accepted(correlation_id),
            };
            let _ = self.replies_tx.send(reply);
        }
        Ok(())
    }

    fn replies(&self) -> broadcast::Receiver<SyncReply> {
        self.replies_tx.subscribe()
    }

    fn inbound(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.inbound_tx.subscribe()
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }
}
