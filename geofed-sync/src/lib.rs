//! Backend synchronization layer of the geofed engine.
//!
//! Locally edited features travel to the backend through the
//! [`SyncDispatcher`], which is triggered by connectivity regains and edit
//! notifications and matches request/reply pairs by correlation id.
//! Backend-originated configuration updates flow the other way and are
//! applied against the [`ConfigCache`] and the data service's registry.
//! The [`Engine`] assembles the whole runtime.

#![forbid(unsafe_code)]

mod broker;
mod cache;
mod dispatcher;
mod engine;
mod message;

pub use broker::{Broker, InMemoryBroker};
pub use cache::ConfigCache;
pub use dispatcher::{DEFAULT_REPLY_TIMEOUT, SyncDispatcher, SyncError};
pub use engine::{DATA_SERVICE_ID, Engine, EngineBuilder, SYNC_SERVICE_ID};
pub use message::{
    ACTION_SYNC_FEATURE, CONFIG_ADD_FORM, CONFIG_ADD_STORE, CONFIG_REMOVE_FORM,
    CONFIG_REMOVE_STORE, CONFIG_TOPIC, CONFIG_UPDATE_FORM, CONFIG_UPDATE_STORE, ConfigUpdate,
    ConfigUpdateError, FormConfig, SyncEnvelope, SyncReply,
};
