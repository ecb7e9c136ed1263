//! Backend wire messages.
//!
//! Outbound traffic is a [`SyncEnvelope`] published on a per-store topic;
//! the backend answers on a shared reply channel with a [`SyncReply`]
//! carrying the same correlation id. Inbound configuration traffic arrives
//! as envelopes on the `config/update` topic and is decoded into a
//! [`ConfigUpdate`] by action code.

use serde::{Deserialize, Serialize};

use geofed_core::StoreConfig;

/// Topic carrying backend-originated configuration changes.
pub const CONFIG_TOPIC: &str = "config/update";

/// Action code of an outbound feature-sync envelope.
pub const ACTION_SYNC_FEATURE: i32 = 0;
/// Register a new store from the attached configuration record.
pub const CONFIG_ADD_STORE: i32 = 1;
/// Replace the configuration of an existing store.
pub const CONFIG_UPDATE_STORE: i32 = 2;
/// Remove a store; the payload is the store id.
pub const CONFIG_REMOVE_STORE: i32 = 3;
/// Register a new form definition.
pub const CONFIG_ADD_FORM: i32 = 4;
/// Replace an existing form definition.
pub const CONFIG_UPDATE_FORM: i32 = 5;
/// Remove a form definition; the payload is the form id.
pub const CONFIG_REMOVE_FORM: i32 = 6;

/// Envelope published to (or received from) the backend.
///
/// The `jwt` member is an opaque bearer token supplied by the application;
/// this layer only carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    /// Action code; see the `ACTION_`/`CONFIG_` constants.
    pub action: i32,
    /// Action-specific JSON payload.
    pub payload: String,
    /// Destination topic.
    pub to: String,
    /// Request/reply matching id, unique per in-flight request.
    pub correlation_id: i64,
    /// Opaque bearer token.
    #[serde(default)]
    pub jwt: String,
}

/// Backend reply to one envelope, matched by correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReply {
    /// Correlation id echoed from the request envelope.
    pub correlation_id: i64,
    /// Whether the backend accepted the request.
    pub result: bool,
    /// Backend error message on rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReply {
    /// An acceptance reply for the given correlation id.
    pub fn accepted(correlation_id: i64) -> Self {
        Self {
            correlation_id,
            result: true,
            error: None,
        }
    }

    /// A rejection reply carrying the backend's error message.
    pub fn rejected(correlation_id: i64, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            result: false,
            error: Some(error.into()),
        }
    }
}

/// Form definition distributed through configuration updates.
///
/// Forms describe attribute-entry layers; their lifecycle is config-driven
/// and they are cached locally so form stores can be provisioned offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    /// Form identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Layer the form's records land in.
    pub layer_id: String,
    /// Declared field names mapped to column type names.
    #[serde(default)]
    pub fields: std::collections::BTreeMap<String, String>,
}

/// A decoded configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdate {
    /// Register and start a new store.
    AddStore(StoreConfig),
    /// Replace an existing store's configuration.
    UpdateStore(StoreConfig),
    /// Remove a store by id.
    RemoveStore(String),
    /// Register a form definition.
    AddForm(FormConfig),
    /// Replace a form definition.
    UpdateForm(FormConfig),
    /// Remove a form definition by id.
    RemoveForm(String),
}

/// Raised when an envelope on the config topic cannot be decoded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigUpdateError {
    /// The action code is not part of the config taxonomy.
    #[error("unknown config action {0}")]
    UnknownAction(i32),
    /// The payload does not parse as the action's JSON schema.
    #[error("malformed payload for config action {action}")]
    MalformedPayload {
        /// Action code of the offending envelope.
        action: i32,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Identifier payload of the remove actions.
#[derive(Debug, Deserialize)]
struct RemovalPayload {
    id: String,
}

impl ConfigUpdate {
    /// Decode a config-topic envelope by its action code.
    ///
    /// # Errors
    /// Returns [`ConfigUpdateError`] for unknown actions or payloads that
    /// do not parse as the action's schema.
    pub fn from_envelope(envelope: &SyncEnvelope) -> Result<Self, ConfigUpdateError> {
        fn parse<T: serde::de::DeserializeOwned>(
            envelope: &SyncEnvelope,
        ) -> Result<T, ConfigUpdateError> {
            serde_json::from_str(&envelope.payload).map_err(|source| {
                ConfigUpdateError::MalformedPayload {
                    action: envelope.action,
                    source,
                }
            })
        }
        match envelope.action {
            CONFIG_ADD_STORE => Ok(Self::AddStore(parse(envelope)?)),
            CONFIG_UPDATE_STORE => Ok(Self::UpdateStore(parse(envelope)?)),
            CONFIG_REMOVE_STORE => {
                let payload: RemovalPayload = parse(envelope)?;
                Ok(Self::RemoveStore(payload.id))
            }
            CONFIG_ADD_FORM => Ok(Self::AddForm(parse(envelope)?)),
            CONFIG_UPDATE_FORM => Ok(Self::UpdateForm(parse(envelope)?)),
            CONFIG_REMOVE_FORM => {
                let payload: RemovalPayload = parse(envelope)?;
                Ok(Self::RemoveForm(payload.id))
            }
            action => Err(ConfigUpdateError::UnknownAction(action)),
        }
    }
}
