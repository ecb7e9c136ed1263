//! Store configuration records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One store configuration entry, as consumed from JSON.
///
/// The orchestrator reads this record to decide which concrete store
/// implementation to instantiate and register.
///
/// # Examples
/// ```
/// let config: geofed_core::StoreConfig = serde_json::from_str(
///     r#"{"store_type": "geojson", "uri": "bundles/city.json", "name": "City"}"#,
/// ).unwrap();
/// assert_eq!(config.store_type, "geojson");
/// assert!(config.id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store type string resolved by the factory registry.
    pub store_type: String,
    /// Configuration schema version.
    #[serde(default)]
    pub version: u32,
    /// Location of the store's content (file path or URL).
    pub uri: String,
    /// Store identifier; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Layers served when a query does not restrict them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_layers: Vec<String>,
}

impl StoreConfig {
    /// The configured id, or a freshly generated one.
    pub fn id_or_generate(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
