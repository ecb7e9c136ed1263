//! Error types emitted by the geofed CLI.

use camino::Utf8PathBuf;
use thiserror::Error;

use geofed_core::{KeyError, QueryFilterError};
use geofed_service::GraphError;

/// Errors emitted by the geofed CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// The async runtime could not be constructed.
    #[error("failed to start the runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Reading the store configuration file failed.
    #[error("failed to read store configuration at {path:?}: {source}")]
    ReadStores {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Store configuration JSON could not be decoded.
    #[error("failed to parse store configuration at {path:?}: {source}")]
    ParseStores {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A `--bbox` value was not four comma-separated numbers.
    #[error("invalid bbox {value:?} (expected min_x,min_y,max_x,max_y)")]
    InvalidBbox { value: String },
    /// The query filter rejected its arguments.
    #[error(transparent)]
    Filter(#[from] QueryFilterError),
    /// A composite key did not decode.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Engine assembly failed.
    #[error("failed to assemble the engine: {0}")]
    Engine(#[from] GraphError),
    /// Serializing the query output failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
}
