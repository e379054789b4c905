//! Error types for the routing model

use thiserror::Error;

use crate::layer::Layer;

/// Errors that can occur in the matrix model
///
/// Every variant is reported before any state is mutated, so a failed
/// operation leaves the device exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// Crosspoint command does not match `SRC:DST`
    #[error("malformed crosspoint command: {0:?}")]
    MalformedCommand(String),

    /// Source alias or identifier does not resolve within the layer
    #[error("source stream {stream} not found in layer {layer}")]
    SourceNotFound { layer: Layer, stream: String },

    /// Destination alias or identifier does not resolve within the layer
    #[error("destination stream {stream} not found in layer {layer}")]
    DestinationNotFound { layer: Layer, stream: String },

    /// Source exists but is not enabled (enable gate active)
    #[error("source stream {stream} in layer {layer} is not enabled")]
    SourceDisabled { layer: Layer, stream: String },

    /// Layer name is unknown or not configured on this device
    #[error("layer not found: {0}")]
    LayerNotFound(String),

    /// No node or property at the given path
    #[error("not found: {0}")]
    NotFound(String),

    /// Property cannot be written by external clients
    #[error("read-only property: {0}")]
    ReadOnly(String),

    /// Value cannot be converted to the property's type
    #[error("invalid value {value:?} for {path}")]
    InvalidValue { path: String, value: String },

    /// Path text is not a well-formed node path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The store was replaced by a listener restart and no longer accepts writes
    #[error("device store was replaced; writes go to the current device")]
    Retired,
}
