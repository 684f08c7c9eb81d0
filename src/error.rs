//! Error types for layer loading and PIP lookups.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{AdminArea, Placetype};

/// Failure to load one layer. Per-record problems never surface here; they are logged and skipped.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The layer's metadata CSV does not exist
    #[error("metadata file for layer {layer} not found: {}", .path.display())]
    MissingMetadata { layer: Placetype, path: PathBuf },

    /// The metadata CSV exists but could not be read
    #[error("failed to read metadata for layer {layer}: {source}")]
    Metadata {
        layer: Placetype,
        #[source]
        source: csv::Error,
    },

    /// Worker thread died while building the layer
    #[error("layer {layer} load aborted: {reason}")]
    Aborted { layer: Placetype, reason: String },

    /// The worker was terminated before the layer finished loading
    #[error("layer {layer} load cancelled")]
    Cancelled { layer: Placetype },
}

/// Errors returned by the coordinator.
#[derive(Debug, Error)]
pub enum PipError {
    /// One or more layers have no metadata file and missing metadata is fatal
    #[error("missing metadata for layer(s): {}", join_layers(.layers))]
    MissingMetadata { layers: Vec<Placetype> },

    /// The coordinator was shut down before the request completed
    #[error("PIP coordinator has shut down")]
    Shutdown,

    /// Not every targeted layer replied within the configured timeout
    #[error("lookup timed out waiting for layer(s): {}", join_layers(.missing))]
    Timeout {
        partial: Vec<AdminArea>,
        missing: Vec<Placetype>,
    },
}

fn join_layers(layers: &[Placetype]) -> String {
    layers
        .iter()
        .map(Placetype::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
