//! wof-pip - point-in-polygon admin lookups over Who's On First data
//!
//! This library provides the layer loader, the per-layer spatial index and the
//! coordinator used by the `lookup` binary.

pub mod config;
pub mod error;
pub mod models;
pub mod pip;
pub mod wof;

#[cfg(test)]
mod test_support;

pub use config::PipConfig;
pub use error::{LoadError, PipError};
pub use models::{AdminArea, Centroid, Placetype};
pub use pip::{Coordinator, LookupResult};
