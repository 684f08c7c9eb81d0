//! Point-in-polygon (PIP) lookup engine.
//!
//! Each layer is indexed by its own [`worker`] task behind an R-tree. The
//! [`Coordinator`] fans a lookup out to the requested layers and gathers one
//! reply per layer.

mod boundary;
mod coordinator;
mod index;
pub mod protocol;
mod worker;

pub use boundary::AdminBoundary;
pub use coordinator::{Coordinator, LookupResult};
pub use index::LayerIndex;
