//! Core data models for the PIP engine.

pub mod admin;
pub mod raw;

pub use admin::{AdminArea, Centroid, Placetype, UnknownPlacetype};
pub use raw::{RawFeature, RawProperties};
