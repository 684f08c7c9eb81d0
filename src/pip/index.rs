//! Spatial index for fast point-in-polygon lookups within one layer.

use geo::{Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::info;

use super::AdminBoundary;
use crate::models::Placetype;

/// Wrapper for R-tree indexing of admin boundaries
#[derive(Clone)]
pub struct IndexedBoundary {
    pub boundary: Arc<AdminBoundary>,
    envelope: AABB<[f64; 2]>,
    surface: f64,
}

impl RTreeObject for IndexedBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedBoundary {
    pub fn new(boundary: AdminBoundary) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = boundary.bbox()?;
        let surface = boundary.surface();
        Some(Self {
            boundary: Arc::new(boundary),
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
            surface,
        })
    }

    /// Overlap tie-break: smaller polygon first, then lower id.
    fn precedence(&self, other: &Self) -> Ordering {
        self.surface
            .total_cmp(&other.surface)
            .then_with(|| self.boundary.area.id.cmp(&other.boundary.area.id))
    }
}

/// R-tree over the boundaries of a single layer
pub struct LayerIndex {
    tree: RTree<IndexedBoundary>,
}

impl LayerIndex {
    /// Build spatial index from admin boundaries
    pub fn build(layer: Placetype, boundaries: Vec<AdminBoundary>) -> Self {
        info!(
            "[{}] Building spatial index for {} boundaries...",
            layer,
            boundaries.len()
        );

        let indexed: Vec<IndexedBoundary> = boundaries
            .into_iter()
            .filter_map(IndexedBoundary::new)
            .collect();

        let tree = RTree::bulk_load(indexed);

        info!("[{}] Spatial index built with {} entries", layer, tree.size());

        Self { tree }
    }

    /// Find the boundary containing a point.
    ///
    /// Where polygons overlap, the one with the smallest area wins and equal
    /// areas resolve to the lowest id, so the answer never depends on load order.
    pub fn search(&self, lon: f64, lat: f64) -> Option<Arc<AdminBoundary>> {
        self.candidates(lon, lat)
            .min_by(|a, b| a.precedence(b))
            .map(|ib| Arc::clone(&ib.boundary))
    }

    // R-tree envelope pre-filter, then exact containment
    fn candidates(&self, lon: f64, lat: f64) -> impl Iterator<Item = &IndexedBoundary> {
        let point = Point::new(lon, lat);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .filter(move |ib| ib.boundary.geometry.contains(&point))
    }

    /// Get total number of indexed boundaries
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
