//! Indexed admin boundary: extracted fields plus polygon geometry.

use geo::{Area, BoundingRect, Geometry};

use crate::models::AdminArea;
use crate::wof::geometry::simplify_geometry;

/// A single admin boundary polygon with metadata.
///
/// `geometry` is always a `Polygon` or `MultiPolygon`.
#[derive(Debug, Clone)]
pub struct AdminBoundary {
    pub area: AdminArea,
    pub geometry: Geometry<f64>,
}

impl AdminBoundary {
    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// Planar area in square degrees, used to rank overlapping matches
    pub fn surface(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    pub fn simplified(self, tolerance: f64) -> Self {
        Self {
            area: self.area,
            geometry: simplify_geometry(self.geometry, tolerance),
        }
    }
}
