//! Geometry transforms applied during ingest: vertex reduction and UK point buffering.

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon, Simplify};
use serde_json::Value;
use tracing::debug;

use crate::models::raw::value_as_id;
use crate::models::{RawFeature, RawProperties};

/// WOF id of the United Kingdom
pub const UK_COUNTRY_ID: i64 = 85633159;

/// Number of sides of the polygon approximating a buffered point
pub const BUFFER_SIDES: usize = 64;

/// Simplify the outer ring of every polygon. Other geometry kinds pass through unchanged.
pub fn simplify_geometry(geometry: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geometry {
        Geometry::Polygon(polygon) => Geometry::Polygon(simplify_polygon(polygon, tolerance)),
        Geometry::MultiPolygon(multi) => Geometry::MultiPolygon(MultiPolygon::new(
            multi
                .0
                .into_iter()
                .map(|polygon| simplify_polygon(polygon, tolerance))
                .collect(),
        )),
        other => other,
    }
}

fn simplify_polygon(polygon: Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    let (exterior, interiors) = polygon.into_inner();
    let simplified = exterior.simplify(tolerance);

    // A ring needs 4 positions (first == last) to stay a polygon
    let exterior = if simplified.0.len() >= 4 {
        simplified
    } else {
        exterior
    };
    Polygon::new(exterior, interiors)
}

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("non-finite point ({0}, {1})")]
    InvalidPoint(f64, f64),
    #[error("invalid buffer radius {0}")]
    InvalidRadius(f64),
}

/// Circle of `radius` degrees around `center` as a [`BUFFER_SIDES`]-gon,
/// with coordinates rounded to 7 decimal places.
pub fn buffer_point(center: Point<f64>, radius: f64) -> Result<Polygon<f64>, BufferError> {
    if !center.x().is_finite() || !center.y().is_finite() {
        return Err(BufferError::InvalidPoint(center.x(), center.y()));
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(BufferError::InvalidRadius(radius));
    }

    let mut ring: Vec<Coord<f64>> = (0..BUFFER_SIDES)
        .map(|i| {
            let theta = std::f64::consts::TAU * i as f64 / BUFFER_SIDES as f64;
            Coord {
                x: round7(center.x() + radius * theta.cos()),
                y: round7(center.y() + radius * theta.sin()),
            }
        })
        .collect();
    ring.push(ring[0]);

    Ok(Polygon::new(LineString::new(ring), vec![]))
}

fn round7(v: f64) -> f64 {
    (v * 1e7).round() / 1e7
}

/// UK membership by ISO country or by the UK appearing anywhere in the hierarchy.
pub fn is_in_uk(props: &RawProperties) -> bool {
    let iso_gb = props
        .iso_country
        .as_deref()
        .is_some_and(|c| c.trim().eq_ignore_ascii_case("GB"));

    iso_gb
        || props.hierarchy.iter().any(|entry| {
            entry
                .values()
                .any(|v: &Value| value_as_id(v) == Some(UK_COUNTRY_ID))
        })
}

/// Replace the point geometry of a UK record with a buffered polygon.
///
/// Records that are not UK points are left alone. A failed buffer keeps the point.
pub fn buffer_uk_point(feature: &mut RawFeature, radius: f64) {
    let Some(Geometry::Point(point)) = feature.geometry else {
        return;
    };
    if !is_in_uk(&feature.properties) {
        return;
    }

    match buffer_point(point, radius) {
        Ok(polygon) => feature.geometry = Some(Geometry::Polygon(polygon)),
        Err(e) => debug!("Could not buffer point record {}: {}", feature.id, e),
    }
}
