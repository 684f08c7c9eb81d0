//! Typed view of a raw WOF GeoJSON record, before filtering and extraction.

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Language tag value meaning "no language known"
pub const UNKNOWN_LANGUAGES: &[&str] = &["unk", "und"];

/// A WOF record as stored on disk, parsed into typed fields.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub id: i64,
    pub properties: RawProperties,
    pub geometry: Option<Geometry<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProperties {
    #[serde(rename = "wof:id")]
    pub id: Option<i64>,

    #[serde(rename = "wof:name")]
    pub name: Option<String>,

    #[serde(rename = "wof:label")]
    pub label: Option<String>,

    #[serde(rename = "wof:placetype")]
    pub placetype: Option<String>,

    #[serde(rename = "wof:country")]
    pub country: Option<String>,

    #[serde(rename = "iso:country")]
    pub iso_country: Option<String>,

    #[serde(rename = "qs:a2_alt")]
    pub qs_a2_alt: Option<String>,

    #[serde(rename = "mz:is_current")]
    pub is_current: Option<i64>,

    #[serde(rename = "mz:hierarchy_label")]
    pub hierarchy_label: Option<Value>,

    #[serde(rename = "edtf:deprecated")]
    pub deprecated: Option<String>,

    #[serde(rename = "wof:superseded_by", default)]
    pub superseded_by: Vec<i64>,

    #[serde(rename = "wof:hierarchy", default)]
    pub hierarchy: Vec<Map<String, Value>>,

    #[serde(rename = "lbl:latitude")]
    pub lbl_latitude: Option<f64>,

    #[serde(rename = "lbl:longitude")]
    pub lbl_longitude: Option<f64>,

    #[serde(rename = "geom:latitude")]
    pub geom_latitude: Option<f64>,

    #[serde(rename = "geom:longitude")]
    pub geom_longitude: Option<f64>,

    #[serde(rename = "geom:bbox")]
    pub bbox: Option<String>,

    #[serde(rename = "wof:shortcode")]
    pub shortcode: Option<String>,

    #[serde(rename = "wof:abbreviation")]
    pub abbreviation: Option<String>,

    #[serde(rename = "wof:country_alpha3")]
    pub country_alpha3: Option<String>,

    #[serde(rename = "ne:iso_a3")]
    pub ne_iso_a3: Option<String>,

    #[serde(rename = "ne:adm0_a3")]
    pub ne_adm0_a3: Option<String>,

    #[serde(rename = "wof:lang_x_spoken")]
    pub lang_spoken: Option<Value>,

    #[serde(rename = "wof:lang_x_official")]
    pub lang_official: Option<Value>,

    #[serde(rename = "wof:lang")]
    pub lang: Option<Value>,

    /// Everything else, including the per-language `name:*` and `abrv:*` variants.
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

impl RawProperties {
    /// First entry of a `<prefix>:<lang>_x_preferred` list, if any.
    pub fn preferred(&self, prefix: &str, lang: &str) -> Option<&str> {
        let key = format!("{}:{}_x_preferred", prefix, lang);
        match self.other.get(&key)? {
            Value::Array(values) => values.first().and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    id: Option<Value>,
    #[serde(default)]
    properties: RawProperties,
    geometry: Option<RawGeometry>,
}

/// GeoJSON geometry as found in WOF records. Positions may carry a third ordinate.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Point { coordinates: Vec<f64> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has no id")]
    MissingId,
    #[error("invalid position {0:?}")]
    Position(Vec<f64>),
}

impl RawFeature {
    /// Parse a WOF GeoJSON Feature document
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseError> {
        let doc: RawDocument = serde_json::from_slice(bytes)?;

        let id = doc
            .properties
            .id
            .or_else(|| doc.id.as_ref().and_then(value_as_id))
            .ok_or(ParseError::MissingId)?;

        let geometry = doc.geometry.map(RawGeometry::into_geo).transpose()?.flatten();

        Ok(Self {
            id,
            properties: doc.properties,
            geometry,
        })
    }

    /// Resolved placetype string, if the record states one
    pub fn placetype(&self) -> Option<&str> {
        self.properties.placetype.as_deref()
    }
}

/// Interpret a JSON id that may be written as a number or a numeric string
pub fn value_as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl RawGeometry {
    fn into_geo(self) -> Result<Option<Geometry<f64>>, ParseError> {
        Ok(match self {
            RawGeometry::Point { coordinates } => {
                Some(Geometry::Point(Point::from(to_coord(coordinates)?)))
            }
            RawGeometry::Polygon { coordinates } => {
                Some(Geometry::Polygon(to_polygon(coordinates)?))
            }
            RawGeometry::MultiPolygon { coordinates } => {
                let polygons = coordinates
                    .into_iter()
                    .map(to_polygon)
                    .collect::<Result<Vec<_>, _>>()?;
                Some(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
            RawGeometry::Unsupported => None,
        })
    }
}

fn to_coord(position: Vec<f64>) -> Result<Coord<f64>, ParseError> {
    match position.as_slice() {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(ParseError::Position(position)),
    }
}

fn to_ring(ring: Vec<Vec<f64>>) -> Result<LineString<f64>, ParseError> {
    ring.into_iter()
        .map(to_coord)
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn to_polygon(rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon<f64>, ParseError> {
    let mut rings = rings.into_iter();
    let exterior = match rings.next() {
        Some(ring) => to_ring(ring)?,
        None => LineString::new(vec![]),
    };
    let interiors = rings.map(to_ring).collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}
