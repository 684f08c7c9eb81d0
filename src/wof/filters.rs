//! Keep/drop predicates applied to raw WOF records before field extraction.
//!
//! Order matters: every predicate reads raw properties, and [`FILTER_CHAIN`]
//! lists them in the order they run.

use geo::Geometry;
use serde_json::Value;
use tracing::debug;

use crate::models::RawFeature;

/// A named keep/drop predicate
pub struct Filter {
    pub name: &'static str,
    pub keep: fn(&RawFeature) -> bool,
}

pub const FILTER_CHAIN: &[Filter] = &[
    Filter {
        name: "inactive",
        keep: is_active_record,
    },
    Filter {
        name: "missing identity",
        keep: has_identity,
    },
    Filter {
        name: "unimportant",
        keep: is_important,
    },
    Filter {
        name: "not a polygon",
        keep: has_polygon_geometry,
    },
    Filter {
        name: "neighbourhood without hierarchy",
        keep: is_hierarchied_neighbourhood,
    },
    Filter {
        name: "neighbourhood without locality or localadmin",
        keep: is_citied_neighbourhood,
    },
];

/// Run the whole chain, logging the first predicate that rejects a record.
pub fn passes(feature: &RawFeature) -> bool {
    match FILTER_CHAIN.iter().find(|f| !(f.keep)(feature)) {
        Some(filter) => {
            debug!("Dropping record {}: {}", feature.id, filter.name);
            false
        }
        None => true,
    }
}

/// Current, not deprecated, not superseded.
pub fn is_active_record(feature: &RawFeature) -> bool {
    let props = &feature.properties;
    if props.is_current == Some(0) {
        return false;
    }
    let deprecated = props
        .deprecated
        .as_deref()
        .map(str::trim)
        .is_some_and(|d| !d.is_empty() && d != "uuuu");
    !deprecated && props.superseded_by.is_empty()
}

pub fn has_identity(feature: &RawFeature) -> bool {
    let props = &feature.properties;
    let non_blank = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    feature.id > 0 && (non_blank(&props.name) || non_blank(&props.label))
}

/// Only an explicit integer `0` hierarchy label marks a record as unimportant.
pub fn is_important(feature: &RawFeature) -> bool {
    match &feature.properties.hierarchy_label {
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        _ => true,
    }
}

pub fn has_polygon_geometry(feature: &RawFeature) -> bool {
    matches!(
        feature.geometry,
        Some(Geometry::Polygon(_)) | Some(Geometry::MultiPolygon(_))
    )
}

fn is_neighbourhood(feature: &RawFeature) -> bool {
    feature.placetype() == Some("neighbourhood")
}

pub fn is_hierarchied_neighbourhood(feature: &RawFeature) -> bool {
    !is_neighbourhood(feature) || !feature.properties.hierarchy.is_empty()
}

pub fn is_citied_neighbourhood(feature: &RawFeature) -> bool {
    !is_neighbourhood(feature)
        || feature
            .properties
            .hierarchy
            .iter()
            .any(|h| h.contains_key("locality_id") || h.contains_key("localadmin_id"))
}
