//! Maps a filtered raw WOF record to an [`AdminBoundary`].
//!
//! Name and abbreviation resolution are ordered chains of sources; each
//! step is its own function so the priority order reads top to bottom.

use geo::{BoundingRect, Centroid as _, Geometry};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::IngestOptions;
use crate::models::raw::{value_as_id, UNKNOWN_LANGUAGES};
use crate::models::{AdminArea, Centroid, Placetype, RawFeature, RawProperties};
use crate::pip::AdminBoundary;
use crate::wof::country_codes::{alpha2_to_alpha3, is_unknown_country};

/// Natural Earth's null marker
const NE_NULL: &str = "-99";

/// Build the indexed boundary for a record. `None` when the record has no
/// polygon geometry or no usable name or centroid.
pub fn extract(
    feature: RawFeature,
    layer: Placetype,
    options: &IngestOptions,
) -> Option<AdminBoundary> {
    let geometry = match feature.geometry {
        Some(g @ (Geometry::Polygon(_) | Geometry::MultiPolygon(_))) => g,
        _ => return None,
    };
    let props = &feature.properties;
    let id = feature.id;

    let placetype = match props.placetype.as_deref().map(str::parse::<Placetype>) {
        Some(Ok(placetype)) => placetype,
        Some(Err(e)) => {
            debug!("Record {}: {}, using layer {}", id, e, layer);
            layer
        }
        None => layer,
    };

    let name = if options.localized_admin_names {
        resolve_localized_name(id, props, placetype)
    } else {
        resolve_name(props, placetype)
    };
    let Some(name) = name else {
        debug!("Record {} has no usable name", id);
        return None;
    };

    let Some(centroid) = resolve_centroid(props, &geometry) else {
        debug!("Record {} has no centroid", id);
        return None;
    };

    let bounding_box = props.bbox.clone().or_else(|| {
        geometry.bounding_rect().map(|r| {
            format!("{},{},{},{}", r.min().x, r.min().y, r.max().x, r.max().y)
        })
    });

    let abbreviation = if placetype.is_country_like() {
        resolve_country_abbreviation(id, props)
    } else {
        resolve_abbreviation(props, options)
    };

    let area = AdminArea {
        id,
        name,
        placetype,
        centroid,
        bounding_box,
        abbreviation,
        hierarchy: condense_hierarchy(id, props),
    };

    Some(AdminBoundary { area, geometry })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// US counties carry a better display name in `qs:a2_alt`.
fn us_county_name(props: &RawProperties, placetype: Placetype) -> Option<&str> {
    let is_us = props.country.as_deref().map(str::trim) == Some("US");
    if is_us && placetype == Placetype::County {
        non_blank(props.qs_a2_alt.as_deref())
    } else {
        None
    }
}

/// US county alternate, then label, then raw name.
pub fn resolve_name(props: &RawProperties, placetype: Placetype) -> Option<String> {
    us_county_name(props, placetype)
        .or_else(|| non_blank(props.label.as_deref()))
        .or_else(|| non_blank(props.name.as_deref()))
        .map(str::to_string)
}

/// Like [`resolve_name`], but tries the record's spoken, official and generic
/// language names before the label.
pub fn resolve_localized_name(
    id: i64,
    props: &RawProperties,
    placetype: Placetype,
) -> Option<String> {
    if let Some(name) = us_county_name(props, placetype) {
        return Some(name.to_string());
    }

    let tags = [
        ("wof:lang_x_spoken", &props.lang_spoken),
        ("wof:lang_x_official", &props.lang_official),
        ("wof:lang", &props.lang),
    ];
    for (source, tag) in tags {
        let Some(lang) = language_tag(tag.as_ref()) else {
            continue;
        };
        match non_blank(props.preferred("name", lang)) {
            Some(name) => return Some(name.to_string()),
            None => warn!(
                "Record {}: {} is '{}' but name:{}_x_preferred is missing",
                id, source, lang, lang
            ),
        }
    }

    resolve_name(props, placetype)
}

/// A usable language code from a scalar or list tag. Empty values and the
/// unknown/undetermined sentinels are rejected.
pub fn language_tag(tag: Option<&Value>) -> Option<&str> {
    let lang = match tag? {
        Value::String(s) => s.as_str(),
        Value::Array(values) => values.first()?.as_str()?,
        _ => return None,
    };
    let lang = lang.trim();
    if lang.is_empty() || UNKNOWN_LANGUAGES.contains(&lang) {
        None
    } else {
        Some(lang)
    }
}

fn three_letter(value: Option<&str>) -> Option<String> {
    non_blank(value)
        .filter(|code| *code != NE_NULL && code.len() == 3)
        .map(str::to_ascii_uppercase)
}

/// ISO3 code for countries and dependencies.
pub fn resolve_country_abbreviation(id: i64, props: &RawProperties) -> Option<String> {
    if props.country.as_deref().is_some_and(is_unknown_country) {
        return None;
    }

    let alpha3_sources = [
        props.country_alpha3.as_deref(),
        props.ne_iso_a3.as_deref(),
        props.ne_adm0_a3.as_deref(),
    ];
    if let Some(code) = alpha3_sources.into_iter().find_map(three_letter) {
        return Some(code);
    }

    let alpha2_sources = [
        ("wof:shortcode", props.shortcode.as_deref()),
        ("wof:country", props.country.as_deref()),
    ];
    for (source, value) in alpha2_sources {
        let Some(code) = non_blank(value) else {
            continue;
        };
        debug!(
            "Record {}: falling back to 2-letter {} '{}' for abbreviation",
            id, source, code
        );
        if let Some(alpha3) = alpha2_to_alpha3(code) {
            return Some(alpha3.to_string());
        }
    }

    None
}

/// Abbreviation for non-country placetypes
pub fn resolve_abbreviation(props: &RawProperties, options: &IngestOptions) -> Option<String> {
    if options.localized_admin_names {
        let languages = [
            options.localization_language.as_ref().map(|l| Value::String(l.clone())),
            props.lang_spoken.clone(),
            props.lang_official.clone(),
            props.lang.clone(),
        ];
        for tag in &languages {
            if let Some(lang) = language_tag(tag.as_ref()) {
                if let Some(abbr) = non_blank(props.preferred("abrv", lang)) {
                    return Some(abbr.to_string());
                }
            }
        }
    }

    non_blank(props.shortcode.as_deref())
        .or_else(|| non_blank(props.abbreviation.as_deref()))
        .map(str::to_string)
}

fn resolve_centroid(props: &RawProperties, geometry: &Geometry<f64>) -> Option<Centroid> {
    if let (Some(lat), Some(lon)) = (props.lbl_latitude, props.lbl_longitude) {
        return Some(Centroid { lat, lon });
    }
    if let (Some(lat), Some(lon)) = (props.geom_latitude, props.geom_longitude) {
        return Some(Centroid { lat, lon });
    }
    geometry.centroid().map(|p| Centroid {
        lat: p.y(),
        lon: p.x(),
    })
}

/// One id list per ancestor chain. A record without ancestry is its own root.
pub fn condense_hierarchy(id: i64, props: &RawProperties) -> Vec<Vec<i64>> {
    if props.hierarchy.is_empty() {
        return vec![vec![id]];
    }
    props
        .hierarchy
        .iter()
        .map(|entry| entry.values().filter_map(value_as_id).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{polygon_doc, raw, with_prop};
    use serde_json::json;

    fn county(country: &str) -> serde_json::Value {
        let doc = polygon_doc(102081631, "Raw County", "county", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:country", json!(country));
        let doc = with_prop(doc, "wof:label", json!("Label County"));
        with_prop(doc, "qs:a2_alt", json!("Alt County"))
    }

    fn localized() -> IngestOptions {
        IngestOptions {
            localized_admin_names: true,
            ..IngestOptions::default()
        }
    }

    fn extract_default(doc: serde_json::Value, layer: Placetype) -> AdminArea {
        extract(raw(doc), layer, &IngestOptions::default())
            .unwrap()
            .area
    }

    #[test]
    fn test_us_county_prefers_alternate_name() {
        let area = extract_default(county("US"), Placetype::County);
        assert_eq!(area.name, "Alt County");
    }

    #[test]
    fn test_non_us_county_uses_label() {
        let area = extract_default(county("CA"), Placetype::County);
        assert_eq!(area.name, "Label County");
    }

    #[test]
    fn test_name_falls_back_to_raw_name() {
        let doc = polygon_doc(1, "Raw", "locality", [[0.0, 0.0], [1.0, 1.0]]);
        assert_eq!(extract_default(doc, Placetype::Locality).name, "Raw");
    }

    #[test]
    fn test_localized_name_priority() {
        let doc = polygon_doc(1, "Raw", "locality", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:label", json!("Label"));
        let doc = with_prop(doc, "wof:lang_x_spoken", json!(["fra"]));
        let doc = with_prop(doc, "wof:lang_x_official", json!(["deu"]));
        let doc = with_prop(doc, "name:deu_x_preferred", json!(["Offiziell"]));

        // spoken language has no translation, official does
        let area = extract(raw(doc.clone()), Placetype::Locality, &localized())
            .unwrap()
            .area;
        assert_eq!(area.name, "Offiziell");

        let doc = with_prop(doc, "name:fra_x_preferred", json!(["Parlé"]));
        let area = extract(raw(doc), Placetype::Locality, &localized())
            .unwrap()
            .area;
        assert_eq!(area.name, "Parlé");
    }

    #[test]
    fn test_localized_name_skips_sentinel_languages() {
        let doc = polygon_doc(1, "Raw", "locality", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:label", json!("Label"));
        let doc = with_prop(doc, "wof:lang_x_spoken", json!(["unk"]));
        let doc = with_prop(doc, "wof:lang_x_official", json!("und"));
        let doc = with_prop(doc, "wof:lang", json!([]));
        let doc = with_prop(doc, "name:unk_x_preferred", json!(["Never"]));

        let area = extract(raw(doc), Placetype::Locality, &localized())
            .unwrap()
            .area;
        assert_eq!(area.name, "Label");
    }

    #[test]
    fn test_language_tag_forms() {
        assert_eq!(language_tag(Some(&json!("eng"))), Some("eng"));
        assert_eq!(language_tag(Some(&json!(["eng", "fra"]))), Some("eng"));
        assert_eq!(language_tag(Some(&json!(""))), None);
        assert_eq!(language_tag(Some(&json!(["und"]))), None);
        assert_eq!(language_tag(None), None);
    }

    #[test]
    fn test_country_abbreviation_chain() {
        let doc = polygon_doc(85633793, "United States", "country", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:country", json!("US"));

        let from_alpha2 = extract_default(doc.clone(), Placetype::Country);
        assert_eq!(from_alpha2.abbreviation.as_deref(), Some("USA"));

        let doc = with_prop(doc, "ne:iso_a3", json!("-99"));
        let doc = with_prop(doc, "ne:adm0_a3", json!("usa"));
        let from_ne = extract_default(doc.clone(), Placetype::Country);
        assert_eq!(from_ne.abbreviation.as_deref(), Some("USA"));

        let doc = with_prop(doc, "wof:country_alpha3", json!("XYZ"));
        let from_alpha3 = extract_default(doc, Placetype::Country);
        assert_eq!(from_alpha3.abbreviation.as_deref(), Some("XYZ"));
    }

    #[test]
    fn test_placeholder_country_has_no_abbreviation() {
        let doc = polygon_doc(1, "Disputed", "country", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:country", json!("XX"));
        let doc = with_prop(doc, "wof:shortcode", json!("XX"));
        let area = extract_default(doc, Placetype::Country);
        assert_eq!(area.abbreviation, None);
    }

    #[test]
    fn test_dependency_uses_country_codes() {
        let doc = polygon_doc(1, "Guam", "dependency", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:shortcode", json!("GU"));
        let area = extract_default(doc, Placetype::Dependency);
        assert_eq!(area.abbreviation.as_deref(), Some("GUM"));
    }

    #[test]
    fn test_region_abbreviation() {
        let doc = polygon_doc(1, "Texas", "region", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(doc, "wof:abbreviation", json!("TX"));
        let doc = with_prop(doc, "abrv:eng_x_preferred", json!(["Tex."]));
        let doc = with_prop(doc, "wof:lang_x_official", json!(["eng"]));

        let plain = extract_default(doc.clone(), Placetype::Region);
        assert_eq!(plain.abbreviation.as_deref(), Some("TX"));

        let area = extract(raw(doc), Placetype::Region, &localized())
            .unwrap()
            .area;
        assert_eq!(area.abbreviation.as_deref(), Some("Tex."));
    }

    #[test]
    fn test_hierarchy_condensed_to_values() {
        let doc = polygon_doc(789, "Hood", "neighbourhood", [[0.0, 0.0], [1.0, 1.0]]);
        let doc = with_prop(
            doc,
            "wof:hierarchy",
            json!([
                { "locality_id": 123, "region_id": 456 },
                { "localadmin_id": "321", "region_id": 456 }
            ]),
        );
        let area = extract_default(doc, Placetype::Neighbourhood);
        assert_eq!(area.hierarchy, vec![vec![123, 456], vec![321, 456]]);
    }

    #[test]
    fn test_missing_hierarchy_is_self_rooted() {
        let doc = polygon_doc(42, "Root", "country", [[0.0, 0.0], [1.0, 1.0]]);
        assert_eq!(extract_default(doc, Placetype::Country).hierarchy, vec![vec![42]]);
    }

    #[test]
    fn test_centroid_prefers_label_position() {
        let doc = polygon_doc(1, "A", "locality", [[0.0, 0.0], [2.0, 2.0]]);
        let area = extract_default(doc.clone(), Placetype::Locality);
        assert_eq!(area.centroid, Centroid { lat: 1.0, lon: 1.0 });

        let doc = with_prop(doc, "lbl:latitude", json!(0.5));
        let doc = with_prop(doc, "lbl:longitude", json!(1.5));
        let area = extract_default(doc, Placetype::Locality);
        assert_eq!(area.centroid, Centroid { lat: 0.5, lon: 1.5 });
    }

    #[test]
    fn test_bbox_computed_when_absent() {
        let mut doc = polygon_doc(1, "A", "locality", [[0.0, 0.0], [2.0, 3.0]]);
        doc["properties"]
            .as_object_mut()
            .unwrap()
            .remove("geom:bbox");
        let area = extract_default(doc, Placetype::Locality);
        assert_eq!(area.bounding_box.as_deref(), Some("0,0,2,3"));
    }

    #[test]
    fn test_unknown_placetype_uses_layer() {
        let doc = polygon_doc(1, "Campus", "campus", [[0.0, 0.0], [1.0, 1.0]]);
        let area = extract_default(doc, Placetype::Locality);
        assert_eq!(area.placetype, Placetype::Locality);
    }
}
