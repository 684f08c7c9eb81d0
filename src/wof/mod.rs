//! Who's On First ingest: turns a layer's records on disk into indexable boundaries.
//!
//! Stages, in order: [`loader`] (metadata CSV + GeoJSON records), UK point
//! buffering, [`filters`], [`extract`], and geometry simplification.

pub mod country_codes;
pub mod extract;
pub mod filters;
pub mod geometry;
pub mod loader;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::iter::{ParallelBridge, ParallelIterator};
use tracing::info;

use crate::config::IngestOptions;
use crate::error::LoadError;
use crate::models::{Placetype, RawFeature};
use crate::pip::AdminBoundary;

pub use loader::{metadata_path, LayerRecords};

/// Run one raw record through buffering, filtering, extraction and simplification.
pub fn prepare_record(
    mut feature: RawFeature,
    layer: Placetype,
    options: &IngestOptions,
) -> Option<AdminBoundary> {
    geometry::buffer_uk_point(&mut feature, options.uk_point_buffer_radius);

    if !filters::passes(&feature) {
        return None;
    }

    extract::extract(feature, layer, options).map(|b| b.simplified(options.simplify_tolerance))
}

/// Load every indexable boundary of a layer. Records are read and prepared in
/// parallel, so the returned order is unspecified.
///
/// `cancel` is checked before each record; once set, the load stops early
/// with [`LoadError::Cancelled`].
pub fn load_layer(
    data_root: &Path,
    layer: Placetype,
    options: &IngestOptions,
    cancel: &AtomicBool,
) -> Result<Vec<AdminBoundary>, LoadError> {
    info!("[{}] Loading records from {}", layer, data_root.display());

    let records = LayerRecords::open(data_root, layer)?;
    let boundaries: Vec<AdminBoundary> = records
        .par_bridge()
        .map(|feature| {
            if cancel.load(Ordering::Relaxed) {
                return Err(LoadError::Cancelled { layer });
            }
            Ok(prepare_record(feature, layer, options))
        })
        .filter_map(Result::transpose)
        .collect::<Result<Vec<_>, LoadError>>()?;

    info!("[{}] Prepared {} boundaries", layer, boundaries.len());
    Ok(boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pip::LayerIndex;
    use crate::test_support::{point_doc, polygon_doc, raw, with_prop, DataRoot};
    use geo::Geometry;
    use serde_json::json;

    #[test]
    fn test_load_layer_filters_and_buffers() {
        let mut root = DataRoot::new();
        root.add(
            Placetype::Locality,
            1,
            polygon_doc(1, "Kept", "locality", [[0.0, 0.0], [1.0, 1.0]]),
        );
        root.add(
            Placetype::Locality,
            2,
            with_prop(
                polygon_doc(2, "Gone", "locality", [[0.0, 0.0], [1.0, 1.0]]),
                "mz:is_current",
                json!(0),
            ),
        );
        root.add(
            Placetype::Locality,
            3,
            with_prop(
                point_doc(3, "UK Village", "locality", -1.5, 52.5),
                "iso:country",
                json!("GB"),
            ),
        );
        root.add(
            Placetype::Locality,
            4,
            point_doc(4, "Elsewhere", "locality", 10.0, 10.0),
        );
        root.write_meta();

        let mut ids: Vec<i64> = load_layer(
            root.path(),
            Placetype::Locality,
            &IngestOptions::default(),
            &AtomicBool::new(false),
        )
        .unwrap()
        .into_iter()
        .map(|b| b.area.id)
        .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_load_layer_missing_metadata() {
        let root = DataRoot::new();
        let err = load_layer(
            root.path(),
            Placetype::Country,
            &IngestOptions::default(),
            &AtomicBool::new(false),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::MissingMetadata { .. }));
    }

    #[test]
    fn test_load_layer_stops_when_cancelled() {
        let mut root = DataRoot::new();
        for id in 1..=50 {
            root.add(
                Placetype::Locality,
                id,
                polygon_doc(id, "Town", "locality", [[0.0, 0.0], [1.0, 1.0]]),
            );
        }
        root.write_meta();

        let cancel = AtomicBool::new(true);
        let err = load_layer(
            root.path(),
            Placetype::Locality,
            &IngestOptions::default(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Cancelled {
                layer: Placetype::Locality
            }
        ));
    }

    #[test]
    fn test_multipolygon_with_hole_is_indexed() {
        // two squares; the first has a hole in its middle
        let doc = polygon_doc(9, "Islands", "locality", [[0.0, 0.0], [10.0, 4.0]]);
        let mut doc = with_prop(doc, "geom:bbox", json!("0,0,10,4"));
        doc["geometry"] = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [
                    [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]],
                    [[1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [1.0, 3.0], [1.0, 1.0]]
                ],
                [
                    [[6.0, 0.0], [10.0, 0.0], [10.0, 4.0], [6.0, 4.0], [6.0, 0.0]]
                ]
            ]
        });

        let boundary =
            prepare_record(raw(doc), Placetype::Locality, &IngestOptions::default()).unwrap();
        match &boundary.geometry {
            Geometry::MultiPolygon(multi) => {
                assert_eq!(multi.0.len(), 2);
                assert_eq!(multi.0[0].interiors().len(), 1);
            }
            other => panic!("expected a multipolygon, got {:?}", other),
        }

        let index = LayerIndex::build(Placetype::Locality, vec![boundary]);
        assert_eq!(index.search(0.5, 0.5).map(|b| b.area.id), Some(9));
        assert_eq!(index.search(8.0, 2.0).map(|b| b.area.id), Some(9));
        assert!(index.search(2.0, 2.0).is_none(), "inside the hole");
        assert!(index.search(5.0, 2.0).is_none(), "between the parts");
    }
}
