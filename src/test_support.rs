//! On-disk WOF fixtures for tests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::models::{Placetype, RawFeature};
use crate::wof::loader::metadata_path;

struct Row {
    id: i64,
    path: String,
    superseded_by: String,
}

/// A temporary data root with `meta/` and `data/` directories.
pub struct DataRoot {
    dir: TempDir,
    rows: BTreeMap<Placetype, Vec<Row>>,
}

impl DataRoot {
    pub fn new() -> Self {
        let dir = tempfile::Builder::new()
            .prefix("wof-pip-test-")
            .tempdir()
            .unwrap();
        fs::create_dir_all(dir.path().join("meta")).unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        Self {
            dir,
            rows: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a record file and list it in the layer's metadata
    pub fn add(&mut self, layer: Placetype, id: i64, doc: Value) {
        self.add_raw(layer, id, &doc.to_string());
    }

    pub fn add_raw(&mut self, layer: Placetype, id: i64, contents: &str) {
        let rel = format!("{}.geojson", id);
        fs::write(self.dir.path().join("data").join(&rel), contents).unwrap();
        self.add_row(layer, id, &rel);
    }

    /// List a record in the metadata without writing its file
    pub fn add_row(&mut self, layer: Placetype, id: i64, path: &str) {
        self.rows.entry(layer).or_default().push(Row {
            id,
            path: path.to_string(),
            superseded_by: String::new(),
        });
    }

    pub fn add_retired(&mut self, layer: Placetype, id: i64, superseded_by: &str) {
        self.rows.entry(layer).or_default().push(Row {
            id,
            path: format!("{}.geojson", id),
            superseded_by: superseded_by.to_string(),
        });
    }

    /// Write one metadata CSV per layer that has rows
    pub fn write_meta(&self) {
        for (layer, rows) in &self.rows {
            let mut writer = csv::Writer::from_path(metadata_path(self.path(), *layer)).unwrap();
            writer
                .write_record(["id", "name", "path", "superseded_by"])
                .unwrap();
            for row in rows {
                writer
                    .write_record([
                        row.id.to_string(),
                        format!("record {}", row.id),
                        row.path.clone(),
                        row.superseded_by.clone(),
                    ])
                    .unwrap();
            }
            writer.flush().unwrap();
        }
    }
}

/// Axis-aligned square polygon record spanning `[min, max]`.
pub fn polygon_doc(id: i64, name: &str, placetype: &str, extent: [[f64; 2]; 2]) -> Value {
    let [[x0, y0], [x1, y1]] = extent;
    json!({
        "id": id,
        "type": "Feature",
        "properties": {
            "wof:id": id,
            "wof:name": name,
            "wof:placetype": placetype,
            "geom:latitude": (y0 + y1) / 2.0,
            "geom:longitude": (x0 + x1) / 2.0,
            "geom:bbox": format!("{},{},{},{}", x0, y0, x1, y1),
        },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
        }
    })
}

pub fn point_doc(id: i64, name: &str, placetype: &str, lon: f64, lat: f64) -> Value {
    json!({
        "id": id,
        "type": "Feature",
        "properties": {
            "wof:id": id,
            "wof:name": name,
            "wof:placetype": placetype,
        },
        "geometry": { "type": "Point", "coordinates": [lon, lat] }
    })
}

/// Set a property on a fixture document
pub fn with_prop(mut doc: Value, key: &str, value: Value) -> Value {
    doc["properties"][key] = value;
    doc
}

pub fn raw(doc: Value) -> RawFeature {
    RawFeature::from_slice(doc.to_string().as_bytes()).unwrap()
}

/// Collects log lines emitted on the current thread while the guard is alive.
///
/// Under `#[tokio::test]` that includes every task on the test runtime, but
/// not the blocking pool or rayon threads.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
