//! Reads a layer's WOF metadata CSV and lazily loads the records it lists.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::models::{Placetype, RawFeature};

/// One row of `whosonfirst-data-<layer>-latest.csv`. Only the columns we use.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    #[serde(default)]
    pub superseded_by: Option<String>,
    #[serde(default)]
    pub deprecated: Option<String>,
}

impl MetaRecord {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Superseded or deprecated rows are replaced by another record and never loaded.
    pub fn is_retired(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.superseded_by) || set(&self.deprecated)
    }
}

/// Path of the metadata CSV for a layer under `data_root`
pub fn metadata_path(data_root: &Path, layer: Placetype) -> PathBuf {
    data_root
        .join("meta")
        .join(format!("whosonfirst-data-{}-latest.csv", layer))
}

/// Lazy sequence of raw features for one layer.
///
/// Records that cannot be read or parsed are logged and skipped.
pub struct LayerRecords {
    layer: Placetype,
    data_dir: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<File, MetaRecord>,
}

impl LayerRecords {
    /// Open the metadata index for `layer`.
    pub fn open(data_root: &Path, layer: Placetype) -> Result<Self, LoadError> {
        let path = metadata_path(data_root, layer);
        if !path.is_file() {
            return Err(LoadError::MissingMetadata { layer, path });
        }

        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)
            .map_err(|source| LoadError::Metadata { layer, source })?;

        Ok(Self {
            layer,
            data_dir: data_root.join("data"),
            rows: reader.into_deserialize(),
        })
    }

    fn load(&self, row: &MetaRecord) -> Option<RawFeature> {
        let file = self.data_dir.join(&row.path);
        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "[{}] Failed to read {} ({} {}): {}",
                    self.layer,
                    file.display(),
                    row.id,
                    row.label(),
                    e
                );
                return None;
            }
        };

        match RawFeature::from_slice(&bytes) {
            Ok(feature) => Some(feature),
            Err(e) => {
                warn!(
                    "[{}] Failed to parse {} ({} {}): {}",
                    self.layer,
                    file.display(),
                    row.id,
                    row.label(),
                    e
                );
                None
            }
        }
    }
}

impl Iterator for LayerRecords {
    type Item = RawFeature;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => {
                    warn!("[{}] Skipping malformed metadata row: {}", self.layer, e);
                    continue;
                }
            };

            if row.is_retired() {
                debug!(
                    "[{}] Skipping retired record {} ({})",
                    self.layer,
                    row.id,
                    row.label()
                );
                continue;
            }

            if let Some(feature) = self.load(&row) {
                return Some(feature);
            }
        }
    }
}
