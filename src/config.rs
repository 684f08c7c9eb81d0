use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Placetype;

pub const DEFAULT_UK_BUFFER_RADIUS: f64 = 0.02;
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.0003;
pub const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 1024;

/// PIP engine configuration, usually read from a TOML file.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipConfig {
    /// WOF data root holding `meta/` and `data/`
    pub data_root: PathBuf,

    /// Layer names to load. `None` loads the default layer list.
    pub layers: Option<Vec<String>>,

    pub localized_admin_names: bool,

    /// Preferred language (ISO 639-3) for localized abbreviations
    pub localization_language: Option<String>,

    pub missing_metafiles_are_fatal: bool,

    /// Radius in degrees of the polygon substituted for UK point records
    pub uk_point_buffer_radius: f64,

    pub simplify_tolerance: f64,

    /// Seconds to wait for all layers before answering with partial results.
    /// Unset waits forever.
    pub request_timeout_secs: Option<u64>,

    pub worker_queue_capacity: usize,
}

impl Default for PipConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("."),
            layers: None,
            localized_admin_names: false,
            localization_language: None,
            missing_metafiles_are_fatal: false,
            uk_point_buffer_radius: DEFAULT_UK_BUFFER_RADIUS,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            request_timeout_secs: None,
            worker_queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY,
        }
    }
}

impl PipConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: PipConfig = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Layers to load, in configured order. Unknown names are dropped; duplicates are kept once.
    pub fn resolved_layers(&self) -> Vec<Placetype> {
        match &self.layers {
            None => Placetype::default_layers().to_vec(),
            Some(names) => {
                let mut layers: Vec<Placetype> = Vec::with_capacity(names.len());
                for name in names {
                    match name.parse::<Placetype>() {
                        Ok(layer) if !layers.contains(&layer) => layers.push(layer),
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Ignoring configured layer: {}", e),
                    }
                }
                layers
            }
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Options consumed by the per-layer ingest pipeline
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            localized_admin_names: self.localized_admin_names,
            localization_language: self.localization_language.clone(),
            uk_point_buffer_radius: self.uk_point_buffer_radius,
            simplify_tolerance: self.simplify_tolerance,
        }
    }
}

/// The subset of [`PipConfig`] a layer worker needs to build its index.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    pub localized_admin_names: bool,
    pub localization_language: Option<String>,
    pub uk_point_buffer_radius: f64,
    pub simplify_tolerance: f64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        PipConfig::default().ingest_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_toml_uses_defaults() {
        let config: PipConfig = toml::from_str(
            r#"
            data_root = "/data/wof"
            layers = ["borough", "neighbourhood", "bogus", "borough"]
            missing_metafiles_are_fatal = true
            request_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.data_root, PathBuf::from("/data/wof"));
        assert!(config.missing_metafiles_are_fatal);
        assert!(!config.localized_admin_names);
        assert_eq!(config.uk_point_buffer_radius, DEFAULT_UK_BUFFER_RADIUS);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.resolved_layers(),
            vec![Placetype::Borough, Placetype::Neighbourhood]
        );
    }

    #[test]
    fn test_default_layers_when_unset() {
        let config = PipConfig::new("/tmp");
        assert_eq!(config.resolved_layers(), Placetype::default_layers());
        assert_eq!(config.request_timeout(), None);
    }
}
