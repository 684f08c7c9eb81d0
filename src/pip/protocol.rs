//! Messages exchanged between the coordinator and layer workers.
//!
//! ```text
//! Coordinator ── Load / Search / Terminate ──► LayerWorker (one per layer)
//!      ▲                                            │
//!      └──────── Loaded / LoadFailed / Results ─────┘
//! ```
//!
//! Each worker has its own bounded command queue, processed in arrival
//! order. All workers share one unbounded event channel back to the
//! coordinator.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::config::IngestOptions;
use crate::error::LoadError;
use crate::models::{AdminArea, Placetype};

/// Correlates a search with the replies it produces
pub type RequestId = Uuid;

#[derive(Debug)]
pub enum WorkerCommand {
    /// Build the layer index. Only valid once, as the first command.
    Load {
        layer: Placetype,
        data_root: PathBuf,
        options: IngestOptions,
    },

    Search {
        request_id: RequestId,
        lat: f64,
        lon: f64,
    },

    /// Stop the worker, whatever it is doing
    Terminate,
}

#[derive(Debug)]
pub enum WorkerEvent {
    Loaded {
        layer: Placetype,
        count: usize,
        elapsed: Duration,
    },

    LoadFailed {
        layer: Placetype,
        error: LoadError,
    },

    /// Reply to a search; `result` is `None` when no polygon contains the point
    Results {
        request_id: RequestId,
        layer: Placetype,
        result: Option<AdminArea>,
    },
}
