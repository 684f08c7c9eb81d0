//! PIP coordinator: one worker per layer, fan-out lookups, gather replies.
//!
//! All coordinator state (the worker table and the pending-request map) lives
//! on a single dispatch task and is only touched while handling one message
//! at a time, so it needs no locking.
//!
//! # Result order
//!
//! Results are returned in requested-layer order (the caller's list,
//! deduplicated, or load order when no list is given), not reply order.
//! Layers with no containing polygon contribute nothing.
//!
//! # Timeouts
//!
//! With `request_timeout_secs` unset, a worker that never replies leaves its
//! request pending forever. When set, the callback receives
//! [`PipError::Timeout`] with whatever arrived in time.

use std::time::Duration;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::{RequestId, WorkerCommand, WorkerEvent};
use super::worker::{self, WorkerHandle};
use crate::config::PipConfig;
use crate::error::{LoadError, PipError};
use crate::models::{AdminArea, Placetype};

/// Outcome delivered to a lookup callback
pub type LookupResult = Result<Vec<AdminArea>, PipError>;

type Callback = Box<dyn FnOnce(LookupResult) + Send>;

enum Inbound {
    Lookup {
        lat: f64,
        lon: f64,
        targets: Vec<Placetype>,
        callback: Callback,
    },
    Expire(RequestId),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running set of layer workers
pub struct Coordinator {
    inbound: mpsc::UnboundedSender<Inbound>,
    layers: Vec<Placetype>,
    sizes: HashMap<Placetype, usize>,
    dispatcher: JoinHandle<()>,
}

impl Coordinator {
    /// Start one worker per configured layer and wait until every layer has loaded.
    ///
    /// A layer whose metadata file is missing is skipped with a warning,
    /// unless `missing_metafiles_are_fatal` is set, in which case every
    /// missing layer is reported and no workers are left running.
    pub async fn create(config: &PipConfig) -> Result<Self, PipError> {
        let layers = config.resolved_layers();
        info!(
            "Starting PIP workers for {} layers from {}",
            layers.len(),
            config.data_root.display()
        );

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut workers: HashMap<Placetype, WorkerHandle> = HashMap::new();
        for &layer in &layers {
            let handle = worker::spawn(layer, config.worker_queue_capacity, events_tx.clone());
            handle
                .send(WorkerCommand::Load {
                    layer,
                    data_root: config.data_root.clone(),
                    options: config.ingest_options(),
                })
                .await;
            workers.insert(layer, handle);
        }
        drop(events_tx);

        let mut sizes: HashMap<Placetype, usize> = HashMap::new();
        let mut missing: Vec<(Placetype, std::path::PathBuf)> = Vec::new();
        let mut outstanding = layers.len();

        while outstanding > 0 {
            let Some(event) = events_rx.recv().await else {
                break;
            };
            match event {
                WorkerEvent::Loaded {
                    layer,
                    count,
                    elapsed,
                } => {
                    info!(
                        "[{}] Ready with {} boundaries ({:.2}s)",
                        layer,
                        count,
                        elapsed.as_secs_f64()
                    );
                    sizes.insert(layer, count);
                    outstanding -= 1;
                }
                WorkerEvent::LoadFailed {
                    layer,
                    error: LoadError::MissingMetadata { path, .. },
                } => {
                    missing.push((layer, path));
                    outstanding -= 1;
                }
                WorkerEvent::LoadFailed { layer, error } => {
                    error!("[{}] Layer failed to load: {}", layer, error);
                    outstanding -= 1;
                }
                WorkerEvent::Results { request_id, .. } => {
                    error!("Unexpected search results {} during startup", request_id);
                }
            }
        }

        if config.missing_metafiles_are_fatal && !missing.is_empty() {
            let missing_layers: Vec<Placetype> = layers
                .iter()
                .copied()
                .filter(|l| missing.iter().any(|(m, _)| m == l))
                .collect();
            for (_, handle) in workers.drain() {
                handle.terminate().await;
            }
            let err = PipError::MissingMetadata {
                layers: missing_layers,
            };
            error!("{}", err);
            return Err(err);
        }

        for (layer, path) in &missing {
            warn!(
                "Missing metadata file {}, continuing without layer {}",
                path.display(),
                layer
            );
        }

        // Anything that did not report Loaded is left out
        let dead: Vec<Placetype> = workers
            .keys()
            .copied()
            .filter(|l| !sizes.contains_key(l))
            .collect();
        for layer in dead {
            if let Some(handle) = workers.remove(&layer) {
                handle.terminate().await;
            }
        }

        let loaded: Vec<Placetype> = layers
            .iter()
            .copied()
            .filter(|l| sizes.contains_key(l))
            .collect();
        info!(
            "PIP coordinator ready with layers: {}",
            loaded
                .iter()
                .map(Placetype::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            workers,
            pending: HashMap::new(),
            timeout: config.request_timeout(),
            inbound: inbound.downgrade(),
        };
        let dispatcher = tokio::spawn(dispatcher.run(inbound_rx, events_rx));

        Ok(Self {
            inbound,
            layers: loaded,
            sizes,
            dispatcher,
        })
    }

    /// Layers that loaded successfully, in configured order
    pub fn layers(&self) -> &[Placetype] {
        &self.layers
    }

    /// Number of indexed boundaries per loaded layer
    pub fn layer_sizes(&self) -> &HashMap<Placetype, usize> {
        &self.sizes
    }

    /// The layers a lookup will query: requested names that are loaded, in
    /// request order. Unknown and unloaded names are ignored.
    pub fn target_layers<S: AsRef<str>>(&self, requested: Option<&[S]>) -> Vec<Placetype> {
        let Some(requested) = requested else {
            return self.layers.clone();
        };

        let mut targets = Vec::new();
        for name in requested {
            if let Ok(layer) = name.as_ref().parse::<Placetype>() {
                if self.layers.contains(&layer) && !targets.contains(&layer) {
                    targets.push(layer);
                }
            }
        }
        targets
    }

    /// Resolve a point against the requested layers; `callback` runs once with the result.
    ///
    /// When no requested layer is loaded the callback runs immediately with an
    /// empty list, without contacting any worker.
    pub fn lookup_with<S, F>(&self, lat: f64, lon: f64, layers: Option<&[S]>, callback: F)
    where
        S: AsRef<str>,
        F: FnOnce(LookupResult) + Send + 'static,
    {
        let targets = self.target_layers(layers);
        if targets.is_empty() {
            callback(Ok(Vec::new()));
            return;
        }

        let message = Inbound::Lookup {
            lat,
            lon,
            targets,
            callback: Box::new(callback),
        };
        if let Err(mpsc::error::SendError(Inbound::Lookup { callback, .. })) =
            self.inbound.send(message)
        {
            callback(Err(PipError::Shutdown));
        }
    }

    /// Async form of [`Coordinator::lookup_with`]
    pub async fn lookup<S: AsRef<str>>(
        &self,
        lat: f64,
        lon: f64,
        layers: Option<&[S]>,
    ) -> LookupResult {
        let (tx, rx) = oneshot::channel();
        self.lookup_with(lat, lon, layers, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(PipError::Shutdown))
    }

    /// Terminate every worker and wait for them to stop
    pub async fn end(self) {
        let (tx, rx) = oneshot::channel();
        if self.inbound.send(Inbound::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = self.dispatcher.await {
            error!("PIP dispatcher failed: {}", e);
        }
    }
}

/// Bookkeeping for one in-flight lookup
struct PendingResponse {
    targets: Vec<Placetype>,
    replies: HashMap<Placetype, Option<AdminArea>>,
    callback: Callback,
}

impl PendingResponse {
    fn is_complete(&self) -> bool {
        self.replies.len() == self.targets.len()
    }

    /// Non-empty replies in target order
    fn results(&mut self) -> Vec<AdminArea> {
        self.targets
            .iter()
            .filter_map(|layer| self.replies.remove(layer).flatten())
            .collect()
    }

    fn missing(&self) -> Vec<Placetype> {
        self.targets
            .iter()
            .copied()
            .filter(|l| !self.replies.contains_key(l))
            .collect()
    }
}

struct Dispatcher {
    workers: HashMap<Placetype, WorkerHandle>,
    pending: HashMap<RequestId, PendingResponse>,
    timeout: Option<Duration>,
    inbound: mpsc::WeakUnboundedSender<Inbound>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        let shutdown_ack = loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(Inbound::Lookup { lat, lon, targets, callback }) => {
                        self.start_request(Uuid::new_v4(), lat, lon, targets, callback).await;
                    }
                    Some(Inbound::Expire(id)) => self.expire(id),
                    Some(Inbound::Shutdown(ack)) => break Some(ack),
                    // every Coordinator handle is gone
                    None => break None,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        };

        self.shutdown().await;
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn start_request(
        &mut self,
        id: RequestId,
        lat: f64,
        lon: f64,
        targets: Vec<Placetype>,
        callback: Callback,
    ) {
        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                error!("Request id {} is already pending; answering empty", id);
                callback(Ok(Vec::new()));
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingResponse {
                    targets: targets.clone(),
                    replies: HashMap::new(),
                    callback,
                });
            }
        }

        debug!("Lookup {} at ({}, {}) across {} layers", id, lat, lon, targets.len());

        for layer in targets {
            let delivered = match self.workers.get(&layer) {
                Some(handle) => {
                    handle
                        .send(WorkerCommand::Search {
                            request_id: id,
                            lat,
                            lon,
                        })
                        .await
                }
                None => false,
            };
            if !delivered {
                warn!("[{}] Worker unavailable, no result for {}", layer, id);
                self.record_reply(id, layer, None);
            }
        }

        if let Some(timeout) = self.timeout {
            if self.pending.contains_key(&id) {
                let inbound = self.inbound.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(inbound) = inbound.upgrade() {
                        let _ = inbound.send(Inbound::Expire(id));
                    }
                });
            }
        }
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Results {
                request_id,
                layer,
                result,
            } => self.record_reply(request_id, layer, result),
            WorkerEvent::Loaded { layer, .. } | WorkerEvent::LoadFailed { layer, .. } => {
                error!("[{}] Unexpected load event after startup, ignoring", layer);
            }
        }
    }

    fn record_reply(&mut self, id: RequestId, layer: Placetype, result: Option<AdminArea>) {
        let Some(pending) = self.pending.get_mut(&id) else {
            warn!("[{}] Reply for unknown or expired request {}", layer, id);
            return;
        };
        if !pending.targets.contains(&layer) || pending.replies.contains_key(&layer) {
            error!("[{}] Unexpected reply for request {}", layer, id);
            return;
        }

        pending.replies.insert(layer, result);
        if pending.is_complete() {
            if let Some(mut done) = self.pending.remove(&id) {
                let results = done.results();
                (done.callback)(Ok(results));
            }
        }
    }

    fn expire(&mut self, id: RequestId) {
        let Some(mut pending) = self.pending.remove(&id) else {
            return;
        };
        let missing = pending.missing();
        warn!(
            "Lookup {} timed out waiting for {} layer(s)",
            id,
            missing.len()
        );
        let partial = pending.results();
        (pending.callback)(Err(PipError::Timeout { partial, missing }));
    }

    async fn shutdown(&mut self) {
        for (_, pending) in self.pending.drain() {
            (pending.callback)(Err(PipError::Shutdown));
        }
        for (_, handle) in self.workers.drain() {
            debug!("[{}] Terminating worker", handle.layer());
            handle.terminate().await;
        }
        info!("PIP coordinator stopped");
    }
}
