//! Layer worker: owns one layer's index on its own task.
//!
//! A worker starts in `Loading`, builds its index on the blocking pool when
//! it receives `Load`, then answers `Search` commands from `Ready`. It never
//! goes back to `Loading`. `Terminate` stops it in either state.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::protocol::{RequestId, WorkerCommand, WorkerEvent};
use super::LayerIndex;
use crate::config::IngestOptions;
use crate::error::LoadError;
use crate::models::Placetype;
use crate::wof;

/// Coordinator-side handle to a running worker
pub struct WorkerHandle {
    layer: Placetype,
    commands: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn layer(&self) -> Placetype {
        self.layer
    }

    /// Queue a command. Returns false if the worker has stopped.
    pub async fn send(&self, command: WorkerCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Ask the worker to stop and wait for it
    pub async fn terminate(self) {
        let _ = self.commands.send(WorkerCommand::Terminate).await;
        if let Err(e) = self.task.await {
            error!("[{}] Worker task failed: {}", self.layer, e);
        }
    }
}

/// Start a worker task for `layer`. It waits for a `Load` command.
pub fn spawn(
    layer: Placetype,
    queue_capacity: usize,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> WorkerHandle {
    let (commands, rx) = mpsc::channel(queue_capacity.max(1));
    let worker = LayerWorker {
        layer,
        events,
        state: WorkerState::Loading,
    };
    let task = tokio::spawn(worker.run(rx));
    WorkerHandle {
        layer,
        commands,
        task,
    }
}

enum WorkerState {
    Loading,
    Ready(LayerIndex),
}

struct LayerWorker {
    layer: Placetype,
    events: mpsc::UnboundedSender<WorkerEvent>,
    state: WorkerState,
}

impl LayerWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<WorkerCommand>) {
        // Commands that arrived while the index was building, in arrival order
        let mut backlog = VecDeque::new();

        loop {
            let command = match backlog.pop_front() {
                Some(command) => command,
                None => match commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                WorkerCommand::Terminate => break,
                WorkerCommand::Load {
                    layer,
                    data_root,
                    options,
                } => {
                    if matches!(self.state, WorkerState::Ready(_)) {
                        error!("[{}] Ignoring load for {}: already loaded", self.layer, layer);
                        continue;
                    }
                    if !self
                        .load(data_root, options, &mut commands, &mut backlog)
                        .await
                    {
                        break;
                    }
                }
                WorkerCommand::Search {
                    request_id,
                    lat,
                    lon,
                } => self.search(request_id, lat, lon),
            }
        }

        debug!("[{}] Worker stopped", self.layer);
    }

    /// Build the index off the async runtime. Returns false when terminated mid-load.
    ///
    /// A running blocking task cannot be aborted, so termination sets a cancel
    /// flag the load checks per record and waits for it to wind down.
    async fn load(
        &mut self,
        data_root: PathBuf,
        options: IngestOptions,
        commands: &mut mpsc::Receiver<WorkerCommand>,
        backlog: &mut VecDeque<WorkerCommand>,
    ) -> bool {
        let layer = self.layer;
        let start = Instant::now();
        let cancel = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&cancel);
        let mut build = tokio::task::spawn_blocking(move || {
            let boundaries = wof::load_layer(&data_root, layer, &options, &flag)?;
            if flag.load(Ordering::Relaxed) {
                return Err(LoadError::Cancelled { layer });
            }
            Ok::<_, LoadError>(LayerIndex::build(layer, boundaries))
        });

        let outcome = loop {
            tokio::select! {
                joined = &mut build => break joined,
                command = commands.recv() => match command {
                    Some(WorkerCommand::Terminate) | None => {
                        cancel.store(true, Ordering::Relaxed);
                        build.abort();
                        let stopped = match build.await {
                            Ok(Err(LoadError::Cancelled { .. })) => true,
                            Err(e) => e.is_cancelled(),
                            Ok(_) => false,
                        };
                        if stopped {
                            info!("[{}] Terminated while loading, load cancelled", layer);
                        } else {
                            warn!("[{}] Terminated while loading, discarding finished index", layer);
                        }
                        return false;
                    }
                    Some(other) => backlog.push_back(other),
                },
            }
        };

        let event = match outcome {
            Ok(Ok(index)) => {
                let count = index.len();
                let elapsed = start.elapsed();
                info!(
                    "[{}] Loaded {} boundaries in {:.2}s",
                    layer,
                    count,
                    elapsed.as_secs_f64()
                );
                self.state = WorkerState::Ready(index);
                WorkerEvent::Loaded {
                    layer,
                    count,
                    elapsed,
                }
            }
            Ok(Err(error)) => WorkerEvent::LoadFailed { layer, error },
            Err(e) => WorkerEvent::LoadFailed {
                layer,
                error: LoadError::Aborted {
                    layer,
                    reason: e.to_string(),
                },
            },
        };
        self.emit(event);
        true
    }

    fn search(&self, request_id: RequestId, lat: f64, lon: f64) {
        let result = match &self.state {
            WorkerState::Ready(index) => index.search(lon, lat).map(|b| b.area.clone()),
            WorkerState::Loading => {
                warn!("[{}] Search {} before layer was loaded", self.layer, request_id);
                None
            }
        };

        self.emit(WorkerEvent::Results {
            request_id,
            layer: self.layer,
            result,
        });
    }

    fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            debug!("[{}] Coordinator gone, dropping event", self.layer);
        }
    }
}
