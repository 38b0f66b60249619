use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::ScanBus;
use crate::config::ScanConfig;
use crate::error::EngineError;
use crate::pipeline::{self, ExportSink, Exporter, ScanStatusAggregator, StdoutSink};

/// Per-worker shutdown + join handle, mirroring `gauss_engine::bootstrap`'s
/// `ProcessorSlot`: one watch sender per task, `shutdown` fans all of them
/// out and then joins.
struct WorkerSlot {
    stage: &'static str,
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// The running engine: the bus every stage shares, plus the worker tasks
/// bootstrapped against it.
pub struct Engine {
    bus: ScanBus,
    status: Arc<ScanStatusAggregator>,
    workers: Vec<WorkerSlot>,
    config: ScanConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workers", &self.workers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    /// Bootstrap the engine: build the bus, build the exporter's sink from
    /// `config.export_sink`, then spawn `N` workers per stage.
    pub async fn bootstrap(config: ScanConfig) -> Result<Self, EngineError> {
        let bus = ScanBus::new(config.prefetch);
        let status = Arc::new(ScanStatusAggregator::new());

        let sink: Box<dyn ExportSink> = match config.export_sink.as_deref() {
            None | Some("stdout") => Box::new(StdoutSink),
            Some(path) => Box::new(
                pipeline::FileSink::open(path)
                    .map_err(|e| EngineError::Config(format!("export_sink {path}: {e}")))?,
            ),
        };
        let exporter = Arc::new(Exporter::new(sink, status.clone()));

        let mut workers = Vec::new();
        for _ in 0..config.explorer_workers {
            workers.push(spawn_stage("explorer", bus.clone(), pipeline::explorer::run));
        }
        for _ in 0..config.processor_workers {
            workers.push(spawn_stage("processor", bus.clone(), pipeline::processor::run));
        }
        for _ in 0..config.matcher_workers {
            workers.push(spawn_stage("matcher", bus.clone(), pipeline::matcher::run));
        }
        for _ in 0..config.tagger_workers {
            workers.push(spawn_stage("tagger", bus.clone(), pipeline::tagger::run));
        }
        for _ in 0..config.exporter_workers {
            let bus = bus.clone();
            let exporter = exporter.clone();
            workers.push(spawn_stage_with(
                "exporter",
                move |shutdown_rx| spawn_exporter(bus, exporter, shutdown_rx),
            ));
        }

        Ok(Self { bus, status, workers, config })
    }

    pub fn bus(&self) -> &ScanBus {
        &self.bus
    }

    pub fn status(&self) -> &Arc<ScanStatusAggregator> {
        &self.status
    }

    /// Reload worker counts from a new configuration (§6 SIGHUP). Queue
    /// names and prefetch depth can't change without restarting — they're
    /// baked into the bus built at `bootstrap` time — but the number of
    /// workers per stage can be scaled up or down in place.
    pub async fn reload(&mut self, new_config: ScanConfig) -> Result<(), EngineError> {
        if new_config.prefetch != self.config.prefetch {
            return Err(EngineError::Config(
                "prefetch cannot be changed without a restart".to_string(),
            ));
        }

        self.rescale("explorer", new_config.explorer_workers, pipeline::explorer::run)
            .await;
        self.rescale("processor", new_config.processor_workers, pipeline::processor::run)
            .await;
        self.rescale("matcher", new_config.matcher_workers, pipeline::matcher::run)
            .await;
        self.rescale("tagger", new_config.tagger_workers, pipeline::tagger::run)
            .await;

        self.config = new_config;
        tracing::info!("config reload complete");
        Ok(())
    }

    async fn rescale<F, Fut>(&mut self, stage: &'static str, target: usize, stage_fn: F)
    where
        F: Fn(ScanBus) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let current = self.workers.iter().filter(|w| w.stage == stage).count();
        if target < current {
            let mut to_remove = current - target;
            let mut i = 0;
            while i < self.workers.len() && to_remove > 0 {
                if self.workers[i].stage == stage {
                    let slot = self.workers.remove(i);
                    let _ = slot.shutdown_tx.send(true);
                    let _ = slot.handle.await;
                    to_remove -= 1;
                } else {
                    i += 1;
                }
            }
        } else {
            for _ in 0..(target - current) {
                self.workers.push(spawn_stage(stage, self.bus.clone(), stage_fn.clone()));
            }
        }
    }

    /// Graceful shutdown: signal every worker and wait for them all to exit.
    pub async fn shutdown(self) {
        for slot in &self.workers {
            let _ = slot.shutdown_tx.send(true);
        }
        for slot in self.workers {
            let _ = slot.handle.await;
        }
        tracing::info!("engine shut down");
    }
}

fn spawn_stage<F, Fut>(stage: &'static str, bus: ScanBus, stage_fn: F) -> WorkerSlot
where
    F: FnOnce(ScanBus) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        tokio::select! {
            () = stage_fn(bus) => {
                tracing::info!(stage, "worker stopped");
            }
            _ = shutdown_rx.changed() => {
                tracing::info!(stage, "worker shutting down");
            }
        }
    });
    tracing::info!(stage, "spawned worker");
    WorkerSlot { stage, handle, shutdown_tx }
}

fn spawn_stage_with<F, Fut>(stage: &'static str, spawn: F) -> WorkerSlot
where
    F: FnOnce(watch::Receiver<bool>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(spawn(shutdown_rx));
    tracing::info!(stage, "spawned worker");
    WorkerSlot { stage, handle, shutdown_tx }
}

async fn spawn_exporter(bus: ScanBus, exporter: Arc<Exporter>, mut shutdown_rx: watch::Receiver<bool>) {
    tokio::select! {
        () = pipeline::exporter::run(bus, exporter) => {
            tracing::info!(stage = "exporter", "worker stopped");
        }
        _ = shutdown_rx.changed() => {
            tracing::info!(stage = "exporter", "worker shutting down");
        }
    }
}
