use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    application::{
        emitter::EmitterSettings,
        ports::{CameraCatalogPort, DetectorLoader, SourceOpener},
        producer::{Producer, ProducerExit},
        relay::{RelayBuffer, RelayCursor},
    },
    domain::{
        camera::{CameraInfo, SourceSpec},
        errors::{DomainError, DomainResult},
        stream::{LifecycleState, ProducerStats, StreamSettings, StreamStatus},
    },
};

/// Servicio de inventario de cámaras.
#[derive(Clone)]
pub struct CameraService {
    catalog: Arc<dyn CameraCatalogPort>,
}

impl CameraService {
    pub fn new(catalog: Arc<dyn CameraCatalogPort>) -> Self {
        Self { catalog }
    }

    pub async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        self.catalog.list_cameras().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyIdle,
}

struct ProducerRun {
    id: u64,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

struct Lifecycle {
    state: LifecycleState,
    source: Option<SourceSpec>,
    run: Option<ProducerRun>,
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    state_tx: watch::Sender<LifecycleState>,
    /// Copia de `lifecycle.source` legible sin esperar al candado del ciclo de vida.
    current_source: RwLock<Option<SourceSpec>>,
    relay: Arc<RelayBuffer>,
    stats: Arc<RwLock<ProducerStats>>,
}

impl Shared {
    fn publish(&self, lifecycle: &mut Lifecycle, state: LifecycleState) {
        lifecycle.state = state;
        if let Ok(mut current) = self.current_source.write() {
            *current = lifecycle.source.clone();
        }
        self.state_tx.send_replace(state);
    }

    /// Salida propia del productor (fin de stream o fallo): Running → Stopping
    /// mientras se libera la fuente. Corre en el hilo del productor.
    fn begin_stopping(&self, id: u64, exit: ProducerExit) {
        let mut lifecycle = self.lifecycle.blocking_lock();
        let current = lifecycle.run.as_ref().map(|r| r.id) == Some(id);
        if current && lifecycle.state == LifecycleState::Running {
            self.publish(&mut lifecycle, LifecycleState::Stopping);
            info!(run = id, ?exit, "Pipeline: el productor terminó, liberando la fuente");
        }
    }

    /// Cancela y espera al productor, vacía el buffer y publica Idle.
    async fn teardown(&self, run: Option<ProducerRun>) {
        if let Some(run) = run {
            run.cancel.store(true, Ordering::SeqCst);
            self.relay.close();
            self.relay.clear();
            if let Err(e) = run.task.await {
                warn!(run = run.id, "Pipeline: error esperando al productor: {}", e);
            }
        }
        self.relay.clear();

        let mut lifecycle = self.lifecycle.lock().await;
        lifecycle.source = None;
        self.publish(&mut lifecycle, LifecycleState::Idle);
        info!("Pipeline: detenido");
    }
}

/// Controlador del ciclo de vida del pipeline (Idle → Running → Stopping → Idle).
///
/// Es dueño del buffer de relevo y de la tarea productora; nunca hay más de un
/// productor por instancia.
#[derive(Clone)]
pub struct PipelineService {
    shared: Arc<Shared>,
    opener: Arc<dyn SourceOpener>,
    detectors: Arc<dyn DetectorLoader>,
    settings: StreamSettings,
    default_source: Option<SourceSpec>,
    auto_start: bool,
    next_run: Arc<AtomicU64>,
}

impl PipelineService {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        detectors: Arc<dyn DetectorLoader>,
        settings: StreamSettings,
    ) -> DomainResult<Self> {
        let relay = Arc::new(RelayBuffer::new(settings.buffer_capacity)?);
        let (state_tx, _) = watch::channel(LifecycleState::Idle);
        Ok(Self {
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle { state: LifecycleState::Idle, source: None, run: None }),
                state_tx,
                current_source: RwLock::new(None),
                relay,
                stats: Arc::new(RwLock::new(ProducerStats::default())),
            }),
            opener,
            detectors,
            settings,
            default_source: None,
            auto_start: false,
            next_run: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Fuente usada cuando un arranque no especifica ninguna.
    pub fn with_default_source(mut self, source: Option<SourceSpec>, auto_start: bool) -> Self {
        self.default_source = source;
        self.auto_start = auto_start;
        self
    }

    pub fn default_source(&self) -> Option<&SourceSpec> {
        self.default_source.as_ref()
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state_tx.subscribe()
    }

    pub fn relay(&self) -> Arc<RelayBuffer> {
        self.shared.relay.clone()
    }

    pub fn emitter_settings(&self) -> EmitterSettings {
        EmitterSettings {
            jpeg_quality: self.settings.jpeg_quality,
            read_timeout: self.settings.read_timeout(),
            max_consecutive_timeouts: self.settings.max_consecutive_timeouts,
        }
    }

    /// No toma el candado del ciclo de vida: responde aunque un arranque esté
    /// abriendo el dispositivo.
    pub async fn status(&self) -> StreamStatus {
        StreamStatus {
            state: self.state(),
            source: self.shared.current_source.read().map(|s| s.clone()).unwrap_or_default(),
            buffered: self.shared.relay.len(),
            stats: self.shared.stats.read().map(|s| s.clone()).unwrap_or_default(),
        }
    }

    async fn wait_for_idle(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == LifecycleState::Idle).await;
    }

    /// Arranca el productor. Si ya hay uno corriendo no hace nada.
    pub async fn start(&self, source: Option<SourceSpec>) -> DomainResult<StartOutcome> {
        let spec = source
            .or_else(|| self.default_source.clone())
            .ok_or_else(|| DomainError::SourceUnavailable("no source given and no default configured".into()))?;

        let mut lifecycle = loop {
            let lifecycle = self.shared.lifecycle.lock().await;
            match lifecycle.state {
                LifecycleState::Running => {
                    info!("Pipeline: ya en marcha, se ignora el arranque");
                    return Ok(StartOutcome::AlreadyRunning);
                }
                LifecycleState::Stopping => {
                    drop(lifecycle);
                    self.wait_for_idle().await;
                }
                LifecycleState::Idle => break lifecycle,
            }
        };

        // El candado se mantiene mientras se abre el dispositivo: un segundo
        // arranque concurrente verá Running y no abrirá otro handle.
        let opener = self.opener.clone();
        let detectors = self.detectors.clone();
        let open_spec = spec.clone();
        let (source, detector) = tokio::task::spawn_blocking(move || -> DomainResult<_> {
            let source = opener.open(&open_spec)?;
            let detector = detectors.load()?;
            Ok((source, detector))
        })
        .await
        .map_err(|e| DomainError::OperationFailed(format!("open task failed: {e}")))??;

        self.shared.relay.reopen();
        if let Ok(mut stats) = self.shared.stats.write() {
            *stats = ProducerStats::default();
        }

        let id = self.next_run.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        let hook_shared = self.shared.clone();
        let producer = Producer::new(
            source,
            detector,
            self.shared.relay.clone(),
            self.settings.clone(),
            cancel.clone(),
            self.shared.stats.clone(),
        )
        .on_exit(move |exit| hook_shared.begin_stopping(id, exit));

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let exit = tokio::task::spawn_blocking(move || producer.run()).await;
            if let Err(e) = &exit {
                error!("Pipeline: el hilo productor terminó de forma anómala: {}", e);
            }
            // Los consumidores vacían lo pendiente y terminan.
            shared.relay.close();

            let mut lifecycle = shared.lifecycle.lock().await;
            if lifecycle.run.as_ref().map(|r| r.id) == Some(id) {
                lifecycle.run = None;
                lifecycle.source = None;
                shared.publish(&mut lifecycle, LifecycleState::Idle);
                info!(run = id, "Pipeline: productor finalizado, estado Idle");
            }
        });

        info!(run = id, source = %spec, device = spec.resource().unwrap_or("-"), "Pipeline: productor iniciado");
        lifecycle.run = Some(ProducerRun { id, cancel, task });
        lifecycle.source = Some(spec);
        self.shared.publish(&mut lifecycle, LifecycleState::Running);
        Ok(StartOutcome::Started)
    }

    /// Detiene el productor y espera a que el dispositivo quede liberado.
    ///
    /// La parada corre en una tarea propia y llega a Idle aunque se abandone
    /// este futuro (por ejemplo, si el cliente HTTP se desconecta).
    pub async fn stop(&self) -> DomainResult<StopOutcome> {
        let run = {
            let mut lifecycle = self.shared.lifecycle.lock().await;
            match lifecycle.state {
                LifecycleState::Idle => return Ok(StopOutcome::AlreadyIdle),
                LifecycleState::Stopping => {
                    drop(lifecycle);
                    self.wait_for_idle().await;
                    return Ok(StopOutcome::AlreadyIdle);
                }
                LifecycleState::Running => {
                    self.shared.publish(&mut lifecycle, LifecycleState::Stopping);
                    lifecycle.run.take()
                }
            }
        };

        let shared = self.shared.clone();
        tokio::spawn(async move { shared.teardown(run).await })
            .await
            .map_err(|e| DomainError::OperationFailed(format!("stop task failed: {e}")))?;
        Ok(StopOutcome::Stopped)
    }

    /// Abre un cursor de lectura para una conexión `/video_feed`.
    ///
    /// Falla si no hay productor activo, salvo que esté activado el arranque
    /// automático con fuente por defecto.
    pub async fn open_feed(&self) -> DomainResult<RelayCursor> {
        if self.state() != LifecycleState::Running {
            if self.auto_start && self.default_source.is_some() {
                self.start(None).await?;
            } else {
                return Err(DomainError::SourceUnavailable("no active stream".into()));
            }
        }
        Ok(RelayCursor::new(self.relay()))
    }
}
