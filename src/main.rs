use std::sync::Arc;

use clap::Parser;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

use yolo_mjpeg_relay::adapters::{
    http::{self, router, state::HttpState},
    onnx::model_catalog::OnnxDetectorLoader,
    sources::{camera_catalog, DefaultSourceOpener},
    synthetic::StubDetectorLoader,
};
use yolo_mjpeg_relay::application::{
    ports::DetectorLoader,
    services::{CameraService, PipelineService},
};
use yolo_mjpeg_relay::config::Cli;

/// Cajas que devuelve el detector sintético cuando no hay modelo.
const STUB_DETECTIONS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logs (RUST_LOG=info por defecto)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 2. Configuración
    let cli = Cli::parse();
    let settings = cli.stream_settings()?;
    let default_source = cli.default_source()?;
    let addr = cli.listen_addr()?;

    tracing::info!("🔧 Inicializando adaptadores de infraestructura...");

    // 3. Adaptadores
    let opener = Arc::new(DefaultSourceOpener::new(settings.frame_size));
    let detectors: Arc<dyn DetectorLoader> = match cli.inference_config()? {
        Some(config) => {
            tracing::info!("🧠 Detector ONNX: {}", config.model.onnx_path);
            Arc::new(OnnxDetectorLoader::new(config)?)
        }
        None => {
            tracing::warn!("Sin --model: se usa el detector sintético");
            Arc::new(StubDetectorLoader::new(STUB_DETECTIONS))
        }
    };

    // 4. Servicios
    let camera_service = Arc::new(CameraService::new(camera_catalog()));
    let pipeline_service = Arc::new(
        PipelineService::new(opener, detectors, settings)?.with_default_source(default_source, cli.auto_start),
    );

    let state = HttpState {
        camera: camera_service,
        pipeline: pipeline_service.clone(),
    };

    // 5. Router y estáticos
    let app = router(state).fallback_service(ServeDir::new(&cli.static_dir));

    // 6. Servidor
    tracing::info!("🚀 Servidor MJPEG iniciado en http://{}", addr);
    tracing::info!("📂 Archivos estáticos servidos desde '{}'", cli.static_dir.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // El pipeline (y con él el dispositivo) se detiene dentro del apagado.
    http::serve(listener, app, pipeline_service, shutdown_signal()).await?;
    tracing::info!("👋 Servidor detenido");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("No se pudo escuchar Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C recibido, cerrando...");
}
