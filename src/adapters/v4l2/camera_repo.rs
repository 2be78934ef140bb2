use async_trait::async_trait;
use v4l::video::Capture;
use v4l::Device;

use crate::application::ports::CameraCatalogPort;
use crate::domain::camera::{CameraId, CameraInfo};
use crate::domain::errors::{DomainError, DomainResult};

/// Inventario de nodos `/dev/video*` capaces de capturar.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2CameraCatalog;

impl V4l2CameraCatalog {
    pub fn new() -> Self {
        Self
    }
}

fn probe_devices() -> Vec<CameraInfo> {
    let mut cameras: Vec<CameraInfo> = v4l::context::enum_devices()
        .into_iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().into_owned();
            let dev = Device::with_path(&path).ok()?;
            // Los nodos de metadatos no tienen formato de captura.
            dev.format().ok()?;
            let caps = dev.query_caps().ok()?;
            Some(CameraInfo {
                name: node.name().unwrap_or_else(|| caps.card.clone()),
                id: CameraId { path },
                driver: caps.driver,
                card: caps.card,
                bus: caps.bus,
            })
        })
        .collect();
    cameras.sort_by(|a, b| a.id.path.cmp(&b.id.path));
    cameras
}

#[async_trait]
impl CameraCatalogPort for V4l2CameraCatalog {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        // Abrir nodos V4L2 bloquea; se hace fuera del runtime.
        let cameras = tokio::task::spawn_blocking(probe_devices)
            .await
            .map_err(|e| DomainError::OperationFailed(format!("camera probe failed: {e}")))?;
        tracing::debug!(count = cameras.len(), "Cámaras detectadas");
        Ok(cameras)
    }
}
