use async_trait::async_trait;
use crate::domain::{
    camera::{CameraInfo, SourceSpec},
    detection::Detection,
    errors::DomainResult,
    frame::Frame,
};

#[async_trait]
pub trait CameraCatalogPort: Send + Sync {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>>;
}

/// Fuente de frames abierta (cámara, vídeo decodificado o sintética).
///
/// `read` devuelve `Ok(None)` al llegar al final del stream. `close` libera el
/// dispositivo y debe ser idempotente.
pub trait FrameSource: Send {
    fn read(&mut self) -> DomainResult<Option<Frame>>;
    fn close(&mut self);
}

/// Abre fuentes a partir de su especificación.
pub trait SourceOpener: Send + Sync {
    fn open(&self, spec: &SourceSpec) -> DomainResult<Box<dyn FrameSource>>;
}

/// Colaborador de detección externo. Devuelve las detecciones por encima del
/// umbral, ordenadas por confianza descendente.
pub trait Detector: Send {
    fn infer(&mut self, frame: &Frame, conf_threshold: f32) -> anyhow::Result<Vec<Detection>>;
}

/// Carga un detector nuevo para cada arranque del pipeline.
pub trait DetectorLoader: Send + Sync {
    fn load(&self) -> DomainResult<Box<dyn Detector>>;
}
