use std::sync::Arc;
use crate::application::services::{CameraService, PipelineService};

/// Estado compartido para los manejadores HTTP de Axum.
#[derive(Clone)]
pub struct HttpState {
    /// Servicio para listar las cámaras disponibles.
    pub camera: Arc<CameraService>,
    /// Controlador del ciclo de vida del pipeline y dueño del buffer de relevo.
    pub pipeline: Arc<PipelineService>,
}
