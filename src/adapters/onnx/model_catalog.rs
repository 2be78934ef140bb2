use std::path::Path;

use crate::application::ports::{Detector, DetectorLoader};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::{InferenceConfig, ModelId};

/// Valida el fichero del modelo antes de arrancar el hardware.
pub fn validate_model(model: &ModelId) -> DomainResult<()> {
    if model.onnx_path.trim().is_empty() {
        return Err(DomainError::InvalidInput("onnx_path empty".into()));
    }
    if !Path::new(&model.onnx_path).exists() {
        return Err(DomainError::NotFound(format!("model file not found: {}", model.onnx_path)));
    }
    Ok(())
}

/// Carga el motor YOLO (ONNX) en cada arranque del pipeline.
pub struct OnnxDetectorLoader {
    config: InferenceConfig,
}

impl OnnxDetectorLoader {
    pub fn new(config: InferenceConfig) -> DomainResult<Self> {
        validate_model(&config.model)?;
        Ok(Self { config })
    }
}

impl DetectorLoader for OnnxDetectorLoader {
    #[cfg(feature = "onnx")]
    fn load(&self) -> DomainResult<Box<dyn Detector>> {
        validate_model(&self.config.model)?;
        let engine = super::yolo_engine::OnnxYoloEngine::load(&self.config.model.onnx_path, self.config.params.clone())
            .map_err(|e| DomainError::OperationFailed(format!("Error cargando modelo YOLO: {e:#}")))?;
        tracing::info!("Modelo cargado: {} ({})", self.config.model.name, self.config.model.onnx_path);
        Ok(Box::new(engine))
    }

    #[cfg(not(feature = "onnx"))]
    fn load(&self) -> DomainResult<Box<dyn Detector>> {
        Err(DomainError::OperationFailed(format!(
            "cannot load {}: built without the `onnx` feature",
            self.config.model.onnx_path
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::YoloParams;

    fn model(path: &str) -> ModelId {
        ModelId { name: "yolo".into(), onnx_path: path.into() }
    }

    #[test]
    fn empty_path_is_invalid() {
        assert!(matches!(validate_model(&model("  ")), Err(DomainError::InvalidInput(_))));
    }

    #[test]
    fn missing_file_is_not_found() {
        let config = InferenceConfig { model: model("models/nope.onnx"), params: YoloParams::default() };
        assert!(matches!(OnnxDetectorLoader::new(config), Err(DomainError::NotFound(_))));
    }
}
