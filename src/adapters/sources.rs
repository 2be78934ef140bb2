use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::ffmpeg::file_source::FfmpegFileSource;
use crate::adapters::synthetic::SyntheticSource;
use crate::application::ports::{CameraCatalogPort, FrameSource, SourceOpener};
use crate::domain::{
    camera::{CameraInfo, FrameSize, SourceSpec},
    errors::{DomainError, DomainResult},
};

/// Abre cámaras V4L2, vídeos (vía ffmpeg) y fuentes sintéticas.
pub struct DefaultSourceOpener {
    target: FrameSize,
}

impl DefaultSourceOpener {
    /// `target` es la resolución a la que ffmpeg escala los vídeos.
    pub fn new(target: FrameSize) -> Self {
        Self { target }
    }
}

impl SourceOpener for DefaultSourceOpener {
    fn open(&self, spec: &SourceSpec) -> DomainResult<Box<dyn FrameSource>> {
        match spec {
            SourceSpec::Synthetic { frames, size, interval_ms } => {
                size.validate()?;
                Ok(Box::new(SyntheticSource::new(*frames, *size, *interval_ms)))
            }
            SourceSpec::Video { path } => {
                self.target.validate()?;
                Ok(Box::new(FfmpegFileSource::open(path, self.target)?))
            }
            SourceSpec::Camera { path, mode } => {
                mode.validate()?;
                open_camera(path, mode)
            }
        }
    }
}

#[cfg(feature = "v4l2")]
fn open_camera(path: &str, mode: &crate::domain::camera::CameraMode) -> DomainResult<Box<dyn FrameSource>> {
    use crate::adapters::v4l2::capture::V4l2Capture;
    use crate::domain::camera::CameraId;

    let capture = V4l2Capture::open(&CameraId { path: path.to_string() }, mode)
        .map_err(|e| DomainError::SourceUnavailable(format!("Error abriendo cámara {path}: {e:#}")))?;
    Ok(Box::new(capture))
}

#[cfg(not(feature = "v4l2"))]
fn open_camera(path: &str, _mode: &crate::domain::camera::CameraMode) -> DomainResult<Box<dyn FrameSource>> {
    Err(DomainError::SourceUnavailable(format!(
        "cannot open {path}: built without the `v4l2` feature"
    )))
}

/// Catálogo vacío para builds sin soporte V4L2.
pub struct NoCameraCatalog;

#[async_trait]
impl CameraCatalogPort for NoCameraCatalog {
    async fn list_cameras(&self) -> DomainResult<Vec<CameraInfo>> {
        Ok(Vec::new())
    }
}

pub fn camera_catalog() -> Arc<dyn CameraCatalogPort> {
    #[cfg(feature = "v4l2")]
    {
        Arc::new(crate::adapters::v4l2::camera_repo::V4l2CameraCatalog::new())
    }
    #[cfg(not(feature = "v4l2"))]
    {
        Arc::new(NoCameraCatalog)
    }
}
