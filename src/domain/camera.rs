// src/domain/camera.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraId { pub path: String }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: CameraId,
    pub name: String,
    pub card: String,
    pub driver: String,
    pub bus: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Lado máximo aceptado para fuentes y resolución objetivo.
    pub const MAX_DIMENSION: u32 = 4096;

    /// Rechaza dimensiones nulas o por encima de `MAX_DIMENSION`.
    pub fn validate(&self) -> DomainResult<()> {
        let max = Self::MAX_DIMENSION;
        if self.width == 0 || self.height == 0 || self.width > max || self.height > max {
            return Err(DomainError::InvalidInput(format!(
                "frame size {}x{} outside 1..={max}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraMode {
    pub format: String,
    pub size: FrameSize,
    pub fps: u32,
}

impl CameraMode {
    pub const MAX_FPS: u32 = 240;

    pub fn validate(&self) -> DomainResult<()> {
        self.size.validate()?;
        if self.fps == 0 || self.fps > Self::MAX_FPS {
            return Err(DomainError::InvalidInput(format!(
                "camera fps {} outside 1..={}",
                self.fps,
                Self::MAX_FPS
            )));
        }
        Ok(())
    }
}

impl Default for CameraMode {
    fn default() -> Self {
        Self {
            format: "MJPG".into(),
            size: FrameSize { width: 640, height: 480 },
            fps: 30,
        }
    }
}

/// Origen de frames de una sesión de streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Camera {
        path: String,
        #[serde(default)]
        mode: CameraMode,
    },
    Video {
        path: String,
    },
    Synthetic {
        frames: u32,
        #[serde(default = "default_synthetic_size")]
        size: FrameSize,
        #[serde(default)]
        interval_ms: u64,
    },
}

fn default_synthetic_size() -> FrameSize {
    FrameSize { width: 320, height: 240 }
}

impl SourceSpec {
    /// Ruta del recurso físico, si la hay (cámara o fichero).
    pub fn resource(&self) -> Option<&str> {
        match self {
            SourceSpec::Camera { path, .. } | SourceSpec::Video { path } => Some(path),
            SourceSpec::Synthetic { .. } => None,
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Camera { path, mode } => write!(
                f,
                "camera {} [{} {}x{}@{}]",
                path, mode.format, mode.size.width, mode.size.height, mode.fps
            ),
            SourceSpec::Video { path } => write!(f, "video {}", path),
            SourceSpec::Synthetic { frames, interval_ms, .. } => {
                write!(f, "stub://{}?interval_ms={}", frames, interval_ms)
            }
        }
    }
}

/// `stub://N[?interval_ms=M]`, `/dev/videoN` o un índice numérico (cámara),
/// cualquier otra cosa se trata como ruta de vídeo.
impl FromStr for SourceSpec {
    type Err = DomainError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(DomainError::InvalidInput("source uri empty".into()));
        }

        if let Some(rest) = uri.strip_prefix("stub://") {
            let mut parts = rest.splitn(2, '?');
            let frames = parts
                .next()
                .unwrap_or_default()
                .parse::<u32>()
                .map_err(|_| DomainError::InvalidInput(format!("invalid frame count in {uri}")))?;
            let mut interval_ms = 0;
            if let Some(query) = parts.next() {
                for pair in query.split('&') {
                    let mut kv = pair.splitn(2, '=');
                    if let (Some("interval_ms"), Some(value)) = (kv.next(), kv.next()) {
                        interval_ms = value.parse().map_err(|_| {
                            DomainError::InvalidInput(format!("invalid interval_ms in {uri}"))
                        })?;
                    }
                }
            }
            return Ok(SourceSpec::Synthetic {
                frames,
                size: default_synthetic_size(),
                interval_ms,
            });
        }

        if let Ok(index) = uri.parse::<u32>() {
            return Ok(SourceSpec::Camera {
                path: format!("/dev/video{}", index),
                mode: CameraMode::default(),
            });
        }

        if uri.starts_with("/dev/video") {
            return Ok(SourceSpec::Camera {
                path: uri.to_string(),
                mode: CameraMode::default(),
            });
        }

        Ok(SourceSpec::Video { path: uri.to_string() })
    }
}
