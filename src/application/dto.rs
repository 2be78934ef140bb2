use serde::{Deserialize, Serialize};

use crate::domain::{
    camera::{CameraInfo, SourceSpec},
    stream::StreamSettings,
};

/// Cuerpo de `POST /start_stream`. Sin fuente se usa la configurada por defecto.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartStreamRequest {
    #[serde(default)]
    pub source: Option<SourceSpec>,
    /// Alternativa compacta a `source`: `stub://3`, `/dev/video0`, `clip.mp4`.
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamerasResponse {
    pub cameras: Vec<CameraInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub settings: StreamSettings,
    pub default_source: Option<SourceSpec>,
}
