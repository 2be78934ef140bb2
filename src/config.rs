//! Configuración de arranque: flags de línea de comandos con respaldo en
//! variables de entorno `YOLO_STREAM_*`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::domain::{
    camera::{FrameSize, SourceSpec},
    model::{InferenceConfig, ModelId, YoloParams},
    stream::StreamSettings,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "yolo-mjpeg-relay", version, about = "Detección YOLO en vivo servida como MJPEG")]
pub struct Cli {
    #[arg(long, env = "YOLO_STREAM_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "YOLO_STREAM_PORT", default_value_t = 8090)]
    pub port: u16,

    #[arg(long, env = "YOLO_STREAM_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Fuente por defecto: `stub://N`, `/dev/videoN`, un índice o una ruta de vídeo.
    #[arg(long, env = "YOLO_STREAM_SOURCE")]
    pub source: Option<String>,

    /// Modelo ONNX. Sin él se usa el detector sintético.
    #[arg(long, env = "YOLO_STREAM_MODEL")]
    pub model: Option<PathBuf>,

    #[arg(long, env = "YOLO_STREAM_WIDTH", default_value_t = 640)]
    pub width: u32,

    #[arg(long, env = "YOLO_STREAM_HEIGHT", default_value_t = 480)]
    pub height: u32,

    #[arg(long, env = "YOLO_STREAM_FRAME_SKIP", default_value_t = 1)]
    pub frame_skip: u32,

    #[arg(long, env = "YOLO_STREAM_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    #[arg(long, env = "YOLO_STREAM_CONF", default_value_t = 0.25)]
    pub conf: f32,

    #[arg(long, env = "YOLO_STREAM_IOU", default_value_t = 0.45)]
    pub iou: f32,

    #[arg(long, env = "YOLO_STREAM_INPUT_SIZE", default_value_t = 640)]
    pub input_size: u32,

    #[arg(long, env = "YOLO_STREAM_JPEG_QUALITY", default_value_t = 70)]
    pub jpeg_quality: u8,

    #[arg(long, env = "YOLO_STREAM_BUFFER_CAPACITY", default_value_t = 1)]
    pub buffer_capacity: usize,

    #[arg(long, env = "YOLO_STREAM_READ_TIMEOUT_MS", default_value_t = 1000)]
    pub read_timeout_ms: u64,

    #[arg(long, env = "YOLO_STREAM_MAX_TIMEOUTS", default_value_t = 5)]
    pub max_timeouts: u32,

    #[arg(long, env = "YOLO_STREAM_PACING_MS", default_value_t = 10)]
    pub pacing_ms: u64,

    #[arg(long, env = "YOLO_STREAM_MAX_READ_ERRORS", default_value_t = 3)]
    pub max_read_errors: u32,

    /// Arranca la fuente por defecto con la primera conexión a `/video_feed`.
    #[arg(long, env = "YOLO_STREAM_AUTO_START")]
    pub auto_start: bool,
}

impl Cli {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.bind, self.port))
    }

    pub fn stream_settings(&self) -> Result<StreamSettings> {
        if !(1..=2).contains(&self.buffer_capacity) {
            bail!("--buffer-capacity must be 1 or 2, got {}", self.buffer_capacity);
        }
        if self.frame_skip == 0 {
            bail!("--frame-skip must be at least 1");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("--jpeg-quality must be within 1..=100, got {}", self.jpeg_quality);
        }
        if self.top_k == 0 {
            bail!("--top-k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.conf) {
            bail!("--conf must be within [0, 1], got {}", self.conf);
        }
        let frame_size = FrameSize { width: self.width, height: self.height };
        frame_size
            .validate()
            .map_err(|e| anyhow::anyhow!("--width/--height: {e}"))?;
        if self.max_timeouts == 0 {
            bail!("--max-timeouts must be at least 1");
        }

        Ok(StreamSettings {
            frame_size,
            frame_skip: self.frame_skip,
            top_k: self.top_k,
            conf_threshold: self.conf,
            jpeg_quality: self.jpeg_quality,
            buffer_capacity: self.buffer_capacity,
            read_timeout_ms: self.read_timeout_ms,
            max_consecutive_timeouts: self.max_timeouts,
            pacing_ms: self.pacing_ms,
            max_read_errors: self.max_read_errors,
        })
    }

    pub fn default_source(&self) -> Result<Option<SourceSpec>> {
        self.source
            .as_deref()
            .map(|uri| uri.parse::<SourceSpec>().with_context(|| format!("invalid --source {uri}")))
            .transpose()
    }

    /// Configuración del detector ONNX, si se indicó un modelo.
    pub fn inference_config(&self) -> Result<Option<InferenceConfig>> {
        let Some(path) = &self.model else {
            return Ok(None);
        };
        if !(0.0..=1.0).contains(&self.iou) {
            bail!("--iou must be within [0, 1], got {}", self.iou);
        }
        if self.input_size == 0 {
            bail!("--input-size must be positive");
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());
        Ok(Some(InferenceConfig {
            model: ModelId { name, onnx_path: path.to_string_lossy().into_owned() },
            params: YoloParams {
                input_size: self.input_size,
                iou_threshold: self.iou,
                ..YoloParams::default()
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let argv = std::iter::once("yolo-mjpeg-relay").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_produce_valid_settings() {
        let settings = cli(&[]).stream_settings().unwrap();
        assert_eq!(settings.frame_size, FrameSize { width: 640, height: 480 });
        assert_eq!(settings.buffer_capacity, 1);
        assert_eq!(settings.top_k, 5);
        assert_eq!(settings.jpeg_quality, 70);
        assert_eq!(settings.max_consecutive_timeouts, 5);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(cli(&["--buffer-capacity", "3"]).stream_settings().is_err());
        assert!(cli(&["--frame-skip", "0"]).stream_settings().is_err());
        assert!(cli(&["--jpeg-quality", "0"]).stream_settings().is_err());
        assert!(cli(&["--top-k", "0"]).stream_settings().is_err());
        assert!(cli(&["--conf", "1.5"]).stream_settings().is_err());
        assert!(cli(&["--width", "0"]).stream_settings().is_err());
        assert!(cli(&["--width", "5000"]).stream_settings().is_err());
    }

    #[test]
    fn source_uri_is_parsed() {
        let source = cli(&["--source", "stub://4?interval_ms=20"]).default_source().unwrap();
        assert!(matches!(source, Some(SourceSpec::Synthetic { frames: 4, interval_ms: 20, .. })));
        assert_eq!(cli(&[]).default_source().unwrap(), None);
        assert!(cli(&["--source", "stub://x"]).default_source().is_err());
    }

    #[test]
    fn model_flag_builds_inference_config() {
        assert!(cli(&[]).inference_config().unwrap().is_none());
        let config = cli(&["--model", "models/yolo11n.onnx", "--iou", "0.5"])
            .inference_config()
            .unwrap()
            .unwrap();
        assert_eq!(config.model.name, "yolo11n");
        assert_eq!(config.params.iou_threshold, 0.5);
    }

    #[test]
    fn listen_address_combines_bind_and_port() {
        let addr = cli(&["--bind", "127.0.0.1", "--port", "9000"]).listen_addr().unwrap();
        assert_eq!(addr.port(), 9000);
    }
}
