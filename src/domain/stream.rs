use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::camera::{FrameSize, SourceSpec};
use super::detection::Detection;

/// Parámetros de una sesión de streaming (captura, inferencia y emisión).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Resolución objetivo; todo frame se redimensiona a ella antes de inferir.
    pub frame_size: FrameSize,
    /// Solo se procesa uno de cada `frame_skip` frames capturados.
    pub frame_skip: u32,
    pub top_k: usize,
    pub conf_threshold: f32,
    pub jpeg_quality: u8,
    /// 1 = solo el último frame, 2 = suavizado mínimo.
    pub buffer_capacity: usize,
    pub read_timeout_ms: u64,
    pub max_consecutive_timeouts: u32,
    pub pacing_ms: u64,
    pub max_read_errors: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            frame_size: FrameSize { width: 640, height: 480 },
            frame_skip: 1,
            top_k: 5,
            conf_threshold: 0.25,
            jpeg_quality: 70,
            buffer_capacity: 1,
            read_timeout_ms: 1000,
            max_consecutive_timeouts: 5,
            pacing_ms: 10,
            max_read_errors: 3,
        }
    }
}

impl StreamSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerStats {
    pub frames_captured: u64,
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub infer_ms: f32,
    pub fps_est: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub state: LifecycleState,
    pub source: Option<SourceSpec>,
    pub buffered: usize,
    pub stats: ProducerStats,
}

pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = HashMap::new();
    for det in detections {
        *counts.entry(&det.label).or_insert(0) += 1;
    }
    counts.iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}
