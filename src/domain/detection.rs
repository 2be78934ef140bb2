use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
    pub label: String,
}

/// Ordena por confianza descendente y conserva solo las `k` primeras.
/// El coste de anotación queda acotado aunque el modelo reporte cientos de cajas.
pub fn top_k(mut detections: Vec<Detection>, k: usize) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    detections.truncate(k);
    detections
}
