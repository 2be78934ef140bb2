use crate::application::ports::{Detector, DetectorLoader};
use crate::domain::{detection::Detection, errors::DomainResult, frame::Frame};

const LABELS: [&str; 4] = ["persona", "coche", "perro", "bicicleta"];

/// Detector de pruebas: cajas concéntricas centradas con confianza decreciente
/// (0.9, 0.8, ...). No mira los píxeles.
pub struct StubDetector {
    count: usize,
}

impl StubDetector {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl Detector for StubDetector {
    fn infer(&mut self, frame: &Frame, conf_threshold: f32) -> anyhow::Result<Vec<Detection>> {
        let w = frame.width() as f32;
        let h = frame.height() as f32;
        let detections = (0..self.count)
            .map(|i| {
                let shrink = 0.25 + 0.05 * i as f32;
                Detection {
                    x1: w * shrink,
                    y1: h * shrink,
                    x2: w * (1.0 - shrink),
                    y2: h * (1.0 - shrink),
                    score: (0.9 - 0.1 * i as f32).max(0.05),
                    class_id: i % LABELS.len(),
                    label: LABELS[i % LABELS.len()].to_string(),
                }
            })
            .filter(|d| d.score >= conf_threshold)
            .collect();
        Ok(detections)
    }
}

pub struct StubDetectorLoader {
    count: usize,
}

impl StubDetectorLoader {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

impl DetectorLoader for StubDetectorLoader {
    fn load(&self) -> DomainResult<Box<dyn Detector>> {
        Ok(Box::new(StubDetector::new(self.count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn detections_are_ranked_and_thresholded() {
        let frame = Frame::new(1, RgbImage::new(200, 100));
        let mut det = StubDetector::new(4);
        let scores: Vec<f32> = det.infer(&frame, 0.65).unwrap().iter().map(|d| d.score).collect();
        assert_eq!(scores.len(), 3);
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn first_box_is_the_centre_half_of_the_frame() {
        let frame = Frame::new(1, RgbImage::new(200, 100));
        let d = &StubDetector::new(1).infer(&frame, 0.0).unwrap()[0];
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (50.0, 25.0, 150.0, 75.0));
    }
}
