use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use ndarray::{s, Array4, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;

use crate::application::ports::Detector;
use crate::domain::detection::Detection;
use crate::domain::frame::Frame;
use crate::domain::model::YoloParams;

const CLASSES: [&str; 80] = [
    "persona", "bicicleta", "coche", "motocicleta", "avión", "autobús", "tren", "camión", "barco",
    "semáforo", "hidrante", "señal de stop", "parquímetro", "banco", "pájaro", "gato", "perro",
    "caballo", "oveja", "vaca", "elefante", "oso", "cebra", "jirafa", "mochila", "paraguas",
    "bolso", "corbata", "maleta", "frisbee", "esquís", "snowboard", "pelota", "cometa",
    "bate de béisbol", "guante de béisbol", "monopatín", "tabla de surf", "raqueta de tenis",
    "botella", "copa de vino", "taza", "tenedor", "cuchillo", "cuchara", "tazón", "plátano",
    "manzana", "sándwich", "naranja", "brócoli", "zanahoria", "perrito caliente", "pizza",
    "donut", "pastel", "silla", "sofá", "planta", "cama", "mesa", "inodoro", "televisor",
    "portátil", "ratón", "mando", "teclado", "móvil", "microondas", "horno", "tostadora",
    "fregadero", "nevera", "libro", "reloj", "jarrón", "tijeras", "peluche", "secador", "cepillo",
];

pub struct OnnxYoloEngine {
    session: Session,
    params: YoloParams,
}

impl OnnxYoloEngine {
    pub fn load(path: &str, params: YoloParams) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)?;
        let session = builder.commit_from_memory(&model_bytes)?;

        Ok(Self { session, params })
    }

    fn run(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<Detection>> {
        let rgb = &frame.image;
        let imgsz = self.params.input_size as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Nearest);

        let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let input_tensor = Value::from_array((input_shape, input.into_raw_vec_and_offset().0))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view.index_axis(Axis(0), 0);
        if view.ndim() != 2 || view.shape()[0] <= 4 {
            return Err(anyhow!("salida YOLO inesperada: {:?}", dims));
        }

        let num_candidates = view.shape()[1];
        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;

        let mut detections = Vec::new();

        for i in 0..num_candidates {
            let scores = view.slice(s![4.., i]);
            let Some((class_id, &max_score)) = scores
                .indexed_iter()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
            else {
                continue;
            };

            if max_score > conf_threshold {
                let cx = view[[0, i]];
                let cy = view[[1, i]];
                let w = view[[2, i]];
                let h = view[[3, i]];

                detections.push(Detection {
                    x1: (cx - w / 2.0) * sx,
                    y1: (cy - h / 2.0) * sy,
                    x2: (cx + w / 2.0) * sx,
                    y2: (cy + h / 2.0) * sy,
                    score: max_score,
                    class_id,
                    label: CLASSES.get(class_id).unwrap_or(&"objeto").to_string(),
                });
            }
        }

        detections.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));
        let mut kept = non_max_suppression(detections, self.params.iou_threshold);
        kept.truncate(self.params.max_detections);
        Ok(kept)
    }
}

impl Detector for OnnxYoloEngine {
    fn infer(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<Detection>> {
        self.run(frame, conf_threshold)
    }
}

/// NMS por clase. Espera la entrada ordenada por confianza descendente y
/// conserva ese orden.
fn non_max_suppression(sorted: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(sorted.len());
    for det in sorted {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k, &det) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let area = |d: &Detection| (d.x2 - d.x1).max(0.0) * (d.y2 - d.y1).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}
