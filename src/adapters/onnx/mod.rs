pub mod model_catalog;
#[cfg(feature = "onnx")]
pub mod yolo_engine;
