pub mod ffmpeg;
pub mod http;
pub mod onnx;
pub mod sources;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;
