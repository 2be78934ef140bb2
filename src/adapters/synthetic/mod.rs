//! Fuente y detector sintéticos: demos sin cámara ni modelo, y dobles de prueba.

mod detector;
mod source;

pub use detector::{StubDetector, StubDetectorLoader};
pub use source::SyntheticSource;
