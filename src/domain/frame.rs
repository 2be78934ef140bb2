use image::RgbImage;

/// Imagen RGB decodificada de una cámara o vídeo.
///
/// `index` es la posición de captura dentro de la sesión (empieza en 1); el
/// resto de etapas no le dan identidad, los frames son intercambiables.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
