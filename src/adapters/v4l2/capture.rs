use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use v4l::format::FourCC;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::application::ports::FrameSource;
use crate::domain::{
    camera::{CameraId, CameraMode},
    errors::{DomainError, DomainResult},
    frame::Frame,
};

/// Adaptador para la captura física de frames usando V4L2.
pub struct V4l2Capture {
    path: String,
    stream: Option<Stream<'static>>,
    device: Option<Device>,
    fourcc: FourCC,
    width: u32,
    height: u32,
    next_index: u64,
}

impl V4l2Capture {
    /// Abre el dispositivo de cámara y configura el formato y el flujo de memoria mapeada (MMAP).
    pub fn open(camera: &CameraId, mode: &CameraMode) -> Result<Self> {
        let dev = Device::with_path(&camera.path)?;

        // 1. Configurar Formato
        let mut fmt = dev.format()?;
        let b = mode.format.as_bytes();
        if b.len() != 4 {
            return Err(anyhow!("FourCC debe tener 4 caracteres"));
        }
        fmt.fourcc = v4l::FourCC::new(&[b[0], b[1], b[2], b[3]]);
        fmt.width = mode.size.width;
        fmt.height = mode.size.height;

        // Aplicar formato (el driver puede ajustar los valores a los más cercanos soportados)
        let actual_fmt = dev.set_format(&fmt)?;

        // 2. Configurar FPS (Frame Interval)
        let mut params = dev.params()?;
        params.interval.numerator = 1;
        params.interval.denominator = mode.fps.max(1);
        let _ = dev.set_params(&params);

        // 3. Inicializar Stream (MMAP). El stream comparte el handle del
        // dispositivo, así que ambos se sueltan juntos en `close`.
        let stream = Stream::with_buffers(&dev, v4l::buffer::Type::VideoCapture, 4)?;

        tracing::info!(
            "Cámara abierta: {}x{} [{}] a {} FPS",
            actual_fmt.width, actual_fmt.height, actual_fmt.fourcc, mode.fps
        );

        Ok(Self {
            path: camera.path.clone(),
            stream: Some(stream),
            device: Some(dev),
            fourcc: actual_fmt.fourcc,
            width: actual_fmt.width,
            height: actual_fmt.height,
            next_index: 1,
        })
    }

    /// Captura el siguiente frame y lo devuelve en RGB.
    fn next_rgb(&mut self) -> Result<Option<RgbImage>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let (data, _) = stream.next()?;
        let fcc_str = self.fourcc.str().map_err(|_| anyhow!("FourCC inválido"))?;

        match fcc_str {
            // MJPG es básicamente una secuencia de JPEGs
            "MJPG" => {
                let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
                Ok(Some(img.to_rgb8()))
            }
            "YUYV" => Ok(Some(yuyv_to_rgb(data, self.width, self.height))),
            _ => Err(anyhow!("Formato de cámara {} no soportado por este pipeline", fcc_str)),
        }
    }
}

impl FrameSource for V4l2Capture {
    fn read(&mut self) -> DomainResult<Option<Frame>> {
        let rgb = self
            .next_rgb()
            .map_err(|e| DomainError::SourceUnavailable(format!("{}: {e:#}", self.path)))?;
        Ok(rgb.map(|image| {
            let frame = Frame::new(self.next_index, image);
            self.next_index += 1;
            frame
        }))
    }

    fn close(&mut self) {
        // Primero el stream (STREAMOFF y munmap), después el descriptor.
        self.stream = None;
        if self.device.take().is_some() {
            tracing::info!("Cámara liberada: {}", self.path);
        }
    }
}

/// Convierte un buffer YUYV (YUV 4:2:2) a una RgbImage de forma eficiente.
fn yuyv_to_rgb(yuyv: &[u8], w: u32, h: u32) -> RgbImage {
    let mut out = RgbImage::new(w, h);

    // Cada bloque de 4 bytes en YUYV define 2 píxeles: [Y0, U, Y1, V]
    for (i, chunk) in yuyv.chunks_exact(4).enumerate() {
        let y0 = chunk[0] as f32;
        let u  = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v  = chunk[3] as f32 - 128.0;

        let pixel_idx = i as u32 * 2;
        let x = pixel_idx % w;
        let y = pixel_idx / w;

        if y < h {
            out.put_pixel(x, y, yuv_to_rgb(y0, u, v));
            if x + 1 < w {
                out.put_pixel(x + 1, y, yuv_to_rgb(y1, u, v));
            }
        }
    }
    out
}

// BT.601
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> image::Rgb<u8> {
    image::Rgb([
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ])
}
