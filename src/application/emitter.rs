//! Codificación JPEG y emisión multipart (`multipart/x-mixed-replace`).
//!
//! Cada conexión HTTP obtiene su propio stream perezoso de chunks. El stream
//! termina cuando el productor cierra el buffer, cuando se encadenan
//! demasiados timeouts de lectura o cuando el cliente se desconecta (axum
//! suelta el body y con él el stream).

use std::convert::Infallible;
use std::time::Duration;

use anyhow::Context;
use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, info, warn};

use crate::application::relay::{FrameFeed, RelayRead};
use crate::domain::frame::Frame;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Debug, Clone, Copy)]
pub struct EmitterSettings {
    pub jpeg_quality: u8,
    pub read_timeout: Duration,
    pub max_consecutive_timeouts: u32,
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&frame.image)
        .with_context(|| format!("JPEG encode failed for frame {}", frame.index))?;
    Ok(jpeg)
}

/// Envuelve un JPEG con el delimitador y las cabeceras de su parte.
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut payload = Vec::with_capacity(header.len() + jpeg.len() + 2);
    payload.extend_from_slice(header.as_bytes());
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Stream de chunks para una conexión.
pub fn mjpeg_stream<F>(mut feed: F, settings: EmitterSettings) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    F: FrameFeed + 'static,
{
    stream! {
        let mut timeouts: u32 = 0;
        let mut emitted: u64 = 0;
        info!("MJPEG: sesión abierta");

        loop {
            match feed.next_frame(settings.read_timeout).await {
                RelayRead::Frame(relayed) => {
                    timeouts = 0;
                    let quality = settings.jpeg_quality;
                    let frame = relayed.frame;
                    let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await;
                    match encoded {
                        Ok(Ok(jpeg)) => {
                            emitted += 1;
                            yield Ok::<Bytes, Infallible>(multipart_chunk(&jpeg));
                        }
                        Ok(Err(e)) => warn!(seq = relayed.seq, "Frame no codificado: {:#}", e),
                        Err(e) => warn!(seq = relayed.seq, "Tarea de codificación abortada: {}", e),
                    }
                }
                RelayRead::Timeout => {
                    timeouts += 1;
                    debug!(timeouts, "MJPEG: timeout esperando frame");
                    if timeouts >= settings.max_consecutive_timeouts {
                        info!(emitted, timeouts, "MJPEG: sesión cerrada por timeouts consecutivos");
                        break;
                    }
                }
                RelayRead::Closed => {
                    info!(emitted, "MJPEG: sesión cerrada, el productor terminó");
                    break;
                }
            }
        }
    }
}
