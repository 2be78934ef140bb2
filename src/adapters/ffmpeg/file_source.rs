//! Fuente de vídeo local decodificada por un proceso `ffmpeg`.
//!
//! ffmpeg escala a la resolución objetivo y escribe `rgb24` crudo por stdout,
//! así que cada frame ocupa exactamente `ancho * alto * 3` bytes.

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tracing::{info, warn};

use crate::application::ports::FrameSource;
use crate::domain::{
    camera::FrameSize,
    errors::{DomainError, DomainResult},
    frame::Frame,
};

pub struct FfmpegFileSource {
    path: String,
    size: FrameSize,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    buffer: Vec<u8>,
    next_index: u64,
}

impl FfmpegFileSource {
    pub fn open(path: &str, size: FrameSize) -> DomainResult<Self> {
        if !Path::new(path).is_file() {
            return Err(DomainError::NotFound(format!("video file not found: {path}")));
        }
        let (child, stdout) = spawn_decoder(path, size)
            .map_err(|e| DomainError::SourceUnavailable(format!("{e:#}")))?;

        info!("Vídeo abierto: {} -> {}x{}", path, size.width, size.height);
        Ok(Self {
            path: path.to_string(),
            size,
            child: Some(child),
            stdout: Some(stdout),
            buffer: vec![0u8; (size.width as usize) * (size.height as usize) * 3],
            next_index: 1,
        })
    }
}

fn spawn_decoder(path: &str, size: FrameSize) -> Result<(Child, ChildStdout)> {
    let scale_arg = format!("scale={}:{}", size.width, size.height);
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(path)
        .arg("-an")
        .arg("-vf")
        .arg(&scale_arg)
        .arg("-pix_fmt")
        .arg("rgb24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().context("failed to spawn ffmpeg")?;
    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("failed to capture ffmpeg stdout"));
        }
    };
    Ok((child, stdout))
}

impl FrameSource for FfmpegFileSource {
    fn read(&mut self) -> DomainResult<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        match stdout.read_exact(&mut self.buffer) {
            Ok(()) => {
                let image = RgbImage::from_raw(self.size.width, self.size.height, self.buffer.clone())
                    .ok_or_else(|| DomainError::OperationFailed("frame buffer size mismatch".into()))?;
                let frame = Frame::new(self.next_index, image);
                self.next_index += 1;
                Ok(Some(frame))
            }
            // Fin de fichero (o frame final truncado).
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(DomainError::SourceUnavailable(format!("{}: {e}", self.path))),
        }
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                // Ya había terminado solo al agotar el fichero.
                if e.kind() != ErrorKind::InvalidInput {
                    warn!("No se pudo detener ffmpeg: {}", e);
                }
            }
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegFileSource {
    fn drop(&mut self) {
        self.close();
    }
}
