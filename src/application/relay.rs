//! Buffer de relevo acotado entre el productor (captura + inferencia) y los
//! consumidores HTTP.
//!
//! Guarda como mucho `capacity` frames (1 o 2). Al insertar con el buffer
//! lleno se descarta siempre el más antiguo, nunca se acumula cola. Los
//! consumidores leen sin extraer: cada uno lleva su propio cursor de secuencia
//! y todos observan el mismo buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::frame::Frame;

#[derive(Debug, Clone)]
pub struct RelayFrame {
    pub seq: u64,
    pub frame: Arc<Frame>,
}

#[derive(Debug, Clone)]
pub enum RelayRead {
    Frame(RelayFrame),
    Timeout,
    /// El productor terminó y no quedan frames nuevos para este lector.
    Closed,
}

#[derive(Default)]
struct Slots {
    frames: VecDeque<RelayFrame>,
    next_seq: u64,
    closed: bool,
}

pub struct RelayBuffer {
    capacity: usize,
    slots: Mutex<Slots>,
    notify: Notify,
}

impl RelayBuffer {
    pub fn new(capacity: usize) -> DomainResult<Self> {
        if !(1..=2).contains(&capacity) {
            return Err(DomainError::InvalidInput(format!(
                "relay capacity must be 1 or 2, got {capacity}"
            )));
        }
        Ok(Self {
            capacity,
            slots: Mutex::new(Slots {
                frames: VecDeque::with_capacity(capacity),
                next_seq: 1,
                closed: false,
            }),
            notify: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // Ninguna sección crítica puede dejar el estado a medias.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserta sin bloquear, desalojando el frame más antiguo si está lleno.
    /// Devuelve `None` si el buffer está cerrado y el frame se descarta.
    pub fn put(&self, frame: Frame) -> Option<u64> {
        let seq = {
            let mut slots = self.slots();
            if slots.closed {
                return None;
            }
            if slots.frames.len() == self.capacity {
                slots.frames.pop_front();
            }
            let seq = slots.next_seq;
            slots.next_seq += 1;
            slots.frames.push_back(RelayFrame { seq, frame: Arc::new(frame) });
            seq
        };
        self.notify.notify_waiters();
        Some(seq)
    }

    /// Espera hasta `timeout` el frame más reciente disponible.
    pub async fn get(&self, timeout: Duration) -> RelayRead {
        self.get_after(0, timeout).await
    }

    /// Como `get`, pero solo acepta frames con secuencia mayor que `after`.
    pub async fn get_after(&self, after: u64, timeout: Duration) -> RelayRead {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Registrarse antes de mirar el estado para no perder un `put`.
            notified.as_mut().enable();

            if let Some(read) = self.poll_newest(after) {
                return read;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return RelayRead::Timeout;
            }
        }
    }

    fn poll_newest(&self, after: u64) -> Option<RelayRead> {
        let slots = self.slots();
        match slots.frames.back() {
            Some(newest) if newest.seq > after => Some(RelayRead::Frame(newest.clone())),
            _ if slots.closed => Some(RelayRead::Closed),
            _ => None,
        }
    }

    /// Frames retenidos, del más antiguo al más reciente.
    pub fn pending(&self) -> Vec<RelayFrame> {
        self.slots().frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.slots().closed
    }

    /// Marca el fin del productor; los lectores vacían lo pendiente y reciben `Closed`.
    pub fn close(&self) {
        self.slots().closed = true;
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.slots().frames.clear();
    }

    /// Vacía y reabre el buffer para una nueva sesión. Las secuencias siguen
    /// creciendo para que los cursores antiguos no confundan frames.
    pub fn reopen(&self) {
        let mut slots = self.slots();
        slots.frames.clear();
        slots.closed = false;
    }
}

/// Origen de frames para un emisor MJPEG.
#[async_trait]
pub trait FrameFeed: Send {
    async fn next_frame(&mut self, timeout: Duration) -> RelayRead;
}

/// Cursor de un consumidor sobre el buffer compartido: nunca repite un frame.
pub struct RelayCursor {
    relay: Arc<RelayBuffer>,
    last_seq: u64,
}

impl RelayCursor {
    pub fn new(relay: Arc<RelayBuffer>) -> Self {
        Self { relay, last_seq: 0 }
    }
}

#[async_trait]
impl FrameFeed for RelayCursor {
    async fn next_frame(&mut self, timeout: Duration) -> RelayRead {
        let read = self.relay.get_after(self.last_seq, timeout).await;
        if let RelayRead::Frame(ref frame) = read {
            self.last_seq = frame.seq;
        }
        read
    }
}
