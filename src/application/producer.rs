//! Bucle productor: captura, descarte de frames, redimensionado, inferencia,
//! anotación y publicación en el buffer de relevo.
//!
//! Corre en un hilo bloqueante. El dispositivo se libera en todas las salidas
//! (fin de stream, fallo de lectura, parada explícita o pánico) a través de
//! `SourceGuard`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use tracing::{debug, info, warn};

use crate::application::annotate::annotate;
use crate::application::ports::{Detector, FrameSource};
use crate::application::relay::RelayBuffer;
use crate::domain::{
    detection::top_k,
    frame::Frame,
    stream::{summarize_detections, ProducerStats, StreamSettings},
};

/// Motivo por el que terminó el productor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    Cancelled,
    EndOfStream,
    SourceFailed,
}

/// Cierra la fuente exactamente una vez, también si el hilo entra en pánico.
pub struct SourceGuard {
    source: Option<Box<dyn FrameSource>>,
}

impl SourceGuard {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self { source: Some(source) }
    }

    fn source(&mut self) -> Option<&mut Box<dyn FrameSource>> {
        self.source.as_mut()
    }

    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            info!("Pipeline: fuente de frames liberada");
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Aviso síncrono de salida no solicitada, antes de liberar la fuente.
pub type ExitHook = Box<dyn FnOnce(ProducerExit) + Send>;

pub struct Producer {
    source: SourceGuard,
    detector: Box<dyn Detector>,
    relay: Arc<RelayBuffer>,
    settings: StreamSettings,
    cancel: Arc<AtomicBool>,
    stats: Arc<RwLock<ProducerStats>>,
    on_exit: Option<ExitHook>,
}

impl Producer {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        relay: Arc<RelayBuffer>,
        settings: StreamSettings,
        cancel: Arc<AtomicBool>,
        stats: Arc<RwLock<ProducerStats>>,
    ) -> Self {
        Self {
            source: SourceGuard::new(source),
            detector,
            relay,
            settings,
            cancel,
            stats,
            on_exit: None,
        }
    }

    /// Se invoca en fin de stream o fallo de fuente, nunca tras una cancelación.
    pub fn on_exit(mut self, hook: impl FnOnce(ProducerExit) + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }

    pub fn run(mut self) -> ProducerExit {
        let exit = self.capture_loop();
        if exit != ProducerExit::Cancelled {
            if let Some(hook) = self.on_exit.take() {
                hook(exit);
            }
        }
        self.source.release();
        info!(?exit, "Pipeline: productor detenido");
        exit
    }

    fn capture_loop(&mut self) -> ProducerExit {
        let skip = u64::from(self.settings.frame_skip.max(1));
        let mut captured: u64 = 0;
        let mut read_errors: u32 = 0;
        let mut last_t = Instant::now();
        let mut fps_est: f32 = 0.0;

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return ProducerExit::Cancelled;
            }

            let Some(source) = self.source.source() else {
                return ProducerExit::SourceFailed;
            };

            let frame = match source.read() {
                Ok(Some(frame)) => {
                    read_errors = 0;
                    frame
                }
                Ok(None) => {
                    info!(captured, "Pipeline: fin del stream de la fuente");
                    return ProducerExit::EndOfStream;
                }
                Err(e) => {
                    read_errors += 1;
                    warn!(attempt = read_errors, "Error capturando frame: {}", e);
                    if read_errors > self.settings.max_read_errors {
                        return ProducerExit::SourceFailed;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };

            captured += 1;
            self.update_stats(|s| s.frames_captured += 1);
            if captured % skip != 0 {
                continue;
            }

            let index = frame.index;
            match self.process_frame(frame) {
                Ok(frame) => {
                    self.relay.put(frame);

                    let dt = last_t.elapsed().as_secs_f32().max(0.001);
                    last_t = Instant::now();
                    fps_est = 0.9 * fps_est + 0.1 * (1.0 / dt);
                    self.update_stats(|s| {
                        s.frames_forwarded += 1;
                        s.fps_est = fps_est;
                    });
                    if captured % 30 == 0 {
                        debug!(frame = index, fps = fps_est, "Pipeline heartbeat");
                    }
                }
                Err(e) => {
                    // Un frame defectuoso no detiene el pipeline.
                    warn!(frame = index, "Frame descartado: {:#}", e);
                    self.update_stats(|s| s.frames_dropped += 1);
                }
            }

            let pacing = self.settings.pacing();
            if !pacing.is_zero() {
                std::thread::sleep(pacing);
            }
        }
    }

    fn process_frame(&mut self, mut frame: Frame) -> anyhow::Result<Frame> {
        let target = self.settings.frame_size;
        if frame.width() != target.width || frame.height() != target.height {
            frame.image = imageops::resize(&frame.image, target.width, target.height, FilterType::Triangle);
        }

        let t_infer_start = Instant::now();
        let detections = self.detector.infer(&frame, self.settings.conf_threshold)?;
        let infer_ms = t_infer_start.elapsed().as_secs_f32() * 1000.0;

        let kept = top_k(detections, self.settings.top_k);
        if !kept.is_empty() {
            debug!(frame = frame.index, "Detecciones: {}", summarize_detections(&kept));
        }
        annotate(&mut frame.image, &kept);
        self.update_stats(|s| s.infer_ms = infer_ms);
        Ok(frame)
    }

    fn update_stats(&self, f: impl FnOnce(&mut ProducerStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{camera::FrameSize, detection::Detection, errors::DomainError};
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct ScriptedSource {
        reads: VecDeque<Result<Option<Frame>, DomainError>>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn frames(count: u64, closes: Arc<AtomicUsize>) -> Self {
            let reads = (1..=count)
                .map(|i| Ok(Some(Frame::new(i, RgbImage::new(8, 8)))))
                .chain(std::iter::once(Ok(None)))
                .collect();
            Self { reads, closes }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> crate::domain::errors::DomainResult<Option<Frame>> {
            self.reads.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default, Clone)]
    struct RecordingDetector {
        seen: Arc<Mutex<Vec<u64>>>,
        fail_on: Option<u64>,
    }

    impl Detector for RecordingDetector {
        fn infer(&mut self, frame: &Frame, _conf: f32) -> anyhow::Result<Vec<Detection>> {
            self.seen.lock().unwrap().push(frame.index);
            if self.fail_on == Some(frame.index) {
                anyhow::bail!("tensor corrupto");
            }
            Ok(vec![Detection {
                x1: 1.0,
                y1: 1.0,
                x2: 6.0,
                y2: 6.0,
                score: 0.9,
                class_id: 0,
                label: "persona".into(),
            }])
        }
    }

    fn settings(frame_skip: u32) -> StreamSettings {
        StreamSettings {
            frame_size: FrameSize { width: 8, height: 8 },
            frame_skip,
            pacing_ms: 0,
            buffer_capacity: 2,
            ..StreamSettings::default()
        }
    }

    fn run(source: ScriptedSource, detector: RecordingDetector, settings: StreamSettings) -> (ProducerExit, Arc<RelayBuffer>) {
        let relay = Arc::new(RelayBuffer::new(settings.buffer_capacity).unwrap());
        let producer = Producer::new(
            Box::new(source),
            Box::new(detector),
            relay.clone(),
            settings,
            Arc::new(AtomicBool::new(false)),
            Arc::new(RwLock::new(ProducerStats::default())),
        );
        (producer.run(), relay)
    }

    #[test]
    fn frame_skip_forwards_every_nth_frame() {
        for skip in 1..=4u32 {
            let closes = Arc::new(AtomicUsize::new(0));
            let detector = RecordingDetector::default();
            let (exit, _) = run(ScriptedSource::frames(10, closes.clone()), detector.clone(), settings(skip));

            let expected: Vec<u64> = (1..=10).filter(|i| i % u64::from(skip) == 0).collect();
            assert_eq!(*detector.seen.lock().unwrap(), expected, "skip={skip}");
            assert_eq!(exit, ProducerExit::EndOfStream);
            assert_eq!(closes.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn failing_frame_is_dropped_and_loop_continues() {
        let closes = Arc::new(AtomicUsize::new(0));
        let detector = RecordingDetector { fail_on: Some(2), ..Default::default() };
        let (exit, relay) = run(ScriptedSource::frames(3, closes), detector.clone(), settings(1));

        assert_eq!(exit, ProducerExit::EndOfStream);
        assert_eq!(*detector.seen.lock().unwrap(), vec![1, 2, 3]);
        let relayed: Vec<u64> = relay.pending().iter().map(|f| f.frame.index).collect();
        assert_eq!(relayed, vec![1, 3]);
    }

    #[test]
    fn repeated_read_errors_terminate_the_source() {
        let closes = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            reads: (0..10)
                .map(|_| Err(DomainError::SourceUnavailable("cable suelto".into())))
                .collect(),
            closes: closes.clone(),
        };
        let (exit, _) = run(source, RecordingDetector::default(), StreamSettings { max_read_errors: 2, ..settings(1) });
        assert_eq!(exit, ProducerExit::SourceFailed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn frames_are_resized_and_annotated_before_relay() {
        let closes = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            reads: VecDeque::from(vec![Ok(Some(Frame::new(1, RgbImage::new(32, 16)))), Ok(None)]),
            closes,
        };
        let (_, relay) = run(source, RecordingDetector::default(), settings(1));
        let relayed = relay.pending();
        let frame = &relayed[0].frame;
        assert_eq!((frame.width(), frame.height()), (8, 8));
        assert_eq!(*frame.image.get_pixel(3, 1), crate::application::annotate::class_color(0));
    }

    #[test]
    fn cancelled_producer_still_releases_the_source() {
        let closes = Arc::new(AtomicUsize::new(0));
        let relay = Arc::new(RelayBuffer::new(1).unwrap());
        let producer = Producer::new(
            Box::new(ScriptedSource::frames(100, closes.clone())),
            Box::new(RecordingDetector::default()),
            relay,
            settings(1),
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(ProducerStats::default())),
        );
        assert_eq!(producer.run(), ProducerExit::Cancelled);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exit_hook_runs_before_the_source_is_released() {
        let closes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let (hook_closes, hook_seen) = (closes.clone(), seen.clone());
        let producer = Producer::new(
            Box::new(ScriptedSource::frames(2, closes.clone())),
            Box::new(RecordingDetector::default()),
            Arc::new(RelayBuffer::new(1).unwrap()),
            settings(1),
            Arc::new(AtomicBool::new(false)),
            Arc::new(RwLock::new(ProducerStats::default())),
        )
        .on_exit(move |exit| {
            *hook_seen.lock().unwrap() = Some((exit, hook_closes.load(Ordering::SeqCst)));
        });

        assert_eq!(producer.run(), ProducerExit::EndOfStream);
        assert_eq!(*seen.lock().unwrap(), Some((ProducerExit::EndOfStream, 0)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exit_hook_is_skipped_on_cancellation() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let producer = Producer::new(
            Box::new(ScriptedSource::frames(5, Arc::new(AtomicUsize::new(0)))),
            Box::new(RecordingDetector::default()),
            Arc::new(RelayBuffer::new(1).unwrap()),
            settings(1),
            Arc::new(AtomicBool::new(true)),
            Arc::new(RwLock::new(ProducerStats::default())),
        )
        .on_exit(move |_| flag.store(true, Ordering::SeqCst));

        assert_eq!(producer.run(), ProducerExit::Cancelled);
        assert!(!called.load(Ordering::SeqCst));
    }
}
