//! Frame-synchronous VAD pipeline.
//!
//! ## Stages (per ingested chunk)
//!
//! ```text
//! chunk ─► FrameBuffer::push ─► for each complete frame:
//!             1. FrameClassifier::classify  → Decision
//!             2. StateSmoother::update      → SmoothedState
//!             3. broadcast state change / activity events (lossy)
//!             4. publish PublishedSnapshot  (pointer swap, latest wins)
//! ```
//!
//! `VadPipeline` is owned by the producer (capture) thread and mutated only
//! there. Consumers hold a [`SnapshotReader`] and never touch the pipeline.
//!
//! [`run`] is the capture loop that drives a pipeline from a `CaptureSource`
//! until the stop flag clears, the source ends, or an error occurs.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::snapshot::{summarize_waveform, PublishedSnapshot, SnapshotReader, SnapshotSlot};
use crate::{
    audio::{capture::CaptureSource, i16_slice_to_f32},
    buffering::frame::{Frame, FrameBuffer},
    config::VadConfig,
    error::{Result, VadError},
    ipc::events::{SpeechStateEvent, VadActivityEvent},
    vad::{build_classifier, FrameClassifier, SmoothedState, StateSmoother},
};

/// Broadcast capacity for state and activity events.
const EVENT_CAPACITY: usize = 256;

/// Log an activity summary every this many frames (≈3 s at 30 ms).
const LEVEL_LOG_INTERVAL: u64 = 100;

pub struct PipelineDiagnostics {
    pub chunks_in: AtomicUsize,
    pub samples_in: AtomicUsize,
    pub frames_classified: AtomicUsize,
    pub speech_frames: AtomicUsize,
    pub transitions: AtomicUsize,
    pub classifier_errors: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            chunks_in: AtomicUsize::new(0),
            samples_in: AtomicUsize::new(0),
            frames_classified: AtomicUsize::new(0),
            speech_frames: AtomicUsize::new(0),
            transitions: AtomicUsize::new(0),
            classifier_errors: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_in.store(0, Ordering::Relaxed);
        self.samples_in.store(0, Ordering::Relaxed);
        self.frames_classified.store(0, Ordering::Relaxed);
        self.speech_frames.store(0, Ordering::Relaxed);
        self.transitions.store(0, Ordering::Relaxed);
        self.classifier_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_classified: self.frames_classified.load(Ordering::Relaxed),
            speech_frames: self.speech_frames.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            classifier_errors: self.classifier_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub samples_in: usize,
    pub frames_classified: usize,
    pub speech_frames: usize,
    pub transitions: usize,
    pub classifier_errors: usize,
}

/// Everything downstream of the frame buffer.
struct FrameStage {
    classifier: Box<dyn FrameClassifier>,
    smoother: StateSmoother,
    slot: Arc<SnapshotSlot>,
    diagnostics: Arc<PipelineDiagnostics>,
    state_tx: broadcast::Sender<SpeechStateEvent>,
    activity_tx: broadcast::Sender<VadActivityEvent>,
    frame_len: usize,
    sample_rate: u32,
    waveform_points: usize,
    publish_seq: u64,
    transition_seq: u64,
}

impl FrameStage {
    fn process(&mut self, frame: Frame) -> Result<SmoothedState> {
        let decision = match self.classifier.classify(&frame) {
            Ok(d) => d,
            Err(e) => {
                self.diagnostics
                    .classifier_errors
                    .fetch_add(1, Ordering::Relaxed);
                error!(
                    frame_index = frame.index,
                    classifier = self.classifier.name(),
                    error = %e,
                    "classifier failed"
                );
                return Err(e);
            }
        };

        self.diagnostics
            .frames_classified
            .fetch_add(1, Ordering::Relaxed);
        if decision.is_speech {
            self.diagnostics.speech_frames.fetch_add(1, Ordering::Relaxed);
        }

        let was_speech = self.smoother.state().is_speech();
        let smoothed = self.smoother.update(decision);
        let stream_offset = self.stream_offset(frame.index);

        if smoothed.is_speech != was_speech {
            self.diagnostics.transitions.fetch_add(1, Ordering::Relaxed);
            info!(
                frame_index = frame.index,
                offset_ms = stream_offset.as_millis() as u64,
                score = decision.score,
                "{}",
                if smoothed.is_speech {
                    "speech started"
                } else {
                    "speech ended"
                }
            );
            let _ = self.state_tx.send(SpeechStateEvent {
                seq: self.transition_seq,
                is_speech: smoothed.is_speech,
                frame_index: frame.index,
                stream_offset_ms: stream_offset.as_millis() as u64,
            });
            self.transition_seq += 1;
        }

        let _ = self.activity_tx.send(VadActivityEvent {
            seq: self.publish_seq,
            score: decision.score,
            is_speech: decision.is_speech,
        });

        if frame.index % LEVEL_LOG_INTERVAL == 0 {
            debug!(
                frame_index = frame.index,
                score = decision.score,
                raw = decision.is_speech,
                smoothed = smoothed.is_speech,
                "audio level check"
            );
        }

        self.slot.publish(PublishedSnapshot {
            seq: self.publish_seq,
            is_speech: smoothed.is_speech,
            raw_is_speech: decision.is_speech,
            score: decision.score,
            consecutive_count: smoothed.consecutive_count,
            frame_index: frame.index,
            stream_offset,
            last_frame_samples: summarize_waveform(&frame.samples, self.waveform_points),
            published_at: Instant::now(),
        });
        self.publish_seq += 1;

        Ok(smoothed)
    }

    /// Stream position at the end of frame `index`.
    fn stream_offset(&self, index: u64) -> Duration {
        let samples = (index + 1).saturating_mul(self.frame_len as u64);
        Duration::from_micros(samples.saturating_mul(1_000_000) / self.sample_rate as u64)
    }
}

/// FrameBuffer → FrameClassifier → StateSmoother → published snapshot.
pub struct VadPipeline {
    config: VadConfig,
    frames: FrameBuffer,
    stage: FrameStage,
    i16_scratch: Vec<f32>,
}

impl VadPipeline {
    /// Build a pipeline with the classifier selected by `config.classifier`.
    ///
    /// # Errors
    /// `VadError::Configuration` if `config` fails validation.
    pub fn new(config: VadConfig) -> Result<Self> {
        config.validate()?;
        let classifier = build_classifier(&config)?;
        Self::with_classifier(config, classifier)
    }

    /// Build a pipeline around a caller-supplied classifier.
    pub fn with_classifier(config: VadConfig, classifier: Box<dyn FrameClassifier>) -> Result<Self> {
        config.validate()?;
        let frame_len = config.frame_len();
        let (state_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (activity_tx, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            sample_rate = config.sample_rate,
            frame_ms = config.frame_duration_ms,
            frame_len,
            hold_frames = config.hold_frames,
            classifier = classifier.name(),
            "VAD pipeline created"
        );

        Ok(Self {
            frames: FrameBuffer::new(frame_len),
            stage: FrameStage {
                classifier,
                smoother: StateSmoother::new(config.hold_frames),
                slot: Arc::new(SnapshotSlot::new()),
                diagnostics: Arc::new(PipelineDiagnostics::default()),
                state_tx,
                activity_tx,
                frame_len,
                sample_rate: config.sample_rate,
                waveform_points: config.waveform_points,
                publish_seq: 0,
                transition_seq: 0,
            },
            i16_scratch: Vec::new(),
            config,
        })
    }

    /// Feed one captured chunk of any length.
    ///
    /// Every frame the chunk completes is classified, smoothed and published
    /// in arrival order. An empty or short chunk just waits in the buffer.
    ///
    /// # Errors
    /// `VadError::Classifier` if the classifier rejects a frame. Frames before
    /// it stay published; frames after it stay buffered for the next call.
    pub fn ingest(&mut self, chunk: &[f32]) -> Result<()> {
        let Self { frames, stage, .. } = self;
        stage.diagnostics.chunks_in.fetch_add(1, Ordering::Relaxed);
        stage
            .diagnostics
            .samples_in
            .fetch_add(chunk.len(), Ordering::Relaxed);

        for frame in frames.push(chunk) {
            stage.process(frame)?;
        }
        Ok(())
    }

    /// Feed signed 16-bit PCM, as delivered by most capture APIs.
    pub fn ingest_i16(&mut self, chunk: &[i16]) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.i16_scratch);
        i16_slice_to_f32(chunk, &mut scratch);
        let result = self.ingest(&scratch);
        self.i16_scratch = scratch;
        result
    }

    /// Latest published snapshot, `None` before the first frame completes.
    pub fn read_latest(&self) -> Option<Arc<PublishedSnapshot>> {
        self.stage.slot.latest()
    }

    /// A handle consumers on other threads can poll.
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader::new(Arc::clone(&self.stage.slot))
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<SpeechStateEvent> {
        self.stage.state_tx.subscribe()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<VadActivityEvent> {
        self.stage.activity_tx.subscribe()
    }

    pub(crate) fn state_sender(&self) -> broadcast::Sender<SpeechStateEvent> {
        self.stage.state_tx.clone()
    }

    pub(crate) fn activity_sender(&self) -> broadcast::Sender<VadActivityEvent> {
        self.stage.activity_tx.clone()
    }

    pub fn diagnostics(&self) -> Arc<PipelineDiagnostics> {
        Arc::clone(&self.stage.diagnostics)
    }

    pub fn smoothed_state(&self) -> SmoothedState {
        self.stage.smoother.current()
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn frame_len(&self) -> usize {
        self.frames.frame_len()
    }

    pub fn classifier_name(&self) -> &'static str {
        self.stage.classifier.name()
    }

    /// Start a new session: drop buffered samples, return to SILENT, clear the
    /// published snapshot. Publish sequence numbers keep increasing.
    pub fn reset(&mut self) {
        self.frames.reset();
        self.stage.smoother.reset();
        self.stage.classifier.reset();
        self.stage.slot.clear();
        self.stage.diagnostics.reset();
    }
}

/// Why [`run`] returned.
#[derive(Debug)]
pub enum CaptureExit {
    /// The stop flag was cleared.
    Stopped,
    /// The source reported end of stream.
    Exhausted,
    /// Capture or classification failed.
    Failed(VadError),
}

/// Drive `pipeline` from `source` until `running` clears, the source ends, or
/// an error occurs. The stop flag is checked after every ingest.
pub fn run(
    pipeline: &mut VadPipeline,
    source: &mut dyn CaptureSource,
    running: &AtomicBool,
) -> CaptureExit {
    info!(source = source.name(), "capture loop started");

    let exit = loop {
        if !running.load(Ordering::Acquire) {
            break CaptureExit::Stopped;
        }

        let chunk = match source.read() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                info!(source = source.name(), "capture source exhausted");
                break CaptureExit::Exhausted;
            }
            Err(e) => {
                error!(source = source.name(), error = %e, "capture read failed");
                break CaptureExit::Failed(e);
            }
        };

        if let Err(e) = pipeline.ingest(&chunk) {
            break CaptureExit::Failed(e);
        }
    };

    if let CaptureExit::Failed(ref e) = exit {
        warn!(error = %e, "capture loop ended with error");
    }

    let snap = pipeline.diagnostics().snapshot();
    info!(
        chunks_in = snap.chunks_in,
        samples_in = snap.samples_in,
        frames_classified = snap.frames_classified,
        speech_frames = snap.speech_frames,
        transitions = snap.transitions,
        classifier_errors = snap.classifier_errors,
        "capture loop stopped"
    );
    exit
}
