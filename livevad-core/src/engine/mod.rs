//! `VadEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! VadEngine::new(config)      → pipeline built, status = Idle
//!     └─► start_with(factory) → source opened on the capture thread, status = Listening
//!         └─► stop()          → running=false, thread joined, status = Stopped
//! ```
//!
//! The capture loop also ends on its own when the source is exhausted
//! (status = Stopped) or when capture/classification fails (status = Error,
//! error kept for [`VadEngine::last_error`]). The engine can be started again
//! afterwards; each start begins a fresh session.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send`, so sources are never built on the caller's
//! thread. `start_with` takes a factory that runs *inside* the named capture
//! thread; a bounded crossbeam channel carries the open result back so
//! `start_with` can report device errors synchronously.
//!
//! The pipeline itself moves into the capture thread for the duration of a
//! session and is handed back when the thread exits.

pub mod pipeline;
pub mod snapshot;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    audio::{CaptureSource, WavSource},
    config::VadConfig,
    error::{Result, VadError},
    ipc::events::{EngineStatus, EngineStatusEvent, SpeechStateEvent, VadActivityEvent},
    vad::FrameClassifier,
};

#[cfg(feature = "audio-cpal")]
use crate::audio::MicrophoneSource;

pub use pipeline::{CaptureExit, DiagnosticsSnapshot, PipelineDiagnostics, VadPipeline};
pub use snapshot::{PublishedSnapshot, SnapshotReader};

const STATUS_CAPACITY: usize = 64;
const CAPTURE_THREAD_NAME: &str = "livevad-capture";

/// Status, its broadcast channel and the last failure, shared with the
/// capture thread.
struct StatusCell {
    status: Mutex<EngineStatus>,
    last_error: Mutex<Option<VadError>>,
    tx: broadcast::Sender<EngineStatusEvent>,
}

impl StatusCell {
    fn set(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.tx.send(EngineStatusEvent { status, detail });
    }
}

/// The top-level engine handle.
///
/// `VadEngine` is `Send + Sync`; wrap it in an `Arc` to share it.
pub struct VadEngine {
    config: VadConfig,
    /// `None` while a capture thread owns the pipeline.
    pipeline: Arc<Mutex<Option<VadPipeline>>>,
    reader: SnapshotReader,
    diagnostics: Arc<PipelineDiagnostics>,
    state_tx: broadcast::Sender<SpeechStateEvent>,
    activity_tx: broadcast::Sender<VadActivityEvent>,
    running: Arc<AtomicBool>,
    status: Arc<StatusCell>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VadEngine {
    /// Validate `config` and build the pipeline. Does not start capturing.
    ///
    /// # Errors
    /// `VadError::Configuration` for an invalid config or a classifier that
    /// is unavailable in this build.
    pub fn new(config: VadConfig) -> Result<Self> {
        let pipeline = VadPipeline::new(config.clone())?;
        Ok(Self::from_pipeline(config, pipeline))
    }

    /// Build an engine around a caller-supplied classifier.
    pub fn with_classifier(config: VadConfig, classifier: Box<dyn FrameClassifier>) -> Result<Self> {
        let pipeline = VadPipeline::with_classifier(config.clone(), classifier)?;
        Ok(Self::from_pipeline(config, pipeline))
    }

    fn from_pipeline(config: VadConfig, pipeline: VadPipeline) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CAPACITY);
        Self {
            reader: pipeline.reader(),
            diagnostics: pipeline.diagnostics(),
            state_tx: pipeline.state_sender(),
            activity_tx: pipeline.activity_sender(),
            pipeline: Arc::new(Mutex::new(Some(pipeline))),
            config,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(StatusCell {
                status: Mutex::new(EngineStatus::Idle),
                last_error: Mutex::new(None),
                tx: status_tx,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start capturing from the source built by `factory`.
    ///
    /// Blocks until the source is confirmed open (or fails), then returns.
    /// The capture loop keeps running on a background thread.
    ///
    /// # Errors
    /// - `VadError::AlreadyRunning` if a session is active.
    /// - `VadError::Configuration` if the source rate differs from the pipeline rate.
    /// - Whatever the factory returned if the source could not be opened.
    pub fn start_with<F>(&self, factory: F) -> Result<()>
    where
        F: FnOnce(&VadConfig) -> Result<Box<dyn CaptureSource>> + Send + 'static,
    {
        // Claim the session before touching shared state; a concurrent caller loses here.
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VadError::AlreadyRunning);
        }
        // Reclaim the pipeline from a session that ended on its own.
        self.join_worker();

        match self.pipeline.lock().as_mut() {
            Some(pipeline) => pipeline.reset(),
            None => {
                self.running.store(false, Ordering::SeqCst);
                return Err(VadError::Other(anyhow::anyhow!(
                    "pipeline was lost by a previous session"
                )));
            }
        }
        *self.status.last_error.lock() = None;
        self.status.set(EngineStatus::Listening, None);

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let home = Arc::clone(&self.pipeline);
        let (open_tx, open_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let spawned = thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.into())
            .spawn(move || {
                let Some(mut session) = home.lock().take() else {
                    running.store(false, Ordering::SeqCst);
                    let _ = open_tx.send(Err(VadError::NotRunning));
                    return;
                };

                let opened = factory(&config).and_then(|source| {
                    if source.sample_rate() != config.sample_rate {
                        return Err(VadError::config(format!(
                            "source '{}' delivers {} Hz but the pipeline expects {} Hz",
                            source.name(),
                            source.sample_rate(),
                            config.sample_rate
                        )));
                    }
                    Ok(source)
                });

                let mut source = match opened {
                    Ok(source) => {
                        let _ = open_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        *home.lock() = Some(session);
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                let exit = pipeline::run(&mut session, source.as_mut(), &running);
                running.store(false, Ordering::SeqCst);
                // Release the device on this thread.
                drop(source);
                *home.lock() = Some(session);

                match exit {
                    CaptureExit::Stopped => status.set(EngineStatus::Stopped, None),
                    CaptureExit::Exhausted => {
                        status.set(EngineStatus::Stopped, Some("source exhausted".into()))
                    }
                    CaptureExit::Failed(e) => {
                        let detail = e.to_string();
                        *status.last_error.lock() = Some(e);
                        status.set(EngineStatus::Error, Some(detail));
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.status.set(EngineStatus::Error, Some(e.to_string()));
                return Err(VadError::Io(e));
            }
        };

        match open_rx.recv() {
            Ok(Ok(())) => {
                *self.worker.lock() = Some(handle);
                info!("engine started, listening");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                error!(error = %e, "capture source failed to open");
                self.status.set(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Sender dropped without a message: the factory panicked.
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                self.status
                    .set(EngineStatus::Error, Some("capture thread failed to start".into()));
                Err(VadError::Other(anyhow::anyhow!(
                    "capture thread died unexpectedly"
                )))
            }
        }
    }

    /// Start capturing from the configured (or default) microphone.
    #[cfg(feature = "audio-cpal")]
    pub fn start_microphone(&self) -> Result<()> {
        self.start_with(|config| {
            let source = MicrophoneSource::open(config)?;
            Ok(Box::new(source) as Box<dyn CaptureSource>)
        })
    }

    /// Start replaying a WAV file. With `paced`, audio is fed in real time.
    pub fn start_wav(&self, path: impl Into<PathBuf>, paced: bool) -> Result<()> {
        let path = path.into();
        self.start_with(move |config| {
            let source = WavSource::open(&path, config.sample_rate)?.paced(paced);
            Ok(Box::new(source) as Box<dyn CaptureSource>)
        })
    }

    /// Stop capturing and wait for the capture thread to exit.
    ///
    /// # Errors
    /// `VadError::NotRunning` if no session is active.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            self.join_worker();
            return Err(VadError::NotRunning);
        }
        info!("engine stop requested");
        self.join_worker();
        Ok(())
    }

    /// Block until the current session ends on its own (source exhausted or
    /// failed) or another thread calls `stop`.
    pub fn wait(&self) {
        if self.join_worker() {
            self.running.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current engine status.
    pub fn status(&self) -> EngineStatus {
        *self.status.status.lock()
    }

    /// Message of the error that ended the last session, if any.
    pub fn last_error(&self) -> Option<String> {
        self.status.last_error.lock().as_ref().map(ToString::to_string)
    }

    /// Take ownership of the error that ended the last session.
    pub fn take_last_error(&self) -> Option<VadError> {
        self.status.last_error.lock().take()
    }

    /// A cloneable handle for polling the latest snapshot from any thread.
    pub fn reader(&self) -> SnapshotReader {
        self.reader.clone()
    }

    /// Latest published snapshot.
    pub fn read_latest(&self) -> Option<Arc<PublishedSnapshot>> {
        self.reader.read_latest()
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Subscribe to engine status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status.tx.subscribe()
    }

    /// Subscribe to smoothed speech/silence transitions.
    pub fn subscribe_state(&self) -> broadcast::Receiver<SpeechStateEvent> {
        self.state_tx.subscribe()
    }

    /// Subscribe to per-frame raw classifier output.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<VadActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Snapshot of pipeline counters for the current (or last) session.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Join the capture thread, if any. Returns `true` if it panicked.
    fn join_worker(&self) -> bool {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return false;
        };
        if handle.join().is_ok() {
            return false;
        }
        warn!("capture thread panicked");
        self.status
            .set(EngineStatus::Error, Some("capture thread panicked".into()));
        true
    }
}

impl Drop for VadEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemorySource;

    fn config() -> VadConfig {
        VadConfig {
            sample_rate: 1_000,
            frame_duration_ms: 10,
            hold_frames: 1,
            energy_threshold: 0.1,
            ..VadConfig::default()
        }
    }

    fn memory(samples: Vec<f32>) -> impl FnOnce(&VadConfig) -> Result<Box<dyn CaptureSource>> {
        move |cfg| {
            Ok(Box::new(MemorySource::from_samples(cfg.sample_rate, &samples, 7))
                as Box<dyn CaptureSource>)
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = VadConfig {
            hold_frames: 0,
            ..config()
        };
        assert!(matches!(
            VadEngine::new(cfg),
            Err(VadError::Configuration(_))
        ));
    }

    #[test]
    fn session_runs_to_exhaustion() {
        let engine = VadEngine::new(config()).unwrap();
        let mut status_rx = engine.subscribe_status();
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert!(engine.read_latest().is_none());

        let mut samples = vec![0.0f32; 50];
        samples.extend(std::iter::repeat(0.5).take(30));
        engine.start_with(memory(samples)).unwrap();
        engine.wait();

        assert!(!engine.is_running());
        assert_eq!(engine.status(), EngineStatus::Stopped);
        let snap = engine.read_latest().expect("snapshot");
        assert_eq!(snap.frame_index, 7);
        assert!(snap.is_speech);
        assert_eq!(engine.diagnostics().frames_classified, 8);
        assert!(engine.last_error().is_none());

        assert_eq!(status_rx.try_recv().unwrap().status, EngineStatus::Listening);
        assert_eq!(status_rx.try_recv().unwrap().status, EngineStatus::Stopped);

        assert!(matches!(engine.stop(), Err(VadError::NotRunning)));
    }

    #[test]
    fn restart_begins_a_fresh_session() {
        let engine = VadEngine::new(config()).unwrap();
        engine.start_with(memory(vec![0.5; 40])).unwrap();
        engine.wait();
        engine.start_with(memory(vec![0.0; 20])).unwrap();
        engine.wait();

        let snap = engine.read_latest().unwrap();
        assert_eq!(snap.frame_index, 1);
        assert!(!snap.is_speech);
        assert_eq!(engine.diagnostics().frames_classified, 2);
    }

    #[test]
    fn open_failure_is_returned_synchronously() {
        let engine = VadEngine::new(config()).unwrap();
        let err = engine
            .start_with(|_| Err(VadError::NoDefaultInputDevice))
            .unwrap_err();
        assert!(matches!(err, VadError::NoDefaultInputDevice));
        assert_eq!(engine.status(), EngineStatus::Error);
        assert!(!engine.is_running());

        // The pipeline came back; a later start succeeds.
        engine.start_with(memory(vec![0.0; 10])).unwrap();
        engine.wait();
        assert_eq!(engine.status(), EngineStatus::Stopped);
    }

    #[test]
    fn sample_rate_mismatch_is_a_configuration_error() {
        let engine = VadEngine::new(config()).unwrap();
        let err = engine
            .start_with(|_| {
                Ok(Box::new(MemorySource::from_samples(48_000, &[0.0; 10], 10))
                    as Box<dyn CaptureSource>)
            })
            .unwrap_err();
        assert!(matches!(err, VadError::Configuration(_)));
    }

    #[test]
    fn capture_failure_sets_error_status() {
        struct Unplugged;
        impl CaptureSource for Unplugged {
            fn sample_rate(&self) -> u32 {
                1_000
            }
            fn read(&mut self) -> Result<Option<Vec<f32>>> {
                Err(VadError::Capture("device disconnected".into()))
            }
        }

        let engine = VadEngine::new(config()).unwrap();
        engine
            .start_with(|_| Ok(Box::new(Unplugged) as Box<dyn CaptureSource>))
            .unwrap();
        engine.wait();

        assert_eq!(engine.status(), EngineStatus::Error);
        assert!(engine.last_error().unwrap().contains("device disconnected"));
        assert!(engine.take_last_error().unwrap().is_capture());
    }

    #[test]
    fn stop_ends_an_endless_source() {
        struct Endless;
        impl CaptureSource for Endless {
            fn sample_rate(&self) -> u32 {
                1_000
            }
            fn read(&mut self) -> Result<Option<Vec<f32>>> {
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(Some(vec![0.5; 10]))
            }
        }

        let engine = VadEngine::new(config()).unwrap();
        engine
            .start_with(|_| Ok(Box::new(Endless) as Box<dyn CaptureSource>))
            .unwrap();
        assert!(matches!(
            engine.start_with(|_| Ok(Box::new(Endless) as Box<dyn CaptureSource>)),
            Err(VadError::AlreadyRunning)
        ));

        std::thread::sleep(std::time::Duration::from_millis(30));
        engine.stop().unwrap();
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert!(engine.read_latest().unwrap().is_speech);
    }

    #[test]
    fn concurrent_starts_admit_exactly_one_session() {
        struct Endless;
        impl CaptureSource for Endless {
            fn sample_rate(&self) -> u32 {
                1_000
            }
            fn read(&mut self) -> Result<Option<Vec<f32>>> {
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(Some(vec![0.5; 10]))
            }
        }

        for _ in 0..50 {
            let engine = Arc::new(VadEngine::new(config()).unwrap());
            let barrier = Arc::new(std::sync::Barrier::new(4));
            let starters: Vec<_> = (0..4)
                .map(|_| {
                    let engine = Arc::clone(&engine);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        engine.start_with(|_| Ok(Box::new(Endless) as Box<dyn CaptureSource>))
                    })
                })
                .collect();

            let results: Vec<Result<()>> = starters
                .into_iter()
                .map(|h| h.join().expect("starter panicked"))
                .collect();
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, VadError::AlreadyRunning)));

            // The winner's session survives the losers.
            assert!(engine.is_running());
            assert_eq!(engine.status(), EngineStatus::Listening);
            engine.stop().unwrap();
            assert!(!engine.is_running());
        }
    }
}
