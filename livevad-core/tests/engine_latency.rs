use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};
use livevad_core::{
    CaptureSource, EngineStatus, Result, SnapshotReader, VadConfig, VadEngine, VadError,
};
use parking_lot::Mutex;

const CHUNK: usize = 480;

/// Emits 30 ms chunks every few milliseconds: `speech_chunks` loud chunks,
/// then silence until stopped. Records when the first silent chunk went out.
struct ScriptedMic {
    speech_chunks: usize,
    emitted: usize,
    silence_started: Arc<Mutex<Option<Instant>>>,
}

impl CaptureSource for ScriptedMic {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        thread::sleep(Duration::from_millis(3));
        let level = if self.emitted < self.speech_chunks {
            0.4
        } else {
            let mut started = self.silence_started.lock();
            started.get_or_insert_with(Instant::now);
            0.0
        };
        self.emitted += 1;
        Ok(Some(vec![level; CHUNK]))
    }

    fn name(&self) -> &str {
        "scripted-mic"
    }
}

fn wait_for(reader: &SnapshotReader, want_speech: bool, timeout: Duration) -> Option<Instant> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some(snap) = reader.read_latest() {
            if snap.is_speech == want_speech {
                return Some(Instant::now());
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

#[test]
fn smoothed_state_follows_capture_within_budget() {
    let config = VadConfig {
        hold_frames: 3,
        ..VadConfig::default()
    };
    let engine = VadEngine::new(config).unwrap();
    let reader = engine.reader();
    let silence_started = Arc::new(Mutex::new(None));

    let started = Instant::now();
    let marker = Arc::clone(&silence_started);
    engine
        .start_with(move |_| {
            Ok(Box::new(ScriptedMic {
                speech_chunks: 40,
                emitted: 0,
                silence_started: marker,
            }) as Box<dyn CaptureSource>)
        })
        .unwrap();
    assert_eq!(engine.status(), EngineStatus::Listening);

    let speech_at = wait_for(&reader, true, Duration::from_secs(2)).expect("speech never reported");
    assert!(
        speech_at - started < Duration::from_millis(500),
        "speech onset took {:?}",
        speech_at - started
    );

    let silent_at = wait_for(&reader, false, Duration::from_secs(2)).expect("silence never reported");
    let silence_began = (*silence_started.lock()).expect("source switched to silence");
    let lag = silent_at.saturating_duration_since(silence_began);
    assert!(lag < Duration::from_millis(250), "speech end lag {lag:?}");

    engine.stop().unwrap();
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(!engine.is_running());

    let diag = engine.diagnostics();
    assert!(diag.frames_classified >= 43);
    assert_eq!(diag.speech_frames, 40);
    assert_eq!(diag.transitions, 2);
}

#[test]
fn wav_session_replays_file_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burst.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for i in 0..16_000u32 {
        // Half a second of tone followed by half a second of silence.
        let s = if i < 8_000 {
            (0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin() * 32_767.0)
                as i16
        } else {
            0
        };
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();

    let engine = VadEngine::new(VadConfig::default()).unwrap();
    let mut status = engine.subscribe_status();
    let mut transitions = engine.subscribe_state();

    engine.start_wav(&path, false).unwrap();
    engine.wait();

    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert_eq!(status.try_recv().unwrap().status, EngineStatus::Listening);
    let stopped = status.try_recv().unwrap();
    assert_eq!(stopped.status, EngineStatus::Stopped);
    assert_eq!(stopped.detail.as_deref(), Some("source exhausted"));

    let on = transitions.try_recv().unwrap();
    let off = transitions.try_recv().unwrap();
    assert!(on.is_speech && !off.is_speech);
    assert_eq!(on.frame_index, 2);
    assert!(off.stream_offset_ms > 500 && off.stream_offset_ms < 700);

    let snap = engine.read_latest().unwrap();
    assert_eq!(snap.frame_index, 32);
    assert!(!snap.is_speech);
}

#[test]
fn missing_wav_fails_start() {
    let engine = VadEngine::new(VadConfig::default()).unwrap();
    let err = engine.start_wav("/no/such/file.wav", false).unwrap_err();
    assert!(matches!(err, VadError::Wav(_)));
    assert_eq!(engine.status(), EngineStatus::Error);
    assert!(matches!(engine.stop(), Err(VadError::NotRunning)));
}
