use std::f32::consts::PI;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

use approx::assert_relative_eq;
use livevad_core::{
    Decision, Frame, FrameClassifier, Result, SpeechStateEvent, VadActivityEvent, VadConfig,
    VadPipeline,
};
use tokio::sync::broadcast;

/// Speech when the frame's first sample exceeds 0.5. Score is that sample.
struct FirstSampleClassifier;

impl FrameClassifier for FirstSampleClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Decision> {
        let first = frame.samples[0];
        Ok(Decision {
            is_speech: first > 0.5,
            score: first,
        })
    }

    fn name(&self) -> &'static str {
        "first-sample"
    }
}

fn sine(freq: f32, amplitude: f32, len: usize, rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / rate as f32).sin())
        .collect()
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[test]
fn one_second_of_silence_yields_33_silent_frames() {
    let config = VadConfig {
        hold_frames: 1,
        ..VadConfig::default()
    };
    let mut pipeline = VadPipeline::new(config).unwrap();
    let mut activity = pipeline.subscribe_activity();
    let mut state = pipeline.subscribe_state();

    pipeline.ingest(&vec![0.0; 16_000]).unwrap();

    let raw = drain(&mut activity);
    assert_eq!(raw.len(), 33);
    assert!(raw.iter().all(|ev| !ev.is_speech));
    assert!(drain(&mut state).is_empty());

    let snap = pipeline.read_latest().expect("snapshot");
    assert_eq!(snap.frame_index, 32);
    assert!(!snap.is_speech);
    assert_eq!(snap.last_frame_samples.len(), 480);
}

#[test]
fn half_scale_sine_is_speech_from_the_first_frame() {
    let config = VadConfig {
        hold_frames: 1,
        ..VadConfig::default()
    };
    let mut pipeline = VadPipeline::new(config).unwrap();
    let mut activity = pipeline.subscribe_activity();
    let mut state = pipeline.subscribe_state();

    pipeline.ingest(&sine(440.0, 0.5, 16_000, 16_000)).unwrap();

    let raw = drain(&mut activity);
    assert_eq!(raw.len(), 33);
    assert!(raw.iter().all(|ev| ev.is_speech));
    // RMS of a sine is amplitude / sqrt(2).
    assert_relative_eq!(raw[10].score, 0.5 / 2f32.sqrt(), epsilon = 0.01);

    let transitions = drain(&mut state);
    assert_eq!(transitions.len(), 1);
    assert!(transitions[0].is_speech);
    assert_eq!(transitions[0].frame_index, 0);
    assert_eq!(transitions[0].stream_offset_ms, 30);
}

/// Harmonic "vowel" at 130 Hz with 1/k partials up to ~3 kHz, pulsed at a
/// syllable rate, plus a little deterministic noise.
#[cfg(feature = "vad-earshot")]
fn voiced(len: usize, rate: u32) -> Vec<f32> {
    let mut seed = 0x2545_f491u32;
    (0..len)
        .map(|i| {
            let t = i as f32 / rate as f32;
            let tone: f32 = (1..=23)
                .map(|k| (2.0 * PI * 130.0 * k as f32 * t).sin() / k as f32)
                .sum();
            let envelope = 0.6 + 0.4 * (2.0 * PI * 4.0 * t).sin();
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = ((seed >> 9) as f32 / (1u32 << 23) as f32 - 0.5) * 0.02;
            0.25 * envelope * tone + noise
        })
        .collect()
}

#[cfg(feature = "vad-earshot")]
#[test]
fn webrtc_pipeline_separates_voiced_audio_from_silence() {
    use livevad_core::ClassifierKind;

    let config = VadConfig {
        classifier: ClassifierKind::Webrtc,
        aggressiveness: 0,
        hold_frames: 1,
        ..VadConfig::default()
    };
    let mut pipeline = VadPipeline::new(config).unwrap();
    assert_eq!(pipeline.classifier_name(), "webrtc");
    let mut activity = pipeline.subscribe_activity();
    let mut state = pipeline.subscribe_state();

    // 300 ms of silence, then one second of voiced audio.
    let mut signal = vec![0.0f32; 4_800];
    signal.extend(voiced(16_000, 16_000));
    for chunk in signal.chunks(1_000) {
        pipeline.ingest(chunk).unwrap();
    }

    let raw = drain(&mut activity);
    assert_eq!(raw.len(), signal.len() / 480);
    assert!(raw[..10].iter().all(|ev| !ev.is_speech && ev.score == 0.0));

    let voiced_frames = &raw[10..];
    assert!(voiced_frames.iter().all(|ev| ev.score > 0.01));
    let speech = voiced_frames.iter().filter(|ev| ev.is_speech).count();
    assert!(speech > 0, "no voiced frame was classified as speech");

    let transitions = drain(&mut state);
    assert!(transitions.first().is_some_and(|ev| ev.is_speech && ev.frame_index >= 10));
    assert_eq!(
        pipeline.diagnostics().snapshot().speech_frames,
        speech,
        "diagnostics agree with the activity stream"
    );
}

#[test]
fn hysteresis_needs_a_full_run_of_hold_frames() {
    let config = VadConfig {
        sample_rate: 1_000,
        frame_duration_ms: 1,
        hold_frames: 3,
        ..VadConfig::default()
    };
    let mut pipeline =
        VadPipeline::with_classifier(config, Box::new(FirstSampleClassifier)).unwrap();

    let raw = [true, true, false, true, true, true];
    let mut smoothed = Vec::new();
    for r in raw {
        pipeline.ingest(&[if r { 0.9 } else { 0.1 }]).unwrap();
        smoothed.push(pipeline.read_latest().unwrap().is_speech);
    }
    assert_eq!(smoothed, vec![false, false, false, false, false, true]);
}

#[test]
fn chunking_does_not_change_decisions() {
    // Silence, a burst of tone, silence again, with a ragged tail.
    let mut signal = vec![0.0f32; 4_000];
    signal.extend(sine(300.0, 0.3, 6_000, 16_000));
    signal.extend(vec![0.0f32; 5_123]);

    let run = |chunk_sizes: &mut dyn Iterator<Item = usize>| {
        let mut pipeline = VadPipeline::new(VadConfig::default()).unwrap();
        let mut activity = pipeline.subscribe_activity();
        let mut state = pipeline.subscribe_state();
        let mut pos = 0;
        while pos < signal.len() {
            let n = chunk_sizes.next().unwrap_or(1).min(signal.len() - pos);
            pipeline.ingest(&signal[pos..pos + n]).unwrap();
            pos += n;
        }
        let raw: Vec<VadActivityEvent> = drain(&mut activity);
        let transitions: Vec<SpeechStateEvent> = drain(&mut state);
        (
            raw.iter().map(|e| (e.is_speech, e.score)).collect::<Vec<_>>(),
            transitions
                .iter()
                .map(|e| (e.is_speech, e.frame_index))
                .collect::<Vec<_>>(),
            pipeline.read_latest().map(|s| s.frame_index),
        )
    };

    let whole = run(&mut std::iter::once(signal.len()));

    // Deterministic ragged sizes between 1 and 997 samples.
    let mut seed = 12_345u32;
    let mut ragged = std::iter::from_fn(move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        Some((seed >> 16) as usize % 997 + 1)
    });
    let chunked = run(&mut ragged);

    let tiny = run(&mut std::iter::repeat(7));

    assert_eq!(whole.0.len(), signal.len() / 480);
    assert_eq!(whole, chunked);
    assert_eq!(whole, tiny);
    assert_eq!(whole.1.len(), 2, "one speech burst: {:?}", whole.1);
}

#[test]
fn readers_never_observe_a_torn_snapshot() {
    const READERS: usize = 48;

    let config = VadConfig {
        sample_rate: 1_000,
        frame_duration_ms: 4,
        hold_frames: 1,
        waveform_points: 4,
        ..VadConfig::default()
    };
    let mut pipeline =
        VadPipeline::with_classifier(config, Box::new(FirstSampleClassifier)).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let reader = pipeline.reader();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last_seq = None;
                let mut observed = 0u64;
                while !done.load(Ordering::Acquire) {
                    let Some(snap) = reader.read_latest() else {
                        continue;
                    };
                    let level = snap.last_frame_samples[0];
                    assert!(snap.last_frame_samples.iter().all(|&s| s == level));
                    assert_eq!(snap.score, level);
                    assert_eq!(snap.raw_is_speech, level > 0.5);
                    assert_eq!(snap.is_speech, snap.raw_is_speech);
                    assert_eq!(snap.seq, snap.frame_index);
                    if let Some(prev) = last_seq {
                        assert!(snap.seq >= prev, "seq went backwards");
                    }
                    last_seq = Some(snap.seq);
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    for i in 0..20_000 {
        let level = if i % 2 == 0 { 0.9 } else { 0.1 };
        pipeline.ingest(&[level; 4]).unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().expect("reader panicked");
    }
    assert_eq!(pipeline.read_latest().unwrap().seq, 19_999);
}
