use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use livevad_core::{
    audio::device::list_input_devices, ClassifierKind, EngineStatus, PublishedSnapshot, VadConfig,
    VadEngine,
};
use tracing::info;

/// How often the latest snapshot is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Width of the text waveform meter.
const METER_WIDTH: usize = 32;
const METER_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Default)]
struct Args {
    wav: Option<PathBuf>,
    fast: bool,
    device: Option<String>,
    config: Option<PathBuf>,
    classifier: Option<ClassifierKind>,
    threshold: Option<f32>,
    aggressiveness: Option<u8>,
    hold_frames: Option<u32>,
    frame_ms: Option<u32>,
    seconds: Option<f64>,
    list_devices: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("livevad=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("vad_monitor failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    fn value<T: std::str::FromStr>(
        it: &mut impl Iterator<Item = String>,
        flag: &str,
    ) -> Result<T, String> {
        let Some(v) = it.next() else {
            return Err(format!("missing value for {flag}"));
        };
        v.parse::<T>()
            .map_err(|_| format!("invalid value for {flag}: {v}"))
    }

    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--wav" => args.wav = Some(value(&mut it, "--wav")?),
            "--fast" => args.fast = true,
            "--device" => args.device = Some(value(&mut it, "--device")?),
            "--config" => args.config = Some(value(&mut it, "--config")?),
            "--classifier" => args.classifier = Some(value(&mut it, "--classifier")?),
            "--threshold" => args.threshold = Some(value(&mut it, "--threshold")?),
            "--aggressiveness" => args.aggressiveness = Some(value(&mut it, "--aggressiveness")?),
            "--hold-frames" => args.hold_frames = Some(value(&mut it, "--hold-frames")?),
            "--frame-ms" => args.frame_ms = Some(value(&mut it, "--frame-ms")?),
            "--seconds" => args.seconds = Some(value(&mut it, "--seconds")?),
            "--list-devices" => args.list_devices = true,
            "--help" | "-h" => {
                println!(
                    "Usage: vad_monitor [--wav <file> [--fast] | --device <name>] [--config <file.json>]\n\
                     \x20                  [--classifier energy|webrtc] [--threshold <rms>]\n\
                     \x20                  [--aggressiveness 0-3] [--hold-frames <n>] [--frame-ms <ms>]\n\
                     \x20                  [--seconds <n>] [--list-devices]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn build_config(args: &Args) -> Result<VadConfig, String> {
    let mut config = match &args.config {
        Some(path) => VadConfig::load(path).map_err(|e| e.to_string())?,
        None => VadConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(kind) = args.classifier {
        config.classifier = kind;
    }
    if let Some(t) = args.threshold {
        config.energy_threshold = t;
    }
    if let Some(a) = args.aggressiveness {
        config.aggressiveness = a;
    }
    if let Some(h) = args.hold_frames {
        config.hold_frames = h;
    }
    if let Some(ms) = args.frame_ms {
        config.frame_duration_ms = ms;
    }
    if args.device.is_some() {
        config.preferred_input_device = args.device.clone();
    }
    Ok(config)
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    if args.list_devices {
        let devices = list_input_devices();
        if devices.is_empty() {
            println!("no input devices found");
        }
        for d in devices {
            let marker = if d.is_default { " (default)" } else { "" };
            println!("{}{marker}", d.name);
        }
        return Ok(());
    }

    let config = build_config(&args)?;
    let engine = VadEngine::new(config).map_err(|e| e.to_string())?;
    info!(
        classifier = engine.config().classifier.label(),
        frame_ms = engine.config().frame_duration_ms,
        hold_frames = engine.config().hold_frames,
        "monitor starting"
    );

    match &args.wav {
        Some(path) => engine.start_wav(path.clone(), !args.fast),
        None => start_microphone(&engine),
    }
    .map_err(|e| e.to_string())?;

    let deadline = args
        .seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| Instant::now() + Duration::from_secs_f64(s));
    let reader = engine.reader();
    let mut stdout = std::io::stdout();

    while engine.is_running() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        let line = render_status(reader.read_latest().as_deref());
        let _ = write!(stdout, "\r{line}");
        let _ = stdout.flush();
        thread::sleep(POLL_INTERVAL);
    }

    // NotRunning when the source ended on its own; the thread is joined either way.
    let _ = engine.stop();
    let final_line = render_status(reader.read_latest().as_deref());
    println!("\r{final_line}");

    let diag = engine.diagnostics();
    println!(
        "frames={} speech_frames={} transitions={} classifier_errors={}",
        diag.frames_classified, diag.speech_frames, diag.transitions, diag.classifier_errors
    );

    if engine.status() == EngineStatus::Error {
        return Err(engine
            .last_error()
            .unwrap_or_else(|| "capture ended with an error".into()));
    }
    Ok(())
}

#[cfg(feature = "audio-cpal")]
fn start_microphone(engine: &VadEngine) -> livevad_core::Result<()> {
    engine.start_microphone()
}

#[cfg(not(feature = "audio-cpal"))]
fn start_microphone(_engine: &VadEngine) -> livevad_core::Result<()> {
    Err(livevad_core::VadError::AudioDevice(
        "microphone capture requires the 'audio-cpal' feature; use --wav".into(),
    ))
}

fn render_status(snapshot: Option<&PublishedSnapshot>) -> String {
    match snapshot {
        None => format!("{:<20} |{}|", "Waiting for audio", " ".repeat(METER_WIDTH)),
        Some(s) => {
            let label = if s.is_speech {
                "Speech Detected!"
            } else {
                "No Speech Detected"
            };
            format!(
                "{label:<20} |{}| score={:.4} t={:.2}s",
                meter(&s.last_frame_samples),
                s.score,
                s.stream_offset.as_secs_f64()
            )
        }
    }
}

/// Peak amplitude of each column, drawn with block characters.
fn meter(samples: &[f32]) -> String {
    if samples.is_empty() {
        return " ".repeat(METER_WIDTH);
    }
    let top = (METER_LEVELS.len() - 1) as f32;
    (0..METER_WIDTH)
        .map(|col| {
            let start = col * samples.len() / METER_WIDTH;
            let end = ((col + 1) * samples.len() / METER_WIDTH)
                .max(start + 1)
                .min(samples.len());
            let peak = samples
                .get(start..end)
                .unwrap_or(&[])
                .iter()
                .fold(0.0f32, |p, s| p.max(s.abs()))
                .min(1.0);
            METER_LEVELS[(peak * top).round() as usize]
        })
        .collect()
}
