//! Microphone capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority. It
//! must not block, perform I/O or log. The callback here only downmixes into a
//! reusable buffer and pushes into a lock-free SPSC ring; overflow is counted in
//! an atomic and reported later by the reader.
//!
//! `MicrophoneSource::read` runs on the capture thread: it drains the ring,
//! resamples to the pipeline rate, and surfaces stream errors as
//! `VadError::Capture`.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms, so a `MicrophoneSource` must be
//! opened and dropped on the same thread. `VadEngine` guarantees this by opening
//! sources through a factory that runs on the capture thread.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{
    capture::CaptureSource, device::match_device_name, downmix_into, resample::RateConverter,
};
use crate::{
    buffering::{create_sample_ring, Consumer, Producer, SampleConsumer, SampleProducer},
    config::VadConfig,
    error::{Result, VadError},
};

/// Samples drained from the ring per attempt.
const DRAIN_CHUNK: usize = 2048;
/// Sleep between polls of an empty ring.
const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Upper bound on one blocking `read`.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct MicrophoneSource {
    /// Kept alive so the stream is not dropped prematurely.
    _stream: Stream,
    consumer: SampleConsumer,
    /// Cleared on drop so the callback no-ops while the stream shuts down.
    running: Arc<AtomicBool>,
    /// Last stream error reported by cpal.
    fault: Arc<Mutex<Option<String>>>,
    dropped: Arc<AtomicUsize>,
    reported_dropped: usize,
    converter: RateConverter,
    raw: Vec<f32>,
    device_rate: u32,
    target_rate: u32,
    device_name: String,
}

impl MicrophoneSource {
    /// Open the configured (or default) microphone, delivering `config.sample_rate`.
    pub fn open(config: &VadConfig) -> Result<Self> {
        Self::open_with_preference(config.sample_rate, config.preferred_input_device.as_deref())
    }

    /// Open an input device by preferred name, falling back to the default
    /// input device and then the first available one.
    ///
    /// # Errors
    /// `VadError::NoDefaultInputDevice` when no microphone exists,
    /// `VadError::AudioDevice` if cpal cannot build or start the stream.
    pub fn open_with_preference(target_rate: u32, preferred: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_device(&host, preferred)?;
        let device_name = device.name().unwrap_or_default();

        let supported = device
            .default_input_config()
            .map_err(|e| VadError::AudioDevice(e.to_string()))?;
        let device_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(
            device = device_name.as_str(),
            device_rate, channels, target_rate, "opening input device"
        );

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(device_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_sample_ring();
        let running = Arc::new(AtomicBool::new(true));
        let fault = Arc::new(Mutex::new(None));
        let dropped = Arc::new(AtomicUsize::new(0));
        let shared = CallbackShared {
            running: Arc::clone(&running),
            fault: Arc::clone(&fault),
            dropped: Arc::clone(&dropped),
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, producer, shared, |s: f32| s),
            SampleFormat::I16 => {
                build_input::<i16>(&device, &config, producer, shared, |s: i16| s as f32 / 32_768.0)
            }
            SampleFormat::I32 => build_input::<i32>(&device, &config, producer, shared, |s: i32| {
                s as f32 / 2_147_483_648.0
            }),
            SampleFormat::U16 => build_input::<u16>(&device, &config, producer, shared, |s: u16| {
                (s as f32 - 32_768.0) / 32_768.0
            }),
            SampleFormat::U8 => {
                build_input::<u8>(&device, &config, producer, shared, |s: u8| (s as f32 - 128.0) / 128.0)
            }
            fmt => {
                return Err(VadError::AudioDevice(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| VadError::AudioDevice(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            consumer,
            running,
            fault,
            dropped,
            reported_dropped: 0,
            converter: RateConverter::new(device_rate, target_rate, DRAIN_CHUNK / 2)?,
            raw: vec![0f32; DRAIN_CHUNK],
            device_rate,
            target_rate,
            device_name,
        })
    }

    /// Native rate of the opened device (before resampling).
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl CaptureSource for MicrophoneSource {
    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        let deadline = Instant::now() + READ_TIMEOUT;
        loop {
            if let Some(msg) = self.fault.lock().take() {
                return Err(VadError::Capture(msg));
            }

            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > self.reported_dropped {
                warn!(
                    dropped = dropped - self.reported_dropped,
                    "capture ring full, samples dropped"
                );
                self.reported_dropped = dropped;
            }

            let n = self.consumer.pop_slice(&mut self.raw);
            if n > 0 {
                return Ok(Some(self.converter.process(&self.raw[..n])));
            }
            if Instant::now() >= deadline {
                return Ok(Some(Vec::new()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// State shared between the reader and the audio callbacks.
struct CallbackShared {
    running: Arc<AtomicBool>,
    fault: Arc<Mutex<Option<String>>>,
    dropped: Arc<AtomicUsize>,
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: SampleProducer,
    shared: CallbackShared,
    to_f32: fn(T) -> f32,
) -> Result<Stream>
where
    T: SizedSample + Copy + Send + 'static,
{
    let channels = config.channels as usize;
    let CallbackShared {
        running,
        fault,
        dropped,
    } = shared;
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                downmix_into(data, channels, to_f32, &mut mono);
                let written = producer.push_slice(&mono);
                if written < mono.len() {
                    dropped.fetch_add(mono.len() - written, Ordering::Relaxed);
                }
            },
            move |err| {
                error!("audio stream error: {err}");
                *fault.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| VadError::AudioDevice(e.to_string()))
}

fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    if let Some(wanted) = preferred {
        match host.input_devices() {
            Ok(devices) => {
                let devices: Vec<cpal::Device> = devices.collect();
                let names: Vec<String> = devices
                    .iter()
                    .map(|d| d.name().unwrap_or_default())
                    .collect();
                let idx = match_device_name(&names, wanted)
                    .and_then(|hit| names.iter().position(|n| n == hit));
                if let Some(device) = idx.and_then(|i| devices.into_iter().nth(i)) {
                    return Ok(device);
                }
                warn!("preferred input device '{wanted}' not found, falling back");
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| VadError::AudioDevice(e.to_string()))?;
    let fallback = devices.next().ok_or(VadError::NoDefaultInputDevice)?;
    warn!("no default input device, falling back to first available input");
    Ok(fallback)
}
