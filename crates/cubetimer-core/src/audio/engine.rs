//! Audio line-in capture for the Stackmat timer
//!
//! Provides high-level interface for:
//! - Enumerating input devices
//! - Opening a mono 8-bit capture line on a device
//!
//! cpal streams are not `Send`, so every line runs its stream on a
//! dedicated capture thread. The input callback quantises channel 0 to
//! unsigned 8-bit and pushes it into a lock-free ring buffer; [`LineIn`]
//! is the consumer side and implements [`SampleSource`]. Dropping or
//! closing the `LineIn` stops the capture thread, which drops the stream
//! and releases the device.

use super::reader::SampleSource;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Ring buffer size in samples (about 8 seconds at 8kHz)
const RING_BUFFER_SIZE: usize = 65536;

/// How long [`LineIn::read`] waits for samples before returning 0
const READ_WAIT: Duration = Duration::from_millis(50);

/// Poll interval while waiting for samples
const READ_POLL: Duration = Duration::from_millis(2);

/// Errors that can occur while acquiring a capture line
#[derive(Error, Debug)]
pub enum AudioEngineError {
    #[error("No input devices found")]
    NoDevicesFound,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("No input channels available")]
    NoInputChannels,

    #[error("Capture thread failed: {0}")]
    Thread(#[from] io::Error),
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default input device
    pub is_default: bool,
    /// Supported sample rates among the common ones
    pub sample_rates: Vec<u32>,
    /// Number of input channels
    pub input_channels: u16,
}

/// Audio engine: device discovery and line acquisition
#[derive(Debug, Clone)]
pub struct AudioEngine {
    sample_rate: u32,
    device_name: Option<String>,
}

impl AudioEngine {
    /// Create a new audio engine with default settings
    pub fn new() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            device_name: None,
        }
    }

    /// Get configured sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Set sample rate (must be called before opening a line)
    pub fn set_sample_rate(&mut self, rate: u32) {
        if (4000..=192000).contains(&rate) {
            self.sample_rate = rate;
        }
    }

    /// Select an input device by name (`None` = host default)
    pub fn select_device(&mut self, name: Option<&str>) {
        self.device_name = name.map(str::to_string);
    }

    /// Get the selected device name
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// List available input devices
    ///
    /// # Returns
    /// Vector of device information for all devices with input channels
    pub fn list_devices() -> anyhow::Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let default_input = host.default_input_device().and_then(|d| d.name().ok());

        for device in host.input_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_input.as_deref() == Some(name.as_str());

            let input_channels = device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);

            // Common sample rates to check
            let common_rates = [8000, 11025, 16000, 22050, 44100, 48000];
            let mut sample_rates = Vec::new();

            if let Ok(configs) = device.supported_input_configs() {
                for config in configs {
                    for &rate in &common_rates {
                        if (config.min_sample_rate()..=config.max_sample_rate()).contains(&rate)
                            && !sample_rates.contains(&rate)
                        {
                            sample_rates.push(rate);
                        }
                    }
                }
            }

            sample_rates.sort();

            devices.push(DeviceInfo {
                name,
                is_default,
                sample_rates,
                input_channels,
            });
        }

        Ok(devices)
    }

    fn find_device(&self) -> Result<Device, AudioEngineError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or(AudioEngineError::NoDevicesFound),
            Some(name) => host
                .input_devices()
                .map_err(|e| AudioEngineError::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioEngineError::DeviceNotFound(name.clone())),
        }
    }

    /// Open a capture line on the selected device
    ///
    /// Blocks until the capture thread has either started the stream or
    /// failed to, so acquisition failures (missing or busy device) are
    /// reported here and never from the reader loop.
    pub fn open_line(&self) -> Result<LineIn, AudioEngineError> {
        let ring = HeapRb::<u8>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = ring.split();
        let running = Arc::new(AtomicBool::new(true));
        let captured = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, AudioEngineError>>(1);

        let engine = self.clone();
        let thread_running = Arc::clone(&running);
        let thread_captured = Arc::clone(&captured);
        let thread = std::thread::Builder::new()
            .name("line-in".into())
            .spawn(move || {
                let stream = match engine.build_stream(producer, &thread_running, &thread_captured)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(engine.sample_rate));

                while thread_running.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(20));
                }
                drop(stream);
                tracing::info!("Capture line closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                tracing::info!(
                    "Capture line opened: {} @ {}Hz",
                    self.device_name.as_deref().unwrap_or("default"),
                    sample_rate
                );
                Ok(LineIn {
                    consumer,
                    running,
                    captured,
                    sample_rate,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioEngineError::StreamError(
                    "capture thread exited before reporting".to_string(),
                ))
            }
        }
    }

    /// Build and start the input stream (runs on the capture thread)
    fn build_stream(
        &self,
        mut producer: ringbuf::HeapProd<u8>,
        running: &Arc<AtomicBool>,
        captured: &Arc<AtomicU64>,
    ) -> Result<cpal::Stream, AudioEngineError> {
        let device = self.find_device()?;

        let default_input = device
            .default_input_config()
            .map_err(|e| AudioEngineError::DeviceUnavailable(e.to_string()))?;
        let channels = default_input.channels();
        if channels == 0 {
            return Err(AudioEngineError::NoInputChannels);
        }

        tracing::info!(
            "Device default input config: {} Hz, {} channels",
            default_input.sample_rate(),
            channels
        );

        let config = StreamConfig {
            channels,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let input_running = Arc::clone(running);
        let input_captured = Arc::clone(captured);
        let num_channels = channels as usize;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !input_running.load(Ordering::Relaxed) {
                        return;
                    }
                    let mut frames = 0u64;
                    for frame in data.chunks(num_channels) {
                        if let Some(&sample) = frame.first() {
                            let _ = producer.try_push(quantize(sample));
                            frames += 1;
                        }
                    }
                    let prev = input_captured.fetch_add(frames, Ordering::Relaxed);
                    if prev == 0 {
                        tracing::info!("Input callback started: {} frames", frames);
                    }
                },
                move |err| {
                    tracing::error!("Input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioEngineError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioEngineError::DeviceUnavailable(e.to_string()))?;

        Ok(stream)
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a float sample in [-1.0, 1.0] to unsigned 8-bit
pub fn quantize(sample: f32) -> u8 {
    ((sample.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
}

/// An open capture line
pub struct LineIn {
    consumer: ringbuf::HeapCons<u8>,
    running: Arc<AtomicBool>,
    captured: Arc<AtomicU64>,
    sample_rate: u32,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl LineIn {
    /// Sample rate of the line
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples captured by the input callback so far
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Stop the capture thread and release the device
    pub fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

impl SampleSource for LineIn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = Instant::now() + READ_WAIT;
        loop {
            if self.thread.as_ref().map_or(true, |h| h.is_finished()) {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "capture line closed",
                ));
            }
            if self.consumer.occupied_len() > 0 {
                return Ok(self.consumer.pop_slice(buf));
            }
            if Instant::now() >= deadline {
                return Ok(0);
            }
            std::thread::sleep(READ_POLL);
        }
    }
}

impl Drop for LineIn {
    fn drop(&mut self) {
        self.close();
    }
}
