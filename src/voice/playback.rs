//! Audio playback to speakers

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Interval at which the playback thread checks for completion
const COMPLETION_POLL: Duration = Duration::from_millis(20);

/// Grace period letting the device drain its last buffer
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// Destination that renders encoded audio
///
/// At most one sound plays at a time: starting a new one stops the previous.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play WAV audio, resolving when it finishes or is stopped
    async fn play(&self, audio: Arc<[u8]>) -> Result<()>;

    /// Stop the current sound, if any
    fn stop(&self);

    /// Hold output in place without losing position
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be suspended
    fn suspend(&self) -> Result<()>;

    /// Continue suspended output
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be resumed
    fn resume(&self) -> Result<()>;
}

/// Plays audio to the default output device
pub struct DevicePlayback {
    paused: Arc<AtomicBool>,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl DevicePlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            paused: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
        })
    }

    /// Whether output is currently suspended
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Swap in a stop flag for a new sound, stopping the previous one
    fn begin_sound(&self) -> Arc<AtomicBool> {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(Arc::clone(&stopped)) {
            previous.store(true, Ordering::Release);
        }
        stopped
    }
}

#[async_trait]
impl AudioSink for DevicePlayback {
    async fn play(&self, audio: Arc<[u8]>) -> Result<()> {
        let (samples, sample_rate) = decode_wav(&audio)?;
        let stopped = self.begin_sound();
        let paused = Arc::clone(&self.paused);

        tokio::task::spawn_blocking(move || {
            play_samples_blocking(samples, sample_rate, &paused, &stopped)
        })
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }

    fn stop(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stopped) = current {
            stopped.store(true, Ordering::Release);
        }
    }

    fn suspend(&self) -> Result<()> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}

/// Pick an output configuration running at `sample_rate`, mono preferred
fn output_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| {
            Error::Audio(format!("no output config supports {sample_rate} Hz"))
        })?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Play mono samples, blocking until they finish or `stopped` is raised
///
/// While `paused` is raised the device is fed silence and the position holds.
fn play_samples_blocking(
    samples: Vec<f32>,
    sample_rate: u32,
    paused: &Arc<AtomicBool>,
    stopped: &Arc<AtomicBool>,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let config = output_config(&device, sample_rate)?;
    let channels = usize::from(config.channels);
    let total = samples.len();

    let position = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicBool::new(false));

    let cb_position = Arc::clone(&position);
    let cb_paused = Arc::clone(paused);
    let cb_stopped = Arc::clone(stopped);
    let cb_failed = Arc::clone(&failed);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cb_paused.load(Ordering::Acquire) || cb_stopped.load(Ordering::Acquire) {
                    data.fill(0.0);
                    return;
                }

                let mut pos = cb_position.load(Ordering::Acquire);
                for frame in data.chunks_mut(channels) {
                    let sample = samples.get(pos).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    if pos < total {
                        pos += 1;
                    }
                }
                cb_position.store(pos, Ordering::Release);
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                cb_failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    while position.load(Ordering::Acquire) < total
        && !stopped.load(Ordering::Acquire)
        && !failed.load(Ordering::Acquire)
    {
        std::thread::sleep(COMPLETION_POLL);
    }

    if !stopped.load(Ordering::Acquire) {
        std::thread::sleep(DRAIN_DELAY);
    }

    drop(stream);

    if failed.load(Ordering::Acquire) {
        return Err(Error::Audio("output stream failed".to_string()));
    }

    tracing::debug!(samples = total, "playback complete");
    Ok(())
}

/// Decode WAV bytes into mono f32 samples and their sample rate
#[allow(clippy::cast_precision_loss)]
fn decode_wav(wav: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    let samples = downmix(&interleaved, usize::from(spec.channels));
    Ok((samples, spec.sample_rate))
}

/// Average interleaved channels into one
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
