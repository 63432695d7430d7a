//! Audio playback to speakers

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};

use super::capture::select_config;
use super::device::{AudioDevice, PlaybackStream, StreamFormat};
use super::wav;
use crate::{Error, Result};

/// Frames written to the output device per block
pub const PLAYBACK_BLOCK_FRAMES: usize = 1024;

/// Blocks queued ahead of the device before `write` waits
const QUEUE_AHEAD_BLOCKS: usize = 4;

/// Poll interval while waiting on the output callback
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Plays WAV responses from the remote service
pub struct ResponsePlayer {
    device: Rc<dyn AudioDevice>,
}

impl ResponsePlayer {
    /// Create a player writing to `device`
    #[must_use]
    pub fn new(device: Rc<dyn AudioDevice>) -> Self {
        Self { device }
    }

    /// Decode a WAV buffer and play it to completion
    ///
    /// The buffer is validated before any device is opened. The output stream
    /// is stopped and closed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is not a playable WAV or the device fails
    pub fn play(&self, bytes: &[u8]) -> Result<()> {
        let decoded = wav::decode(bytes)?;
        let format = decoded.format;
        let channels = usize::from(format.channels);
        let samples = decoded.samples();
        let total_frames = samples.len() / channels;

        tracing::debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            frames = total_frames,
            "playing response"
        );

        let mut stream = self.device.open_output(StreamFormat {
            sample_rate: format.sample_rate,
            channels: format.channels,
            frames_per_buffer: PLAYBACK_BLOCK_FRAMES,
        })?;

        let written = stream
            .start()
            .and_then(|()| write_blocks(stream.as_mut(), &samples[..total_frames * channels], channels));
        let stopped = stream.stop();
        drop(stream);

        written?;
        stopped?;
        tracing::debug!(frames = total_frames, "playback complete");
        Ok(())
    }
}

/// Write whole frames in fixed-size blocks; the last block may be short
fn write_blocks(stream: &mut dyn PlaybackStream, samples: &[i16], channels: usize) -> Result<()> {
    for block in samples.chunks(PLAYBACK_BLOCK_FRAMES * channels) {
        stream.write(block)?;
    }
    Ok(())
}

/// Blocking playback stream over a cpal output callback
pub struct CpalPlayback {
    stream: Stream,
    queue: Arc<Mutex<VecDeque<i16>>>,
    fault: Arc<Mutex<Option<String>>>,
    high_water: usize,
    sample_rate: u32,
    channels: u16,
}

impl CpalPlayback {
    /// Open the default output device at `format`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(format: StreamFormat) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let (config, sample_format) = select_config(
            device
                .supported_output_configs()
                .map_err(|e| Error::Audio(e.to_string()))?,
            format,
        )?;

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let fault = Arc::new(Mutex::new(None));

        let fault_slot = Arc::clone(&fault);
        let on_error = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio playback error");
            if let Ok(mut slot) = fault_slot.lock() {
                *slot = Some(err.to_string());
            }
        };

        let source = Arc::clone(&queue);
        let stream = match sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    fill(&source, data, |s| s);
                },
                on_error,
                None,
            ),
            _ => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill(&source, data, |s| f32::from(s) / 32768.0);
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.pause().ok();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            ?sample_format,
            "audio playback opened"
        );

        Ok(Self {
            stream,
            queue,
            fault,
            high_water: format.samples_per_buffer() * QUEUE_AHEAD_BLOCKS,
            sample_rate: format.sample_rate,
            channels: format.channels,
        })
    }

    fn queued(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault.lock().ok().and_then(|mut f| f.take()) {
            Some(fault) => Err(Error::Audio(fault)),
            None => Ok(()),
        }
    }
}

/// Drain queued samples into the device buffer, padding with silence
fn fill<T: Copy + Default>(queue: &Mutex<VecDeque<i16>>, data: &mut [T], convert: impl Fn(i16) -> T) {
    let Ok(mut queue) = queue.lock() else {
        data.fill(T::default());
        return;
    };
    for out in data.iter_mut() {
        *out = queue.pop_front().map_or_else(T::default, &convert);
    }
}

impl PlaybackStream for CpalPlayback {
    fn start(&mut self) -> Result<()> {
        self.stream.play().map_err(|e| Error::Audio(e.to_string()))
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        while self.queued() >= self.high_water {
            self.check_fault()?;
            std::thread::sleep(POLL_INTERVAL);
        }
        self.check_fault()?;

        self.queue
            .lock()
            .map_err(|_| Error::Audio("playback queue poisoned".to_string()))?
            .extend(samples.iter().copied());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Bound the drain wait by the queued audio plus slack
        let queued = u64::try_from(self.queued()).unwrap_or(u64::MAX);
        let per_second = u64::from(self.sample_rate) * u64::from(self.channels);
        let budget = Duration::from_millis(queued.saturating_mul(1000) / per_second.max(1) + 500);

        let started = Instant::now();
        while self.queued() > 0 && started.elapsed() < budget {
            std::thread::sleep(POLL_INTERVAL);
        }

        // Let the device render its final buffer
        std::thread::sleep(Duration::from_millis(100));

        self.stream.pause().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio playback stopped");
        Ok(())
    }
}
