//! Audio capture from microphone

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use super::device::{AudioDevice, CaptureStream, PlaybackStream, StreamFormat};
use super::playback::CpalPlayback;
use crate::{Error, Result};

/// Longest wait for the next capture buffer before the read is treated as a fault
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Capture buffers held between the device callback and the reader
const CAPTURE_QUEUE_DEPTH: usize = 64;

/// Opens streams on the host's default input and output devices
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevice;

impl CpalDevice {
    /// Create a device handle for the default host
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AudioDevice for CpalDevice {
    fn open_input(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(CpalCapture::open(format)?))
    }

    fn open_output(&self, format: StreamFormat) -> Result<Box<dyn PlaybackStream>> {
        Ok(Box::new(CpalPlayback::open(format)?))
    }
}

/// Pick a supported config matching `format`, preferring native `i16`
pub(super) fn select_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
    format: StreamFormat,
) -> Result<(StreamConfig, SampleFormat)> {
    let rate = SampleRate(format.sample_rate);
    let chosen = configs
        .filter(|c| {
            c.channels() == format.channels
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
                && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
        })
        .max_by_key(|c| c.sample_format() == SampleFormat::I16)
        .ok_or_else(|| {
            Error::Audio(format!(
                "no audio config for {} Hz, {} channel(s)",
                format.sample_rate, format.channels
            ))
        })?;

    let sample_format = chosen.sample_format();
    Ok((chosen.with_sample_rate(rate).config(), sample_format))
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
pub(super) fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Blocking capture stream over a cpal input callback
pub struct CpalCapture {
    stream: Stream,
    receiver: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    fault: Arc<Mutex<Option<String>>>,
}

impl CpalCapture {
    /// Open the default input device at `format`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(format: StreamFormat) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let (config, sample_format) = select_config(
            device
                .supported_input_configs()
                .map_err(|e| Error::Audio(e.to_string()))?,
            format,
        )?;

        let (sender, receiver) = mpsc::sync_channel(CAPTURE_QUEUE_DEPTH);
        let fault = Arc::new(Mutex::new(None));
        let stream = build_stream(&device, &config, sample_format, sender, Arc::clone(&fault))?;

        // Some hosts start streams on creation
        stream.pause().ok();

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            ?sample_format,
            "audio capture opened"
        );

        Ok(Self {
            stream,
            receiver,
            pending: VecDeque::with_capacity(format.samples_per_buffer() * 2),
            fault,
        })
    }

    fn take_fault(&self) -> Option<String> {
        self.fault.lock().ok().and_then(|mut f| f.take())
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    sender: SyncSender<Vec<i16>>,
    fault: Arc<Mutex<Option<String>>>,
) -> Result<Stream> {
    let on_error = move |err: cpal::StreamError| {
        tracing::error!(error = %err, "audio capture error");
        if let Ok(mut slot) = fault.lock() {
            *slot = Some(err.to_string());
        }
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| forward(&sender, data.to_vec()),
            on_error,
            None,
        ),
        _ => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                forward(&sender, data.iter().copied().map(f32_to_i16).collect());
            },
            on_error,
            None,
        ),
    };

    stream.map_err(|e| Error::Audio(e.to_string()))
}

fn forward(sender: &SyncSender<Vec<i16>>, chunk: Vec<i16>) {
    if let Err(TrySendError::Full(_)) = sender.try_send(chunk) {
        tracing::trace!("capture queue full, dropping buffer");
    }
}

impl CaptureStream for CpalCapture {
    fn start(&mut self) -> Result<()> {
        self.stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");
        Ok(())
    }

    fn read(&mut self, frame: &mut [i16]) -> Result<()> {
        while self.pending.len() < frame.len() {
            if let Some(fault) = self.take_fault() {
                return Err(Error::Audio(fault));
            }
            match self.receiver.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::Audio("capture read timed out".to_string()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Audio("capture stream closed".to_string()));
                }
            }
        }

        let len = frame.len();
        for (slot, sample) in frame.iter_mut().zip(self.pending.drain(..len)) {
            *slot = sample;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stream.pause().map_err(|e| Error::Audio(e.to_string()))?;
        self.pending.clear();
        while self.receiver.try_recv().is_ok() {}
        tracing::debug!("audio capture stopped");
        Ok(())
    }
}
