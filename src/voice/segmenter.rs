//! Voice-activity-gated command recording
//!
//! Turns a live stream of fixed-size frames into one bounded utterance using
//! two energy thresholds: a higher one to start recording, a lower one to
//! count silence.

use std::rc::Rc;
use std::time::Duration;

use super::device::{AudioDevice, CaptureStream, StreamFormat};
use crate::config::VadConfig;
use crate::{Error, Result};

/// Segmenter state within one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating frames
    Armed,
    /// Capture finished
    Stopped(StopReason),
}

/// Why a capture ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Too many consecutive quiet frames
    Silence,
    /// Hit the hard length cap
    MaxLength,
}

/// One bounded span of captured speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl Utterance {
    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate the utterance was captured at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of interleaved samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        let per_second = u64::from(self.sample_rate) * u64::from(self.channels);
        if per_second == 0 {
            return Duration::ZERO;
        }
        let samples = u64::try_from(self.samples.len()).unwrap_or(u64::MAX);
        Duration::from_millis(samples.saturating_mul(1000) / per_second)
    }
}

/// Mean squared amplitude of a frame
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn frame_energy(frame: &[i16]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    sum_squares / frame.len() as f64
}

/// Frame-by-frame hysteresis state machine
#[derive(Debug)]
pub struct VadTracker {
    config: VadConfig,
    state: SegmenterState,
    silence_frames: u32,
    buffer: Vec<i16>,
}

impl VadTracker {
    /// Create an idle tracker
    #[must_use]
    pub const fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: SegmenterState::Idle,
            silence_frames: 0,
            buffer: Vec::new(),
        }
    }

    /// Feed one frame and return the resulting state
    ///
    /// Frames pushed after the tracker stopped are ignored.
    pub fn push(&mut self, frame: &[i16]) -> SegmenterState {
        let energy = frame_energy(frame);

        if self.state == SegmenterState::Idle && energy > self.config.start_energy() {
            tracing::debug!(energy, "voice detected, recording");
            self.state = SegmenterState::Armed;
            self.silence_frames = 0;
        }

        if self.state != SegmenterState::Armed {
            return self.state;
        }

        let room = self.config.max_samples.saturating_sub(self.buffer.len());
        self.buffer.extend_from_slice(&frame[..frame.len().min(room)]);

        if self.buffer.len() >= self.config.max_samples {
            tracing::debug!(samples = self.buffer.len(), "maximum recording length reached");
            self.state = SegmenterState::Stopped(StopReason::MaxLength);
        } else if energy < self.config.stop_energy() {
            self.silence_frames += 1;
            if self.silence_frames > self.config.max_silence_frames {
                tracing::debug!(
                    silence_frames = self.silence_frames,
                    "sustained silence, recording stopped"
                );
                self.state = SegmenterState::Stopped(StopReason::Silence);
            }
        } else {
            self.silence_frames = 0;
        }

        self.state
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Consecutive quiet frames seen while armed
    #[must_use]
    pub const fn silence_frames(&self) -> u32 {
        self.silence_frames
    }

    /// Samples accumulated so far
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the accumulated samples and return to idle
    pub fn take_utterance(&mut self) -> Utterance {
        let samples = std::mem::take(&mut self.buffer);
        self.reset();
        Utterance {
            samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        }
    }

    /// Return to idle, discarding anything buffered
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.silence_frames = 0;
        self.buffer.clear();
    }
}

/// Records one spoken command from the microphone
pub struct VoiceActivitySegmenter {
    device: Rc<dyn AudioDevice>,
    tracker: VadTracker,
}

impl VoiceActivitySegmenter {
    /// Create a segmenter reading from `device`
    #[must_use]
    pub fn new(device: Rc<dyn AudioDevice>, config: VadConfig) -> Self {
        Self {
            device,
            tracker: VadTracker::new(config),
        }
    }

    /// Block until one utterance has been captured
    ///
    /// Waits indefinitely while no speech is heard. The capture stream is
    /// stopped and closed before returning, on success or failure.
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream cannot be opened, started or read
    pub fn capture_utterance(&mut self) -> Result<Utterance> {
        let config = self.tracker.config;
        self.tracker.reset();

        let mut stream = self.device.open_input(StreamFormat {
            sample_rate: config.sample_rate,
            channels: config.channels,
            frames_per_buffer: config.frame_len() / usize::from(config.channels.max(1)),
        })?;

        tracing::debug!("listening for voice");
        let recorded = stream
            .start()
            .and_then(|()| self.record(stream.as_mut(), config.frame_len()));

        if let Err(e) = stream.stop() {
            tracing::warn!(error = %e, "failed to stop capture stream");
        }
        drop(stream);

        let reason = recorded?;
        let utterance = self.tracker.take_utterance();
        if utterance.is_empty() {
            return Err(Error::Audio("no speech captured".to_string()));
        }

        tracing::info!(
            samples = utterance.len(),
            duration_ms = utterance.duration().as_millis(),
            ?reason,
            "voice command recorded"
        );
        Ok(utterance)
    }

    fn record(&mut self, stream: &mut dyn CaptureStream, frame_len: usize) -> Result<StopReason> {
        let mut frame = vec![0i16; frame_len];
        loop {
            if let Err(e) = stream.read(&mut frame) {
                self.tracker.reset();
                return Err(e);
            }
            if let SegmenterState::Stopped(reason) = self.tracker.push(&frame) {
                return Ok(reason);
            }
        }
    }
}
