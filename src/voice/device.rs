//! Audio device contract
//!
//! Streams are opened stopped. Dropping a stream closes it; callers stop it
//! first so buffered output drains and capture halts cleanly.

use crate::Result;

/// Shape of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Samples per second, per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Frames per device buffer
    pub frames_per_buffer: usize,
}

impl StreamFormat {
    /// Interleaved samples in one buffer
    #[must_use]
    pub fn samples_per_buffer(&self) -> usize {
        self.frames_per_buffer * usize::from(self.channels)
    }
}

/// A microphone stream delivering signed 16-bit samples
pub trait CaptureStream {
    /// Begin delivering samples
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to start
    fn start(&mut self) -> Result<()>;

    /// Block until `frame` is completely filled with the next samples
    ///
    /// # Errors
    ///
    /// Returns error if the device faults or stops delivering
    fn read(&mut self, frame: &mut [i16]) -> Result<()>;

    /// Stop delivering samples and discard anything buffered
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to stop
    fn stop(&mut self) -> Result<()>;
}

/// A speaker stream accepting signed 16-bit samples
pub trait PlaybackStream {
    /// Begin rendering
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to start
    fn start(&mut self) -> Result<()>;

    /// Queue interleaved samples, blocking while the device buffer is full
    ///
    /// # Errors
    ///
    /// Returns error if the device faults
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Wait for queued samples to drain, then stop rendering
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to stop
    fn stop(&mut self) -> Result<()>;
}

/// Opens capture and playback streams
pub trait AudioDevice {
    /// Open a capture stream in the stopped state
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports `format`
    fn open_input(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>>;

    /// Open a playback stream in the stopped state
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports `format`
    fn open_output(&self, format: StreamFormat) -> Result<Box<dyn PlaybackStream>>;
}
