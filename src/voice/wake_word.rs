//! Wake word spotting
//!
//! Reads fixed-size frames from the microphone, feeds them to a keyword
//! engine and invokes a callback on each detection. The spotter heals itself:
//! a failed read reopens the capture stream, a failed engine call rebuilds
//! both the engine and the stream. Reads that keep failing on reopened streams
//! escalate to a full rebuild after a pause.

use std::convert::Infallible;
use std::rc::Rc;

use super::device::{AudioDevice, CaptureStream, StreamFormat};
use crate::config::SpotterConfig;
use crate::retry::Sleeper;
use crate::{Error, Result};

/// A loaded keyword-spotting engine
///
/// Dropping the engine releases it.
pub trait KeywordEngine {
    /// Sample rate the engine expects
    fn sample_rate(&self) -> u32;

    /// Samples per frame the engine expects
    fn frame_length(&self) -> usize;

    /// Process one frame, returning the detected keyword index if any
    ///
    /// # Errors
    ///
    /// Returns error if the engine rejects the frame; the engine must not be
    /// reused afterwards
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>>;
}

/// Builds keyword engines from their model artifacts
pub trait EngineLoader {
    /// Load a fresh engine
    ///
    /// # Errors
    ///
    /// Returns error if credentials or artifacts are rejected
    fn load(&self) -> Result<Box<dyn KeywordEngine>>;
}

/// State of the wake word spotter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotterState {
    /// Nothing acquired yet
    Uninitialized,
    /// Engine and stream held, reading frames
    Listening,
    /// Engine or stream lost, full re-acquire pending
    Degraded,
}

/// What one spotter iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotterEvent {
    /// Frame processed, nothing detected
    Quiet,
    /// Wake word detected and the callback ran
    Triggered(usize),
    /// Engine and stream re-acquired
    Reacquired,
    /// Re-acquire failed, backed off
    ReacquireFailed,
    /// Capture stream reopened after a read failure
    StreamRecovered,
    /// Capture stream could not be reopened or keeps failing, now degraded
    StreamLost,
    /// Engine rejected a frame, now degraded
    EngineFault,
}

/// Detects wake words on a live capture stream
pub struct WakeWordSpotter {
    loader: Box<dyn EngineLoader>,
    device: Rc<dyn AudioDevice>,
    sleeper: Rc<dyn Sleeper>,
    config: SpotterConfig,
    state: SpotterState,
    engine: Option<Box<dyn KeywordEngine>>,
    stream: Option<Box<dyn CaptureStream>>,
    frame: Vec<i16>,
    failed_reacquires: u32,
    read_failures: u32,
}

impl WakeWordSpotter {
    /// Create a spotter and try to acquire the engine and capture stream
    ///
    /// Acquisition failure is not an error: the spotter starts degraded and
    /// retries on the next [`Self::step`] or [`Self::ensure_ready`].
    #[must_use]
    pub fn new(
        loader: Box<dyn EngineLoader>,
        device: Rc<dyn AudioDevice>,
        sleeper: Rc<dyn Sleeper>,
        config: SpotterConfig,
    ) -> Self {
        let mut spotter = Self {
            loader,
            device,
            sleeper,
            config,
            state: SpotterState::Uninitialized,
            engine: None,
            stream: None,
            frame: Vec::new(),
            failed_reacquires: 0,
            read_failures: 0,
        };

        match spotter.acquire() {
            Ok(()) => tracing::info!("wake word spotter initialized"),
            Err(e) => {
                tracing::error!(error = %e, "wake word spotter failed to initialize");
                spotter.state = SpotterState::Degraded;
            }
        }
        spotter
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SpotterState {
        self.state
    }

    /// Whether the spotter holds a working engine and stream
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SpotterState::Listening
    }

    /// Make one acquisition attempt if not listening
    pub fn ensure_ready(&mut self) -> bool {
        if self.is_ready() {
            return true;
        }
        match self.acquire() {
            Ok(()) => {
                tracing::info!("wake word spotter re-initialized");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "wake word spotter re-initialization failed");
                self.state = SpotterState::Degraded;
                false
            }
        }
    }

    /// Listen forever, invoking `on_trigger` for each detection
    ///
    /// The callback runs synchronously with the capture stream stopped, so no
    /// frames are read while a command is handled. A failing callback is
    /// logged and listening resumes.
    ///
    /// # Errors
    ///
    /// Returns only if the re-acquire policy is bounded and exhausted
    pub fn run<F>(&mut self, mut on_trigger: F) -> Result<Infallible>
    where
        F: FnMut() -> Result<()>,
    {
        tracing::info!("listening for wake word");
        loop {
            self.step(&mut on_trigger)?;
        }
    }

    /// Run one iteration of the listen loop
    ///
    /// # Errors
    ///
    /// Returns error if the re-acquire policy is bounded and exhausted
    pub fn step<F>(&mut self, on_trigger: &mut F) -> Result<SpotterEvent>
    where
        F: FnMut() -> Result<()>,
    {
        if self.state != SpotterState::Listening {
            return self.reacquire();
        }

        let (Some(engine), Some(stream)) = (self.engine.as_mut(), self.stream.as_mut()) else {
            self.state = SpotterState::Degraded;
            return Ok(SpotterEvent::StreamLost);
        };

        if let Err(e) = stream.read(&mut self.frame) {
            self.read_failures += 1;
            tracing::error!(
                error = %e,
                consecutive = self.read_failures,
                "wake word capture read failed"
            );
            if self.read_failures >= self.config.read_failure_limit {
                return Ok(self.abandon_stream());
            }
            return Ok(self.recover_stream());
        }
        self.read_failures = 0;

        match engine.process(&self.frame) {
            Ok(None) => Ok(SpotterEvent::Quiet),
            Ok(Some(keyword)) => {
                tracing::info!(keyword, "wake word detected");
                Ok(self.dispatch(keyword, on_trigger))
            }
            Err(e) => {
                tracing::error!(error = %e, "wake word engine error, re-initializing");
                self.state = SpotterState::Degraded;
                self.pause(self.config.engine_error_delay);
                Ok(SpotterEvent::EngineFault)
            }
        }
    }

    fn dispatch<F>(&mut self, keyword: usize, on_trigger: &mut F) -> SpotterEvent
    where
        F: FnMut() -> Result<()>,
    {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.stop() {
                tracing::warn!(error = %e, "failed to pause wake word capture");
            }
        }

        if let Err(e) = on_trigger() {
            tracing::error!(error = %e, "wake word handler failed");
        }

        let resumed = self.stream.as_mut().map_or_else(
            || Err(Error::Audio("capture stream missing".to_string())),
            |stream| stream.start(),
        );
        if let Err(e) = resumed {
            tracing::error!(error = %e, "failed to resume wake word capture");
            self.recover_stream();
        } else {
            tracing::info!("resuming listening for wake word");
        }

        SpotterEvent::Triggered(keyword)
    }

    /// Reopen the capture stream, keeping the engine
    fn recover_stream(&mut self) -> SpotterEvent {
        self.close_stream();

        let reopened = self
            .engine
            .as_ref()
            .map(|engine| self.engine_format(engine.as_ref()))
            .ok_or_else(|| Error::WakeWord("engine missing".to_string()))
            .and_then(|format| open_stream(self.device.as_ref(), format));

        match reopened {
            Ok(stream) => {
                tracing::info!("wake word capture stream reopened");
                self.stream = Some(stream);
                SpotterEvent::StreamRecovered
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to recover wake word capture stream");
                self.state = SpotterState::Degraded;
                self.pause(self.config.stream_recovery_delay);
                SpotterEvent::StreamLost
            }
        }
    }

    /// Give up on the capture device until the next full re-acquire
    fn abandon_stream(&mut self) -> SpotterEvent {
        tracing::error!(
            failures = self.read_failures,
            "wake word capture keeps failing, re-initializing"
        );
        self.read_failures = 0;
        self.close_stream();
        self.state = SpotterState::Degraded;
        self.pause(self.config.stream_recovery_delay);
        SpotterEvent::StreamLost
    }

    fn reacquire(&mut self) -> Result<SpotterEvent> {
        let policy = self.config.reacquire;
        if !policy.allows(self.failed_reacquires) {
            return Err(Error::WakeWord(format!(
                "gave up after {} re-initialization attempts",
                self.failed_reacquires
            )));
        }

        tracing::warn!(state = ?self.state, "attempting wake word re-initialization");
        match self.acquire() {
            Ok(()) => {
                tracing::info!("re-initialization successful, resuming listening");
                Ok(SpotterEvent::Reacquired)
            }
            Err(e) => {
                self.failed_reacquires += 1;
                self.state = SpotterState::Degraded;
                tracing::error!(
                    error = %e,
                    attempts = self.failed_reacquires,
                    "wake word re-initialization failed"
                );
                self.pause(policy.delay);
                Ok(SpotterEvent::ReacquireFailed)
            }
        }
    }

    /// Release everything, then load the engine and open a matching stream
    fn acquire(&mut self) -> Result<()> {
        self.release();

        let engine = self.loader.load()?;
        let format = self.engine_format(engine.as_ref());
        let stream = open_stream(self.device.as_ref(), format)?;

        tracing::debug!(
            sample_rate = format.sample_rate,
            frame_length = format.frames_per_buffer,
            "wake word engine ready"
        );

        self.frame = vec![0; format.samples_per_buffer()];
        self.engine = Some(engine);
        self.stream = Some(stream);
        self.state = SpotterState::Listening;
        self.failed_reacquires = 0;
        self.read_failures = 0;
        Ok(())
    }

    fn engine_format(&self, engine: &dyn KeywordEngine) -> StreamFormat {
        StreamFormat {
            sample_rate: engine.sample_rate(),
            channels: self.config.channels,
            frames_per_buffer: engine.frame_length(),
        }
    }

    fn release(&mut self) {
        self.close_stream();
        if self.engine.take().is_some() {
            tracing::debug!("wake word engine released");
        }
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                tracing::warn!(error = %e, "failed to stop wake word capture stream");
            }
            tracing::debug!("wake word capture stream closed");
        }
    }

    fn pause(&self, delay: std::time::Duration) {
        tracing::info!(delay_ms = delay.as_millis(), "waiting before retry");
        self.sleeper.sleep(delay);
    }
}

impl Drop for WakeWordSpotter {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_stream(device: &dyn AudioDevice, format: StreamFormat) -> Result<Box<dyn CaptureStream>> {
    let mut stream = device.open_input(format)?;
    stream.start()?;
    Ok(stream)
}
