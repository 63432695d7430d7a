//! Shared test utilities
//!
//! Scripted stand-ins for the audio device, keyword engine, transport,
//! announcer and sleeper. Each fake is a cheap handle over shared state, so a
//! test keeps one clone for inspection and hands another to the code under
//! test.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use voice_relay::relay::{FileUpload, Reply, Transport};
use voice_relay::voice::{
    Announcer, AudioDevice, CaptureStream, EngineLoader, KeywordEngine, PlaybackStream,
    StreamFormat,
};
use voice_relay::{Error, Result, Sleeper};

/// One scripted capture read
#[derive(Debug, Clone, Copy)]
pub enum Read {
    /// Fill the frame with a constant amplitude
    Level(i16),
    /// Fail the read
    Fail,
}

/// One scripted `open_input` call
#[derive(Debug, Clone)]
pub enum Input {
    /// Opening fails
    OpenFails,
    /// Opening succeeds but `start` fails
    StartFails,
    /// A stream serving these reads, then failing
    Reads(Vec<Read>),
}

impl Input {
    /// `n` reads at a constant amplitude
    #[must_use]
    pub fn level(amplitude: i16, n: usize) -> Vec<Read> {
        vec![Read::Level(amplitude); n]
    }
}

#[derive(Debug, Default)]
pub struct DeviceState {
    inputs: VecDeque<Input>,
    output_fails: bool,
    pub input_formats: Vec<StreamFormat>,
    pub output_formats: Vec<StreamFormat>,
    pub capture_starts: usize,
    pub capture_stops: usize,
    pub capture_closes: usize,
    pub reads: usize,
    pub reads_while_stopped: usize,
    pub active_captures: usize,
    pub playback_starts: usize,
    pub playback_stops: usize,
    pub playback_closes: usize,
    pub blocks: Vec<usize>,
    pub written: Vec<i16>,
}

impl DeviceState {
    /// Total device calls of any kind
    #[must_use]
    pub fn calls(&self) -> usize {
        self.input_formats.len()
            + self.output_formats.len()
            + self.capture_starts
            + self.capture_stops
            + self.reads
            + self.playback_starts
            + self.playback_stops
            + self.blocks.len()
    }
}

/// Audio device serving scripted capture streams and recording playback
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Rc<RefCell<DeviceState>>,
}

impl FakeDevice {
    #[must_use]
    pub fn new(inputs: Vec<Input>) -> Self {
        let device = Self::default();
        device.state.borrow_mut().inputs = inputs.into();
        device
    }

    /// Make every `open_output` fail
    #[must_use]
    pub fn with_failing_output(self) -> Self {
        self.state.borrow_mut().output_fails = true;
        self
    }

    /// Queue more capture streams
    pub fn push_input(&self, input: Input) {
        self.state.borrow_mut().inputs.push_back(input);
    }

    #[must_use]
    pub fn state(&self) -> std::cell::Ref<'_, DeviceState> {
        self.state.borrow()
    }

    #[must_use]
    pub fn shared(&self) -> Rc<dyn AudioDevice> {
        Rc::new(self.clone())
    }
}

impl AudioDevice for FakeDevice {
    fn open_input(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>> {
        let mut state = self.state.borrow_mut();
        state.input_formats.push(format);
        match state.inputs.pop_front() {
            None | Some(Input::OpenFails) => Err(Error::Audio("no input device".to_string())),
            Some(Input::StartFails) => Ok(Box::new(FakeCapture {
                reads: VecDeque::new(),
                start_fails: true,
                active: false,
                state: Rc::clone(&self.state),
            })),
            Some(Input::Reads(reads)) => Ok(Box::new(FakeCapture {
                reads: reads.into(),
                start_fails: false,
                active: false,
                state: Rc::clone(&self.state),
            })),
        }
    }

    fn open_output(&self, format: StreamFormat) -> Result<Box<dyn PlaybackStream>> {
        let mut state = self.state.borrow_mut();
        state.output_formats.push(format);
        if state.output_fails {
            return Err(Error::Audio("no output device".to_string()));
        }
        Ok(Box::new(FakePlayback {
            state: Rc::clone(&self.state),
        }))
    }
}

struct FakeCapture {
    reads: VecDeque<Read>,
    start_fails: bool,
    active: bool,
    state: Rc<RefCell<DeviceState>>,
}

impl CaptureStream for FakeCapture {
    fn start(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.capture_starts += 1;
        if self.start_fails {
            return Err(Error::Audio("device refused to start".to_string()));
        }
        if !self.active {
            self.active = true;
            state.active_captures += 1;
        }
        Ok(())
    }

    fn read(&mut self, frame: &mut [i16]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if !self.active {
            state.reads_while_stopped += 1;
        }
        match self.reads.pop_front() {
            Some(Read::Level(amplitude)) => {
                frame.fill(amplitude);
                Ok(())
            }
            Some(Read::Fail) => Err(Error::Audio("input overflow".to_string())),
            None => Err(Error::Audio("capture script exhausted".to_string())),
        }
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.capture_stops += 1;
        if self.active {
            self.active = false;
            state.active_captures -= 1;
        }
        Ok(())
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.capture_closes += 1;
        if self.active {
            state.active_captures -= 1;
        }
    }
}

struct FakePlayback {
    state: Rc<RefCell<DeviceState>>,
}

impl PlaybackStream for FakePlayback {
    fn start(&mut self) -> Result<()> {
        self.state.borrow_mut().playback_starts += 1;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.blocks.push(samples.len());
        state.written.extend_from_slice(samples);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.borrow_mut().playback_stops += 1;
        Ok(())
    }
}

impl Drop for FakePlayback {
    fn drop(&mut self) {
        self.state.borrow_mut().playback_closes += 1;
    }
}

/// One scripted `process` call
#[derive(Debug, Clone, Copy)]
pub enum Detect {
    Quiet,
    Keyword(usize),
    Fail,
}

/// One scripted `load` call
#[derive(Debug, Clone)]
pub enum Load {
    Fails,
    Engine(Vec<Detect>),
}

#[derive(Debug, Default)]
pub struct EngineState {
    loads: VecDeque<Load>,
    pub load_calls: usize,
    pub released: usize,
    pub frames: usize,
}

/// Engine sample rate served by [`FakeEngines`]
pub const ENGINE_SAMPLE_RATE: u32 = 16_000;

/// Engine frame length served by [`FakeEngines`]
pub const ENGINE_FRAME_LENGTH: usize = 512;

/// Keyword engine loader following a script; engines run out to `Quiet`
#[derive(Clone, Default)]
pub struct FakeEngines {
    state: Rc<RefCell<EngineState>>,
}

impl FakeEngines {
    #[must_use]
    pub fn new(loads: Vec<Load>) -> Self {
        let engines = Self::default();
        engines.state.borrow_mut().loads = loads.into();
        engines
    }

    #[must_use]
    pub fn state(&self) -> std::cell::Ref<'_, EngineState> {
        self.state.borrow()
    }

    #[must_use]
    pub fn boxed(&self) -> Box<dyn EngineLoader> {
        Box::new(self.clone())
    }
}

impl EngineLoader for FakeEngines {
    fn load(&self) -> Result<Box<dyn KeywordEngine>> {
        let mut state = self.state.borrow_mut();
        state.load_calls += 1;
        match state.loads.pop_front() {
            Some(Load::Engine(script)) => Ok(Box::new(FakeEngine {
                script: script.into(),
                state: Rc::clone(&self.state),
            })),
            Some(Load::Fails) | None => Err(Error::WakeWord("invalid access key".to_string())),
        }
    }
}

struct FakeEngine {
    script: VecDeque<Detect>,
    state: Rc<RefCell<EngineState>>,
}

impl KeywordEngine for FakeEngine {
    fn sample_rate(&self) -> u32 {
        ENGINE_SAMPLE_RATE
    }

    fn frame_length(&self) -> usize {
        ENGINE_FRAME_LENGTH
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        assert_eq!(frame.len(), ENGINE_FRAME_LENGTH);
        self.state.borrow_mut().frames += 1;
        match self.script.pop_front().unwrap_or(Detect::Quiet) {
            Detect::Quiet => Ok(None),
            Detect::Keyword(index) => Ok(Some(index)),
            Detect::Fail => Err(Error::WakeWord("invalid argument".to_string())),
        }
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.state.borrow_mut().released += 1;
    }
}

#[derive(Debug, Default)]
pub struct TransportState {
    health: VecDeque<Result<Reply>>,
    posts: VecDeque<Result<Reply>>,
    pub paths: Vec<String>,
    pub uploads: Vec<FileUpload>,
}

/// Transport answering health probes and uploads from separate scripts
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Rc<RefCell<TransportState>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new(health: Vec<Result<Reply>>, posts: Vec<Result<Reply>>) -> Self {
        let transport = Self::default();
        {
            let mut state = transport.state.borrow_mut();
            state.health = health.into();
            state.posts = posts.into();
        }
        transport
    }

    #[must_use]
    pub fn state(&self) -> std::cell::Ref<'_, TransportState> {
        self.state.borrow()
    }

    #[must_use]
    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

impl Transport for FakeTransport {
    fn get(&self, path: &str) -> Result<Reply> {
        let mut state = self.state.borrow_mut();
        state.paths.push(path.to_string());
        state
            .health
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("connection refused".to_string())))
    }

    fn post_file(&self, path: &str, upload: FileUpload) -> Result<Reply> {
        let mut state = self.state.borrow_mut();
        state.paths.push(path.to_string());
        state.uploads.push(upload);
        state
            .posts
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("connection refused".to_string())))
    }
}

/// Reply with a status and body
pub fn reply(status: u16, body: &[u8]) -> Result<Reply> {
    Ok(Reply {
        status,
        body: body.to_vec(),
    })
}

/// Transport failure
pub fn unreachable() -> Result<Reply> {
    Err(Error::Transport("connection timed out".to_string()))
}

/// Announcer recording every message
#[derive(Clone, Default)]
pub struct RecordingAnnouncer {
    messages: Rc<RefCell<Vec<String>>>,
}

impl RecordingAnnouncer {
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// Sleeper recording every requested delay without sleeping
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

/// A canonical 16-bit PCM WAV buffer
#[must_use]
pub fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    voice_relay::voice::wav::encode(samples, sample_rate, channels).unwrap()
}
