//! Voice processing module
//!
//! Handles audio capture, wake word detection, command segmentation and
//! reply playback. Hardware sits behind the traits in [`device`] and
//! [`wake_word`] so everything above them runs without a microphone.

mod capture;
pub mod device;
mod playback;
mod porcupine;
mod segmenter;
mod tts;
pub mod wake_word;
pub mod wav;

pub use capture::{CpalCapture, CpalDevice};
pub use device::{AudioDevice, CaptureStream, PlaybackStream, StreamFormat};
pub use playback::{CpalPlayback, PLAYBACK_BLOCK_FRAMES, ResponsePlayer};
pub use porcupine::PorcupineLoader;
pub use segmenter::{
    SegmenterState, StopReason, Utterance, VadTracker, VoiceActivitySegmenter, frame_energy,
};
pub use tts::{Announcer, EspeakAnnouncer};
pub use wake_word::{EngineLoader, KeywordEngine, SpotterEvent, SpotterState, WakeWordSpotter};
