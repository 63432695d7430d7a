//! Voice Relay - wake word voice client for a remote command service
//!
//! Listens for a wake word, records the spoken command that follows, uploads
//! it to a remote service and plays the spoken reply, forever.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Daemon                          │
//! │   health gate  │  spotter  │  command pipeline       │
//! └────────┬───────────────┬───────────────┬────────────┘
//!          │               │               │
//! ┌────────▼──────┐ ┌──────▼──────┐ ┌──────▼───────────┐
//! │ Wake word     │ │ Segmenter   │ │ Relay → Playback │
//! │ (Porcupine)   │ │ (energy VAD)│ │ (HTTP)   (WAV)   │
//! └────────┬──────┘ └──────┬──────┘ └──────┬───────────┘
//!          │               │               │
//! ┌────────▼───────────────▼───────────────▼────────────┐
//! │         AudioDevice (cpal)  │  Transport (reqwest)   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod debug_audio;
pub mod error;
pub mod logging;
pub mod relay;
pub mod retry;
pub mod voice;

pub use config::Config;
pub use daemon::{Backends, CommandPipeline, CycleOutcome, Daemon, TriggerOutcome};
pub use error::{Error, Result};
pub use relay::CommandRelay;
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
