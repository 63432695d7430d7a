//! Configuration management for the voice relay client
//!
//! Values resolve as env > toml > default. Nothing here fails: a missing or
//! malformed value simply falls back to its documented default.

pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

use self::file::ClientConfigFile;

/// Sample rate for command capture (16kHz for speech)
pub const COMMAND_SAMPLE_RATE: u32 = 16_000;

/// Voice relay client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote command service
    pub orchestrator: OrchestratorConfig,

    /// Wake word engine
    pub porcupine: PorcupineConfig,

    /// Retry delays and attempt caps
    pub retry: RetryConfig,

    /// Voice activity segmentation
    pub vad: VadConfig,

    /// Wake word spotter backoffs
    pub spotter: SpotterConfig,

    /// Debug audio dumps
    pub debug_audio: DebugAudioConfig,

    /// Log file path
    pub log_file: PathBuf,
}

/// Remote command service configuration
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Host name or address; may carry an explicit `http(s)://` scheme
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Path receiving the multipart audio upload
    pub process_audio_path: String,

    /// Path answering the reachability probe
    pub health_check_path: String,

    /// Static credential sent as the `X-Auth` header
    pub auth_token: String,
}

impl OrchestratorConfig {
    /// Base URL of the remote service
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            process_audio_path: "/process-audio".to_string(),
            health_check_path: "/health".to_string(),
            auth_token: String::new(),
        }
    }
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("process_audio_path", &self.process_audio_path)
            .field("health_check_path", &self.health_check_path)
            .field("auth_token", &redact(&self.auth_token))
            .finish()
    }
}

/// Porcupine engine configuration
#[derive(Clone)]
pub struct PorcupineConfig {
    /// Picovoice access key
    pub access_key: String,

    /// Engine parameter file
    pub model_path: PathBuf,

    /// Keyword file
    pub keyword_path: PathBuf,

    /// Detection sensitivity in `0.0..=1.0`
    pub sensitivity: f32,
}

impl Default for PorcupineConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            model_path: PathBuf::from("models/porcupine_params.pv"),
            keyword_path: PathBuf::from("keywords/wake_word.ppn"),
            sensitivity: 0.5,
        }
    }
}

impl fmt::Debug for PorcupineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PorcupineConfig")
            .field("access_key", &redact(&self.access_key))
            .field("model_path", &self.model_path)
            .field("keyword_path", &self.keyword_path)
            .field("sensitivity", &self.sensitivity)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

/// Retry delays and attempt caps for the session loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay between health checks and between upload attempts
    pub network_delay: Duration,

    /// Delay before retrying wake word / audio initialization
    pub audio_init_delay: Duration,

    /// Upload attempts per command
    pub max_post_retries: u32,

    /// Pause between session cycles
    pub loop_idle_delay: Duration,

    /// Pause after an unexpected failure escapes a cycle
    pub critical_cooldown: Duration,
}

impl RetryConfig {
    /// Policy used for command uploads
    #[must_use]
    pub const fn upload_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(self.network_delay, self.max_post_retries)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_delay: Duration::from_secs(3),
            audio_init_delay: Duration::from_secs(5),
            max_post_retries: 5,
            loop_idle_delay: Duration::from_secs(1),
            critical_cooldown: Duration::from_secs(5),
        }
    }
}

/// Energy-based voice activity segmentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// Capture sample rate
    pub sample_rate: u32,

    /// Capture channel count
    pub channels: u16,

    /// Duration of one frame
    pub frame_duration: Duration,

    /// Amplitude above which speech starts (compared squared)
    pub start_threshold: f32,

    /// Amplitude below which a frame counts as silence (compared squared)
    pub stop_threshold: f32,

    /// Consecutive silent frames tolerated before capture stops
    pub max_silence_frames: u32,

    /// Hard cap on utterance length in samples
    pub max_samples: usize,
}

impl VadConfig {
    /// Interleaved samples per frame
    #[must_use]
    pub fn frame_len(&self) -> usize {
        let per_channel = u128::from(self.sample_rate) * self.frame_duration.as_millis() / 1000;
        usize::try_from(per_channel).unwrap_or(usize::MAX) * usize::from(self.channels)
    }

    /// Energy that arms the segmenter
    #[must_use]
    pub fn start_energy(&self) -> f64 {
        f64::from(self.start_threshold).powi(2)
    }

    /// Energy under which a frame counts as silence
    #[must_use]
    pub fn stop_energy(&self) -> f64 {
        f64::from(self.stop_threshold).powi(2)
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: COMMAND_SAMPLE_RATE,
            channels: 1,
            frame_duration: Duration::from_millis(20),
            start_threshold: 500.0,
            stop_threshold: 300.0,
            max_silence_frames: 30,
            max_samples: 60 * COMMAND_SAMPLE_RATE as usize,
        }
    }
}

/// Wake word spotter recovery timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotterConfig {
    /// Full engine + stream re-acquisition
    pub reacquire: RetryPolicy,

    /// Wait after a capture stream could not be reopened or was abandoned
    pub stream_recovery_delay: Duration,

    /// Consecutive failed reads before the stream is abandoned
    pub read_failure_limit: u32,

    /// Wait after the engine rejected a frame
    pub engine_error_delay: Duration,

    /// Capture channel count
    pub channels: u16,
}

impl Default for SpotterConfig {
    fn default() -> Self {
        Self {
            reacquire: RetryPolicy::unbounded(Duration::from_secs(5)),
            stream_recovery_delay: Duration::from_secs(3),
            read_failure_limit: 3,
            engine_error_delay: Duration::from_secs(2),
            channels: 1,
        }
    }
}

/// Debug audio dump configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugAudioConfig {
    /// Whether dumps are written
    pub enabled: bool,

    /// Directory created at start-up
    pub dir: PathBuf,

    /// Last captured command, as WAV
    pub command_file: PathBuf,

    /// Last response, raw bytes
    pub response_file: PathBuf,
}

impl Default for DebugAudioConfig {
    fn default() -> Self {
        let dir = PathBuf::from("audio");
        Self {
            enabled: false,
            command_file: dir.join("output.wav"),
            response_file: dir.join("response.wav"),
            dir,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            porcupine: PorcupineConfig::default(),
            retry: RetryConfig::default(),
            vad: VadConfig::default(),
            spotter: SpotterConfig::default(),
            debug_audio: DebugAudioConfig::default(),
            log_file: PathBuf::from("client.log"),
        }
    }
}

impl Config {
    /// Load configuration from the TOML file at `path` (or the standard path)
    /// overlaid with environment variables
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let fc = file::load_config_file(path);
        Self::resolve(fc, &|key| std::env::var(key).ok())
    }

    /// Resolve a parsed config file against an environment lookup
    #[must_use]
    pub fn resolve(fc: ClientConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let orchestrator = OrchestratorConfig {
            host: env("VOICE_RELAY_HOST")
                .or(fc.orchestrator.host.into_inner())
                .unwrap_or(defaults.orchestrator.host),
            port: env("VOICE_RELAY_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.orchestrator.port.into_inner())
                .unwrap_or(defaults.orchestrator.port),
            process_audio_path: fc
                .orchestrator
                .process_audio_path
                .into_inner()
                .map_or(defaults.orchestrator.process_audio_path, normalize_path),
            health_check_path: fc
                .orchestrator
                .health_check_path
                .into_inner()
                .map_or(defaults.orchestrator.health_check_path, normalize_path),
            auth_token: env("VOICE_RELAY_AUTH_TOKEN")
                .or(fc.orchestrator.auth_token.into_inner())
                .unwrap_or(defaults.orchestrator.auth_token),
        };

        let porcupine = PorcupineConfig {
            access_key: env("PORCUPINE_ACCESS_KEY")
                .or(fc.porcupine.access_key.into_inner())
                .unwrap_or(defaults.porcupine.access_key),
            model_path: fc
                .porcupine
                .model_path
                .into_inner()
                .map_or(defaults.porcupine.model_path, PathBuf::from),
            keyword_path: fc
                .porcupine
                .keyword_path
                .into_inner()
                .map_or(defaults.porcupine.keyword_path, PathBuf::from),
            sensitivity: fc
                .porcupine
                .sensitivity
                .into_inner()
                .filter(|s| s.is_finite())
                .map_or(defaults.porcupine.sensitivity, |s| s.clamp(0.0, 1.0)),
        };

        let retry = RetryConfig {
            network_delay: fc
                .retry
                .network_delay_seconds
                .into_inner()
                .map_or(defaults.retry.network_delay, Duration::from_secs),
            audio_init_delay: fc
                .retry
                .audio_init_delay_seconds
                .into_inner()
                .map_or(defaults.retry.audio_init_delay, Duration::from_secs),
            max_post_retries: fc
                .retry
                .max_post_retries
                .into_inner()
                .unwrap_or(defaults.retry.max_post_retries),
            loop_idle_delay: fc
                .retry
                .loop_idle_delay_seconds
                .into_inner()
                .map_or(defaults.retry.loop_idle_delay, Duration::from_secs),
            critical_cooldown: defaults.retry.critical_cooldown,
        };

        let spotter = SpotterConfig {
            reacquire: RetryPolicy::unbounded(retry.audio_init_delay),
            ..defaults.spotter
        };

        let dir = fc
            .debug_audio_dir
            .into_inner()
            .map_or(defaults.debug_audio.dir, PathBuf::from);
        let debug_audio = DebugAudioConfig {
            enabled: fc.save_debug_audio_files.into_inner().unwrap_or(false),
            command_file: dir.join(
                fc.debug_command_file
                    .into_inner()
                    .unwrap_or_else(|| "output.wav".to_string()),
            ),
            response_file: dir.join(
                fc.debug_response_file
                    .into_inner()
                    .unwrap_or_else(|| "response.wav".to_string()),
            ),
            dir,
        };

        let log_file = env("VOICE_RELAY_LOG_FILE")
            .or(fc.log_file.into_inner())
            .map_or(defaults.log_file, PathBuf::from);

        Self {
            orchestrator,
            porcupine,
            retry,
            vad: defaults.vad,
            spotter,
            debug_audio,
            log_file,
        }
    }
}

/// Ensure a request path starts with `/`
fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}
