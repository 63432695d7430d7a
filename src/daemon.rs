//! Daemon - the voice session loop
//!
//! Gates on the remote service being reachable, listens for the wake word,
//! and for each trigger records a command, relays it with bounded retries and
//! plays the reply. Every failure is logged and announced; the loop itself
//! never ends.

use std::rc::Rc;

use crate::config::{Config, RetryConfig};
use crate::debug_audio::DebugAudio;
use crate::relay::{CommandRelay, HttpTransport, RelayOutcome, Transport};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::voice::{
    Announcer, AudioDevice, CpalDevice, EngineLoader, EspeakAnnouncer, PorcupineLoader,
    ResponsePlayer, Utterance, VoiceActivitySegmenter, WakeWordSpotter,
};
use crate::{Error, Result};

const SAY_SERVICE_DOWN: &str = "Orchestrator not available. Retrying network.";
const SAY_SPOTTER_DOWN: &str = "Wake word system failed. Retrying.";
const SAY_SPOTTER_STOPPED: &str = "Wake word detection loop stopped. Attempting restart.";
const SAY_CRITICAL: &str = "An unexpected critical error occurred. Restarting systems.";
const SAY_NO_COMMAND: &str = "Could not record your command.";
const SAY_UPLOAD_RETRY: &str = "Failed to send command. Retrying.";
const SAY_UPLOAD_GAVE_UP: &str = "Failed to send command after multiple tries.";
const SAY_PLAYBACK_FAILED: &str = "Failed to play response.";
const SAY_NO_RESPONSE: &str = "No audio response received.";
const SAY_DEBUG_DIR_FAILED: &str = "Failed to create audio directory. Check permissions.";

/// What handling one wake word trigger led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Nothing usable was recorded
    NoCommand,
    /// Every upload attempt failed
    UploadFailed { attempts: u32 },
    /// Upload succeeded but the reply was empty
    NoResponse,
    /// Reply played to completion
    Played,
    /// Reply could not be decoded or played
    PlaybackFailed,
}

/// How one session cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The spotter could not be brought up
    SpotterNotReady,
    /// The spotter gave up listening
    SpotterStopped,
}

/// External collaborators the daemon drives
pub struct Backends {
    pub device: Rc<dyn AudioDevice>,
    pub engines: Box<dyn EngineLoader>,
    pub transport: Box<dyn Transport>,
    pub announcer: Rc<dyn Announcer>,
    pub sleeper: Rc<dyn Sleeper>,
}

impl Backends {
    /// Production backends: cpal audio, Porcupine, reqwest, espeak-ng
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn system(config: &Config) -> Result<Self> {
        Ok(Self {
            device: Rc::new(CpalDevice::new()),
            engines: Box::new(PorcupineLoader::new(config.porcupine.clone())),
            transport: Box::new(HttpTransport::new(&config.orchestrator)?),
            announcer: Rc::new(EspeakAnnouncer::new()),
            sleeper: Rc::new(ThreadSleeper),
        })
    }
}

/// Record, relay and play back one command per trigger
pub struct CommandPipeline {
    segmenter: VoiceActivitySegmenter,
    relay: CommandRelay,
    player: ResponsePlayer,
    debug_audio: DebugAudio,
    upload: RetryPolicy,
    announcer: Rc<dyn Announcer>,
    sleeper: Rc<dyn Sleeper>,
}

impl CommandPipeline {
    /// Build a pipeline over the given collaborators
    #[must_use]
    pub fn new(
        config: &Config,
        device: &Rc<dyn AudioDevice>,
        transport: Box<dyn Transport>,
        announcer: Rc<dyn Announcer>,
        sleeper: Rc<dyn Sleeper>,
    ) -> Self {
        Self {
            segmenter: VoiceActivitySegmenter::new(Rc::clone(device), config.vad),
            relay: CommandRelay::new(transport, &config.orchestrator),
            player: ResponsePlayer::new(Rc::clone(device)),
            debug_audio: DebugAudio::new(config.debug_audio.clone()),
            upload: config.retry.upload_policy(),
            announcer,
            sleeper,
        }
    }

    /// Handle one wake word trigger from recording to playback
    pub fn handle_trigger(&mut self) -> TriggerOutcome {
        tracing::info!("wake word detected, recording command");

        let utterance = match self.segmenter.capture_utterance() {
            Ok(utterance) => utterance,
            Err(e) => {
                tracing::error!(error = %e, "no command recorded, skipping");
                self.announcer.announce(SAY_NO_COMMAND);
                return TriggerOutcome::NoCommand;
            }
        };
        self.debug_audio.save_command(&utterance);

        if let Err(attempts) = self.relay_with_retry(&utterance) {
            tracing::error!(attempts, "maximum upload attempts reached, command not sent");
            self.announcer.announce(SAY_UPLOAD_GAVE_UP);
            return TriggerOutcome::UploadFailed { attempts };
        }

        let response = self.relay.last_response();
        if response.is_empty() {
            tracing::error!("no response audio received from orchestrator");
            self.announcer.announce(SAY_NO_RESPONSE);
            return TriggerOutcome::NoResponse;
        }
        self.debug_audio.save_response(response);

        let outcome = match self.player.play(response) {
            Ok(()) => {
                tracing::info!("response played");
                TriggerOutcome::Played
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to play response");
                self.announcer.announce(SAY_PLAYBACK_FAILED);
                TriggerOutcome::PlaybackFailed
            }
        };
        tracing::info!("command sequence complete, returning to wake word detection");
        outcome
    }

    /// Upload until one attempt succeeds or the policy is exhausted
    ///
    /// Returns the number of attempts made on failure.
    fn relay_with_retry(&mut self, utterance: &Utterance) -> std::result::Result<u32, u32> {
        let mut attempts = 0;
        while self.upload.allows(attempts) {
            attempts += 1;
            let attempt = self.relay.attempt(
                attempts,
                utterance.samples(),
                utterance.sample_rate(),
                utterance.channels(),
            );
            match attempt.outcome {
                RelayOutcome::Success { bytes } => {
                    tracing::info!(attempt = attempt.index, bytes, "command sent");
                    return Ok(attempts);
                }
                RelayOutcome::TransportError(error) => {
                    tracing::error!(attempt = attempt.index, %error, "failed to send command");
                }
                RelayOutcome::ServerError { status, body } => {
                    tracing::error!(attempt = attempt.index, status, %body, "failed to send command");
                }
            }
            self.announcer.announce(SAY_UPLOAD_RETRY);
            tracing::info!(
                delay_ms = self.upload.delay.as_millis(),
                "waiting before next upload attempt"
            );
            self.sleeper.sleep(self.upload.delay);
        }
        Err(attempts)
    }
}

/// The voice relay daemon
pub struct Daemon {
    spotter: WakeWordSpotter,
    pipeline: CommandPipeline,
    retry: RetryConfig,
    announcer: Rc<dyn Announcer>,
    sleeper: Rc<dyn Sleeper>,
}

impl Daemon {
    /// Create a daemon; the wake word engine is acquired immediately
    #[must_use]
    pub fn new(config: &Config, backends: Backends) -> Self {
        let Backends {
            device,
            engines,
            transport,
            announcer,
            sleeper,
        } = backends;

        let spotter = WakeWordSpotter::new(
            engines,
            Rc::clone(&device),
            Rc::clone(&sleeper),
            config.spotter,
        );
        let pipeline = CommandPipeline::new(
            config,
            &device,
            transport,
            Rc::clone(&announcer),
            Rc::clone(&sleeper),
        );

        Self {
            spotter,
            pipeline,
            retry: config.retry,
            announcer,
            sleeper,
        }
    }

    /// Run forever
    pub fn run(&mut self) -> ! {
        tracing::info!("voice relay starting");
        self.prepare_debug_audio();

        loop {
            match self.run_cycle() {
                Ok(outcome) => tracing::debug!(?outcome, "cycle ended"),
                Err(e) => {
                    tracing::error!(error = %e, "unhandled error in session cycle");
                    self.announcer.announce(SAY_CRITICAL);
                    self.pause(self.retry.critical_cooldown);
                }
            }
            self.pause(self.retry.loop_idle_delay);
        }
    }

    /// Create the debug audio directory if dumps are enabled
    pub fn prepare_debug_audio(&self) {
        if let Err(e) = self.pipeline.debug_audio.prepare() {
            tracing::error!(error = %e, "failed to create debug audio directory");
            self.announcer.announce(SAY_DEBUG_DIR_FAILED);
        }
    }

    /// One session cycle: health gate, spotter check, listen
    ///
    /// # Errors
    ///
    /// Returns error if listening fails for a reason other than the spotter
    /// giving up
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        tracing::info!("new session cycle");
        self.wait_for_service();

        if !self.spotter.ensure_ready() {
            tracing::error!("wake word spotter not ready, retrying setup");
            self.announcer.announce(SAY_SPOTTER_DOWN);
            self.pause(self.retry.audio_init_delay);
            return Ok(CycleOutcome::SpotterNotReady);
        }

        let pipeline = &mut self.pipeline;
        let stopped = self.spotter.run(|| {
            pipeline.handle_trigger();
            Ok(())
        });

        match stopped {
            Ok(never) => match never {},
            Err(Error::WakeWord(reason)) => {
                tracing::error!(%reason, "wake word detection loop stopped");
                self.announcer.announce(SAY_SPOTTER_STOPPED);
                Ok(CycleOutcome::SpotterStopped)
            }
            Err(e) => Err(e),
        }
    }

    /// Block until the remote service answers its health check
    ///
    /// Returns the number of failed checks.
    pub fn wait_for_service(&self) -> u32 {
        let mut failures = 0;
        loop {
            tracing::info!("checking orchestrator connectivity");
            match self.pipeline.relay.check_health() {
                Ok(()) => {
                    tracing::info!(failures, "orchestrator is reachable");
                    return failures;
                }
                Err(e) => {
                    failures += 1;
                    tracing::error!(error = %e, failures, "orchestrator not reachable");
                    self.announcer.announce(SAY_SERVICE_DOWN);
                    self.pause(self.retry.network_delay);
                }
            }
        }
    }

    /// Handle one trigger outside the listen loop
    pub fn handle_trigger(&mut self) -> TriggerOutcome {
        self.pipeline.handle_trigger()
    }

    /// Wake word spotter
    #[must_use]
    pub const fn spotter(&self) -> &WakeWordSpotter {
        &self.spotter
    }

    fn pause(&self, delay: std::time::Duration) {
        tracing::debug!(delay_ms = delay.as_millis(), "sleeping");
        self.sleeper.sleep(delay);
    }
}
