//! Spoken failure announcements
//!
//! Announcements are best-effort: a missing or failing synthesizer is logged
//! and otherwise ignored.

use std::process::{Command, Stdio};

/// Speaks short status messages to the user
pub trait Announcer {
    /// Speak `message`, blocking until done; never fails
    fn announce(&self, message: &str);
}

/// Announcer backed by the `espeak-ng` command
#[derive(Debug, Clone)]
pub struct EspeakAnnouncer {
    program: String,
    voice: String,
    words_per_minute: u32,
}

impl Default for EspeakAnnouncer {
    fn default() -> Self {
        Self {
            program: "espeak-ng".to_string(),
            voice: "en-US+f3".to_string(),
            words_per_minute: 150,
        }
    }
}

impl EspeakAnnouncer {
    /// Create an announcer with the default voice
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different synthesizer binary with the same arguments
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, message: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-v")
            .arg(&self.voice)
            .arg("-s")
            .arg(self.words_per_minute.to_string())
            .arg(message)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl Announcer for EspeakAnnouncer {
    fn announce(&self, message: &str) {
        tracing::info!(message, "speaking announcement");
        match self.command(message).status() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                tracing::error!(%status, program = %self.program, "announcement command failed");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    program = %self.program,
                    "failed to run announcement command, is it installed?"
                );
            }
        }
    }
}
