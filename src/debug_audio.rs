//! Optional on-disk copies of the last command and response

use std::fs;

use crate::Result;
use crate::config::DebugAudioConfig;
use crate::voice::Utterance;
use crate::voice::wav;

/// Writes debug copies of captured commands and received replies
#[derive(Debug, Clone)]
pub struct DebugAudio {
    config: DebugAudioConfig,
}

impl DebugAudio {
    /// Create a writer for `config`
    #[must_use]
    pub const fn new(config: DebugAudioConfig) -> Self {
        Self { config }
    }

    /// Create the dump directory
    ///
    /// Does nothing when dumps are disabled.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn prepare(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.config.dir)?;
        tracing::info!(dir = %self.config.dir.display(), "debug audio directory ready");
        Ok(())
    }

    /// Save a captured command as WAV; failures are logged only
    pub fn save_command(&self, utterance: &Utterance) {
        if !self.config.enabled {
            return;
        }
        let written = wav::encode(utterance.samples(), utterance.sample_rate(), utterance.channels())
            .and_then(|bytes| fs::write(&self.config.command_file, bytes).map_err(Into::into));
        match written {
            Ok(()) => {
                tracing::debug!(path = %self.config.command_file.display(), "saved command audio");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %self.config.command_file.display(),
                    "failed to save command audio"
                );
            }
        }
    }

    /// Save a reply body verbatim; empty bodies and failures are skipped
    pub fn save_response(&self, bytes: &[u8]) {
        if !self.config.enabled || bytes.is_empty() {
            return;
        }
        match fs::write(&self.config.response_file, bytes) {
            Ok(()) => {
                tracing::debug!(path = %self.config.response_file.display(), "saved response audio");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    path = %self.config.response_file.display(),
                    "failed to save response audio"
                );
            }
        }
    }
}
