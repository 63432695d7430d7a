//! Porcupine keyword engine
//!
//! Compiled in with the `porcupine` feature. Without it the loader still
//! exists but every load fails, which leaves the spotter degraded and
//! retrying rather than aborting the process.

use crate::config::PorcupineConfig;
use crate::{Error, Result};

use super::wake_word::{EngineLoader, KeywordEngine};

/// Loads Porcupine engines from the configured access key and artifacts
#[derive(Debug, Clone)]
pub struct PorcupineLoader {
    #[cfg_attr(not(feature = "porcupine"), allow(dead_code))]
    config: PorcupineConfig,
}

impl PorcupineLoader {
    /// Create a loader for `config`
    #[must_use]
    pub const fn new(config: PorcupineConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "porcupine")]
impl EngineLoader for PorcupineLoader {
    fn load(&self) -> Result<Box<dyn KeywordEngine>> {
        tracing::info!(
            model = %self.config.model_path.display(),
            keyword = %self.config.keyword_path.display(),
            sensitivity = self.config.sensitivity,
            "initializing porcupine engine"
        );

        let engine = porcupine::PorcupineBuilder::new_with_keyword_paths(
            self.config.access_key.clone(),
            &[self.config.keyword_path.clone()],
        )
        .model_path(self.config.model_path.clone())
        .sensitivities(&[self.config.sensitivity])
        .init()
        .map_err(|e| Error::WakeWord(format!("failed to initialize porcupine: {e}")))?;

        tracing::info!(
            sample_rate = engine.sample_rate(),
            frame_length = engine.frame_length(),
            "porcupine engine initialized"
        );
        Ok(Box::new(PorcupineEngine(engine)))
    }
}

#[cfg(not(feature = "porcupine"))]
impl EngineLoader for PorcupineLoader {
    fn load(&self) -> Result<Box<dyn KeywordEngine>> {
        Err(Error::WakeWord(
            "built without the `porcupine` feature".to_string(),
        ))
    }
}

#[cfg(feature = "porcupine")]
struct PorcupineEngine(porcupine::Porcupine);

#[cfg(feature = "porcupine")]
impl KeywordEngine for PorcupineEngine {
    fn sample_rate(&self) -> u32 {
        self.0.sample_rate()
    }

    fn frame_length(&self) -> usize {
        self.0.frame_length() as usize
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        let index = self
            .0
            .process(frame)
            .map_err(|e| Error::WakeWord(format!("error processing audio frame: {e}")))?;
        Ok(usize::try_from(index).ok())
    }
}
