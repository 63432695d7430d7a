//! TOML configuration file loading
//!
//! Supports `~/.config/voice-relay/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.
//! Individual values that are malformed are dropped rather than failing the
//! whole file, so a typo in one key only costs that key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigFile {
    /// Remote command service
    #[serde(default)]
    pub orchestrator: OrchestratorFileConfig,

    /// Wake word engine
    #[serde(default)]
    pub porcupine: PorcupineFileConfig,

    /// Retry delays and attempt caps
    #[serde(default)]
    pub retry: RetryFileConfig,

    /// Write captured commands and responses to disk
    #[serde(default)]
    pub save_debug_audio_files: Lenient<bool>,

    /// Directory for debug audio dumps
    #[serde(default)]
    pub debug_audio_dir: Lenient<String>,

    /// File name (or path) for the last captured command
    #[serde(default)]
    pub debug_command_file: Lenient<String>,

    /// File name (or path) for the last response
    #[serde(default)]
    pub debug_response_file: Lenient<String>,

    /// Log file path
    #[serde(default)]
    pub log_file: Lenient<String>,
}

/// Remote command service configuration
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorFileConfig {
    #[serde(default)]
    pub host: Lenient<String>,
    #[serde(default)]
    pub port: Lenient<u16>,
    #[serde(default)]
    pub process_audio_path: Lenient<String>,
    #[serde(default)]
    pub health_check_path: Lenient<String>,
    #[serde(default)]
    pub auth_token: Lenient<String>,
}

/// Porcupine engine configuration
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PorcupineFileConfig {
    #[serde(default)]
    pub access_key: Lenient<String>,
    #[serde(default)]
    pub model_path: Lenient<String>,
    #[serde(default)]
    pub keyword_path: Lenient<String>,
    #[serde(default)]
    pub sensitivity: Lenient<f32>,
}

/// Retry configuration
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryFileConfig {
    #[serde(default)]
    pub network_delay_seconds: Lenient<u64>,
    #[serde(default)]
    pub audio_init_delay_seconds: Lenient<u64>,
    #[serde(default)]
    pub max_post_retries: Lenient<u32>,
    #[serde(default)]
    pub loop_idle_delay_seconds: Lenient<u64>,
}

/// A scalar config value that reads as `None` when missing or malformed
///
/// Accepts native TOML scalars as well as their string spellings, so
/// `port = 9000` and `port = "9000"` are equivalent.
#[derive(Debug, Clone, PartialEq)]
pub struct Lenient<T>(pub Option<T>);

impl<T> Default for Lenient<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Lenient<T> {
    /// Unwrap into the inner option
    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

/// Scalars that can be read from a config value's text form
pub trait ConfigScalar: Sized {
    /// Parse from text, `None` if malformed
    fn from_text(text: &str) -> Option<Self>;
}

impl ConfigScalar for String {
    fn from_text(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

impl ConfigScalar for bool {
    fn from_text(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }
}

macro_rules! parsed_scalar {
    ($($ty:ty),*) => {
        $(impl ConfigScalar for $ty {
            fn from_text(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
        })*
    };
}

parsed_scalar!(u16, u32, u64, f32);

impl<'de, T: ConfigScalar> Deserialize<'de> for Lenient<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = toml::Value::deserialize(deserializer)?;
        let parsed = match value {
            toml::Value::String(s) => T::from_text(&s),
            toml::Value::Integer(i) => T::from_text(&i.to_string()),
            toml::Value::Float(f) => T::from_text(&f.to_string()),
            toml::Value::Boolean(b) => T::from_text(&b.to_string()),
            _ => None,
        };
        Ok(Self(parsed))
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML or a section has the wrong shape
pub fn parse_config_file(content: &str) -> Result<ClientConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `ClientConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file(path: Option<&Path>) -> ClientConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return ClientConfigFile::default();
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return ClientConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ClientConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ClientConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voice-relay/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-relay").join("config.toml"))
}
