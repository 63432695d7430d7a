//! Process-wide log setup
//!
//! Logs go to stderr and, when the log file can be opened, are appended to it
//! as well without ANSI colouring.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::{Error, Result};

/// Filter directive for a `-v` count
#[must_use]
pub const fn filter_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info,voice_relay=info",
        1 => "info,voice_relay=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Open `path` for appending, creating parent directories
///
/// # Errors
///
/// Returns error if the directories or the file cannot be created
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns error if a global subscriber is already installed
pub fn init(verbose: u8, log_file: &Path) -> Result<()> {
    let (file, open_error) = match open_log_file(log_file) {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter_for_verbosity(verbose)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;

    match open_error {
        None => tracing::info!(path = %log_file.display(), "log started"),
        Some(e) => tracing::warn!(
            error = %e,
            path = %log_file.display(),
            "could not open log file, logging to stderr only"
        ),
    }
    Ok(())
}
