//! Command relay to the remote service
//!
//! Wraps one captured utterance as a WAV payload, uploads it, and keeps the
//! body of the last successful reply for playback. Each call is a single
//! attempt; retrying belongs to the caller.

pub mod transport;

pub use transport::{AUTH_HEADER, FileUpload, HttpTransport, Reply, Transport};

use crate::config::OrchestratorConfig;
use crate::voice::wav;
use crate::{Error, Result};

/// Multipart field carrying the recording
pub const UPLOAD_FIELD: &str = "file";

/// File name announced for the recording
pub const UPLOAD_FILE_NAME: &str = "recording.wav";

/// MIME type announced for the recording
pub const UPLOAD_MIME: &str = "audio/wav";

/// Result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Service accepted the command; `bytes` is the reply length
    Success { bytes: usize },
    /// Request never produced a status
    TransportError(String),
    /// Service answered with a non-2xx status
    ServerError { status: u16, body: String },
}

/// One numbered upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAttempt {
    /// 1-based attempt number
    pub index: u32,
    pub outcome: RelayOutcome,
}

/// Uploads commands and probes reachability
pub struct CommandRelay {
    transport: Box<dyn Transport>,
    process_audio_path: String,
    health_check_path: String,
    last_response: Vec<u8>,
}

impl CommandRelay {
    /// Create a relay speaking to the configured paths through `transport`
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, config: &OrchestratorConfig) -> Self {
        Self {
            transport,
            process_audio_path: config.process_audio_path.clone(),
            health_check_path: config.health_check_path.clone(),
            last_response: Vec::new(),
        }
    }

    /// Probe the service; only status 200 counts as reachable
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or any other status
    pub fn check_health(&self) -> Result<()> {
        let reply = self.transport.get(&self.health_check_path)?;
        if reply.status == 200 {
            tracing::debug!("orchestrator health check passed");
            Ok(())
        } else {
            Err(Error::Status {
                status: reply.status,
                body: reply.body_text(),
            })
        }
    }

    /// Upload one command and keep the reply body on success
    ///
    /// Returns the reply length. On failure the previous reply is kept.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be built, the request fails or the
    /// service answers with a non-2xx status
    pub fn send(&mut self, samples: &[i16], sample_rate: u32, channels: u16) -> Result<usize> {
        let payload = wav::encode(samples, sample_rate, channels)?;
        tracing::info!(
            bytes = payload.len(),
            path = %self.process_audio_path,
            "sending command to orchestrator"
        );

        let reply = self.transport.post_file(
            &self.process_audio_path,
            FileUpload {
                field: UPLOAD_FIELD,
                file_name: UPLOAD_FILE_NAME,
                mime: UPLOAD_MIME,
                bytes: payload,
            },
        )?;

        if !reply.is_success() {
            let body = reply.body_text();
            tracing::error!(status = reply.status, %body, "orchestrator rejected command");
            return Err(Error::Status {
                status: reply.status,
                body,
            });
        }

        let bytes = reply.body.len();
        tracing::info!(status = reply.status, bytes, "received response from orchestrator");
        self.last_response = reply.body;
        Ok(bytes)
    }

    /// Run [`Self::send`] as attempt number `index`
    pub fn attempt(
        &mut self,
        index: u32,
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
    ) -> RelayAttempt {
        let outcome = match self.send(samples, sample_rate, channels) {
            Ok(bytes) => RelayOutcome::Success { bytes },
            Err(Error::Status { status, body }) => RelayOutcome::ServerError { status, body },
            Err(e) => RelayOutcome::TransportError(e.to_string()),
        };
        RelayAttempt { index, outcome }
    }

    /// Body of the last successful reply; empty before the first success
    #[must_use]
    pub fn last_response(&self) -> &[u8] {
        &self.last_response
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct Recorded {
        paths: Vec<String>,
        uploads: Vec<FileUpload>,
    }

    struct ScriptedTransport {
        replies: RefCell<VecDeque<Result<Reply>>>,
        recorded: Rc<RefCell<Recorded>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<Reply>>) -> (Self, Rc<RefCell<Recorded>>) {
            let recorded = Rc::new(RefCell::new(Recorded::default()));
            let transport = Self {
                replies: RefCell::new(replies.into()),
                recorded: Rc::clone(&recorded),
            };
            (transport, recorded)
        }

        fn next(&self) -> Result<Reply> {
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("script exhausted".to_string())))
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, path: &str) -> Result<Reply> {
            self.recorded.borrow_mut().paths.push(path.to_string());
            self.next()
        }

        fn post_file(&self, path: &str, upload: FileUpload) -> Result<Reply> {
            let mut recorded = self.recorded.borrow_mut();
            recorded.paths.push(path.to_string());
            recorded.uploads.push(upload);
            drop(recorded);
            self.next()
        }
    }

    fn reply(status: u16, body: &[u8]) -> Result<Reply> {
        Ok(Reply {
            status,
            body: body.to_vec(),
        })
    }

    fn relay(replies: Vec<Result<Reply>>) -> (CommandRelay, Rc<RefCell<Recorded>>) {
        let (transport, recorded) = ScriptedTransport::new(replies);
        let relay = CommandRelay::new(Box::new(transport), &OrchestratorConfig::default());
        (relay, recorded)
    }

    #[test]
    fn upload_is_a_wav_file_part() {
        let (mut relay, recorded) = relay(vec![reply(200, b"RIFF...")]);
        let bytes = relay.send(&[1, -1, 2, -2], 16_000, 1).unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(relay.last_response(), b"RIFF...");

        let recorded = recorded.borrow();
        assert_eq!(recorded.paths, ["/process-audio"]);
        let upload = &recorded.uploads[0];
        assert_eq!(upload.field, "file");
        assert_eq!(upload.file_name, "recording.wav");
        assert_eq!(upload.mime, "audio/wav");
        assert_eq!(upload.bytes.len(), 44 + 8);
        assert_eq!(&upload.bytes[0..4], b"RIFF");
    }

    #[test]
    fn any_2xx_is_success() {
        let (mut relay, _) = relay(vec![reply(204, b"")]);
        assert_eq!(relay.send(&[0; 4], 16_000, 1).unwrap(), 0);
    }

    #[test]
    fn failure_keeps_previous_response() {
        let (mut relay, _) = relay(vec![
            reply(200, b"first"),
            reply(500, b"boom"),
            Err(Error::Transport("connection refused".to_string())),
        ]);
        relay.send(&[0; 4], 16_000, 1).unwrap();

        let err = relay.send(&[0; 4], 16_000, 1).unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, ref body } if body == "boom"));
        assert!(relay.send(&[0; 4], 16_000, 1).is_err());
        assert_eq!(relay.last_response(), b"first");
    }

    #[test]
    fn attempts_classify_outcomes() {
        let (mut relay, _) = relay(vec![
            Err(Error::Transport("timed out".to_string())),
            reply(503, b"busy"),
            reply(200, b"ok"),
        ]);

        let first = relay.attempt(1, &[0; 4], 16_000, 1);
        assert!(matches!(first.outcome, RelayOutcome::TransportError(_)));

        let second = relay.attempt(2, &[0; 4], 16_000, 1);
        assert_eq!(
            second.outcome,
            RelayOutcome::ServerError {
                status: 503,
                body: "busy".to_string()
            }
        );

        let third = relay.attempt(3, &[0; 4], 16_000, 1);
        assert!(matches!(third.outcome, RelayOutcome::Success { .. }));
        assert_eq!(third.index, 3);
    }

    #[test]
    fn health_requires_exactly_200() {
        let (relay, recorded) = relay(vec![reply(200, b""), reply(204, b""), reply(503, b"")]);
        assert!(relay.check_health().is_ok());
        assert!(relay.check_health().is_err());
        assert!(relay.check_health().is_err());
        assert_eq!(recorded.borrow().paths, ["/health", "/health", "/health"]);
    }
}
