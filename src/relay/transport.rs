//! HTTP transport to the remote command service

use std::time::Duration;

use reqwest::blocking::{Client, multipart};

use crate::config::OrchestratorConfig;
use crate::{Error, Result};

/// Header carrying the static credential
pub const AUTH_HEADER: &str = "X-Auth";

/// Connect timeout for uploads
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read/write timeout for uploads
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect and read timeout for the reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    /// Whether the status is in the 2xx range
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Body decoded lossily, for diagnostics
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A file sent as a single multipart form part
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub field: &'static str,
    pub file_name: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Blocking request primitive; the credential is attached by the implementation
pub trait Transport {
    /// `GET path`
    ///
    /// # Errors
    ///
    /// Returns error on transport failure; any status is a successful reply
    fn get(&self, path: &str) -> Result<Reply>;

    /// `POST path` with a multipart body holding `upload`
    ///
    /// # Errors
    ///
    /// Returns error on transport failure; any status is a successful reply
    fn post_file(&self, path: &str, upload: FileUpload) -> Result<Reply>;
}

/// Transport backed by `reqwest`'s blocking client
pub struct HttpTransport {
    client: Client,
    probe: Client,
    base_url: String,
    auth_token: String,
}

impl HttpTransport {
    /// Create a transport for the configured service
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let probe = Client::builder()
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            probe,
            base_url: config.base_url(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn into_reply(response: reqwest::blocking::Response) -> Result<Reply> {
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .map_err(|e| Error::Transport(format!("failed to read response body: {e}")))?;
    Ok(Reply {
        status,
        body: body.to_vec(),
    })
}

impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<Reply> {
        let response = self
            .probe
            .get(self.url(path))
            .header(AUTH_HEADER, &self.auth_token)
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;
        into_reply(response)
    }

    fn post_file(&self, path: &str, upload: FileUpload) -> Result<Reply> {
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(upload.mime)
            .map_err(|e| Error::Transport(e.to_string()))?;
        let form = multipart::Form::new().part(upload.field, part);

        let response = self
            .client
            .post(self.url(path))
            .header(AUTH_HEADER, &self.auth_token)
            .multipart(form)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "upload request failed");
                Error::Transport(e.to_string())
            })?;
        into_reply(response)
    }
}
