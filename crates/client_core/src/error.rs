use shared::error::ApiErrorBody;
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Why a request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Connect,
    Timeout,
    Other,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// An operation needing a bearer token ran without a session.
    #[error("please log in to continue")]
    AuthRequired,
    #[error("{message}")]
    Request {
        status: Option<u16>,
        message: String,
    },
    /// The request never got a response.
    #[error("{message}")]
    Transport {
        kind: TransportFailure,
        message: String,
    },
    #[error("could not read server response: {0}")]
    Decode(String),
    #[error("local storage failure: {0}")]
    Storage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Builds the display message for a non-success response body.
    ///
    /// Uses the JSON `detail` field when present, otherwise a message carrying
    /// the raw status code.
    pub fn from_error_body(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message())
            .unwrap_or_else(|| format!("HTTP error! status: {status}"));
        Self::Request {
            status: Some(status),
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }

    pub fn transport_failure(&self) -> Option<TransportFailure> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Transport and decode failures propagate the same way as request failures.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::Request { .. } | Self::Transport { .. } | Self::Decode(_)
        )
    }

    pub fn requires_login(&self) -> bool {
        matches!(self, Self::AuthRequired) || matches!(self.status(), Some(401 | 403))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Request {
                status: Some(status.as_u16()),
                message: format!("request failed: {err}"),
            };
        }
        let (kind, message) = if err.is_connect() {
            (TransportFailure::Connect, format!("server unreachable: {err}"))
        } else if err.is_timeout() {
            (TransportFailure::Timeout, format!("request timed out: {err}"))
        } else {
            (TransportFailure::Other, format!("request failed: {err}"))
        };
        Self::Transport { kind, message }
    }
}
