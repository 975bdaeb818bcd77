use std::fmt;

use super::AlertMessage;

pub type TransportResult<T> = Result<T, TransportError>;

/// How far login got once the relay accepted the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// Logged in with credentials.
    Authenticated,
    /// Logged in without AUTH. Sending may still work.
    NoAuth,
    /// The relay never confirmed the login.
    NotLoggedIn,
}

/// Structured reason reported by the mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    /// SMTP reply code, when the relay answered.
    pub status_code: Option<u16>,
    /// Short protocol-level error kind such as `permanent` or `io`.
    pub error_code: String,
    pub reason: String,
    /// The underlying connection is unusable and must be reopened.
    pub connection_broken: bool,
}

impl FailureReason {
    pub fn new(error_code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status_code: None,
            error_code: error_code.into(),
            reason: reason.into(),
            connection_broken: false,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn broken(mut self) -> Self {
        self.connection_broken = true;
        self
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "Status Code: {}, ", status)?,
            None => write!(f, "Status Code: -, ")?,
        }
        write!(f, "Error Code: {}, Reason: {}", self.error_code, self.reason)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection error, {0}")]
    Connect(FailureReason),

    #[error("Not yet logged in")]
    NotLoggedIn,

    #[error("Send error, {0}")]
    Send(FailureReason),
}

impl TransportError {
    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Connect(reason) | Self::Send(reason) => Some(reason),
            Self::NotLoggedIn => None,
        }
    }

    /// Send failures only break the session when the transport says so.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Self::Connect(_) | Self::NotLoggedIn => true,
            Self::Send(reason) => reason.connection_broken,
        }
    }
}

/// A stateful session to a mail relay.
///
/// Implementations keep the connection open between calls. `send` is only
/// called after a `connect` that did not fail, and `connect` is called again
/// only after a failure the transport marked as broken.
#[async_trait::async_trait]
pub trait AlertTransport: Send {
    async fn connect(&mut self) -> TransportResult<LoginStatus>;

    async fn send(&mut self, message: &AlertMessage) -> TransportResult<()>;

    /// Politely ends the session, if one is open.
    async fn close(&mut self);
}
