//! SMTP relay session over implicit TLS or STARTTLS
//!
//! The session stays open between alerts; the dispatcher decides when to
//! reconnect based on the errors mapped here.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_smtp::authentication::{Credentials, DEFAULT_ENCRYPTED_MECHANISMS};
use async_smtp::error::Error as SmtpError;
use async_smtp::{EmailAddress, Envelope, SendableEmail, SmtpClient, SmtpTransport};
use chrono::Utc;
use drift_tracker_core::{
    AlertMessage, AlertTransport, FailureReason, LoginStatus, TransportError, TransportResult,
};
use tokio::io::BufStream;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

type TlsSmtpTransport = SmtpTransport<BufStream<TlsStream<TcpStream>>>;

/// How the relay connection is encrypted. Plaintext is not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Tls,
    StartTls,
}

impl FromStr for Encryption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Tls" | "tls" => Ok(Self::Tls),
            "StartTls" | "starttls" => Ok(Self::StartTls),
            other => Err(format!("unsupported encryption mode {} (valid: Tls, StartTls)", other)),
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "Tls"),
            Self::StartTls => write!(f, "StartTls"),
        }
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    /// Empty means the relay is used without AUTH.
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct SmtpAlertTransport {
    settings: SmtpSettings,
    session: Option<TlsSmtpTransport>,
}

impl SmtpAlertTransport {
    pub fn new(settings: SmtpSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    async fn open(&self) -> TransportResult<TlsSmtpTransport> {
        let addr = (self.settings.host.as_str(), self.settings.port);
        debug!(
            host = %self.settings.host,
            port = self.settings.port,
            encryption = %self.settings.encryption,
            "Connecting to SMTP relay"
        );

        let tcp = within(self.settings.timeout, "tcp_connect", TcpStream::connect(addr))
            .await?
            .map_err(|e| connect_error(io_failure(&e)))?;

        match self.settings.encryption {
            Encryption::Tls => {
                let tls = self.handshake(tcp).await?;
                let client = SmtpClient::new();
                within(
                    self.settings.timeout,
                    "greeting",
                    SmtpTransport::new(client, BufStream::new(tls)),
                )
                .await?
                .map_err(|e| connect_error(smtp_failure(&e)))
            }
            Encryption::StartTls => {
                let client = SmtpClient::new();
                let plain = within(
                    self.settings.timeout,
                    "greeting",
                    SmtpTransport::new(client, BufStream::new(tcp)),
                )
                .await?
                .map_err(|e| connect_error(smtp_failure(&e)))?;

                let stream = within(self.settings.timeout, "starttls", plain.starttls())
                    .await?
                    .map_err(|e| connect_error(smtp_failure(&e)))?;

                let tls = self.handshake(stream.into_inner()).await?;
                let client = SmtpClient::new().without_greeting();
                within(
                    self.settings.timeout,
                    "ehlo",
                    SmtpTransport::new(client, BufStream::new(tls)),
                )
                .await?
                .map_err(|e| connect_error(smtp_failure(&e)))
            }
        }
    }

    async fn handshake(&self, tcp: TcpStream) -> TransportResult<TlsStream<TcpStream>> {
        let server_name = rustls_pki_types::ServerName::try_from(self.settings.host.clone())
            .map_err(|e| connect_error(FailureReason::new("server_name", e.to_string())))?;

        within(
            self.settings.timeout,
            "tls_handshake",
            rustls_connector().connect(server_name, tcp),
        )
        .await?
        .map_err(|e| connect_error(io_failure(&e)))
    }

    async fn login(&self, transport: &mut TlsSmtpTransport) -> TransportResult<LoginStatus> {
        if self.settings.username.is_empty() {
            return Ok(LoginStatus::NoAuth);
        }

        let credentials = Credentials::new(
            self.settings.username.clone(),
            self.settings.password.clone(),
        );
        let result = within(
            self.settings.timeout,
            "auth",
            transport.try_login(&credentials, DEFAULT_ENCRYPTED_MECHANISMS),
        )
        .await?;

        match result {
            Ok(()) => Ok(LoginStatus::Authenticated),
            Err(e) => {
                let reason = smtp_failure(&e);
                if reason.connection_broken {
                    return Err(TransportError::Connect(reason));
                }
                warn!(
                    status_code = reason.status_code,
                    reason = %reason.reason,
                    "SMTP AUTH rejected"
                );
                Ok(LoginStatus::NotLoggedIn)
            }
        }
    }
}

#[async_trait::async_trait]
impl AlertTransport for SmtpAlertTransport {
    async fn connect(&mut self) -> TransportResult<LoginStatus> {
        self.close().await;

        let mut transport = self.open().await?;
        let status = self.login(&mut transport).await?;
        // Kept even when AUTH was rejected so `close` can say QUIT.
        self.session = Some(transport);
        Ok(status)
    }

    async fn send(&mut self, message: &AlertMessage) -> TransportResult<()> {
        let timeout = self.settings.timeout;
        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::Send(
                FailureReason::new("no_session", "no open SMTP session").broken(),
            ));
        };

        let email = sendable(message)?;
        let sent = tokio::time::timeout(timeout, session.send(email)).await;
        let Ok(result) = sent else {
            self.session = None;
            return Err(TransportError::Send(
                FailureReason::new("timeout", "send timed out").broken(),
            ));
        };

        match result {
            Ok(response) => {
                debug!(code = %response.code, "Relay accepted message");
                Ok(())
            }
            Err(e) => {
                let reason = smtp_failure(&e);
                if reason.connection_broken {
                    self.session = None;
                }
                Err(TransportError::Send(reason))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            match tokio::time::timeout(self.settings.timeout, session.quit()).await {
                Ok(Ok(_)) => debug!("SMTP session closed"),
                Ok(Err(e)) => debug!("SMTP QUIT failed: {}", e),
                Err(_) => debug!("SMTP QUIT timed out"),
            }
        }
    }
}

fn sendable(message: &AlertMessage) -> TransportResult<SendableEmail> {
    let invalid = |e: String| TransportError::Send(FailureReason::new("invalid_address", e));

    let from = EmailAddress::new(message.sender_email.clone()).map_err(|e| invalid(e.to_string()))?;
    let to =
        EmailAddress::new(message.recipient_email.clone()).map_err(|e| invalid(e.to_string()))?;
    let envelope = Envelope::new(Some(from), vec![to]).map_err(|e| invalid(e.to_string()))?;

    Ok(SendableEmail::new(envelope, message.to_rfc5322(&Utc::now())))
}

fn rustls_connector() -> tokio_rustls::TlsConnector {
    let root_store = tokio_rustls::rustls::RootCertStore::from_iter(
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
    );
    let config = tokio_rustls::rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    tokio_rustls::TlsConnector::from(Arc::new(config))
}

/// Bounds a relay step by the configured timeout. An elapsed step leaves the
/// connection in an unknown state, so it counts as broken.
async fn within<F: Future>(timeout: Duration, step: &str, fut: F) -> TransportResult<F::Output> {
    tokio::time::timeout(timeout, fut).await.map_err(|_| {
        connect_error(FailureReason::new("timeout", format!("{} timed out", step)).broken())
    })
}

fn connect_error(reason: FailureReason) -> TransportError {
    TransportError::Connect(reason)
}

fn io_failure(e: &std::io::Error) -> FailureReason {
    FailureReason::new("io", e.to_string()).broken()
}

/// 421 means the relay is closing the channel.
fn smtp_failure(e: &SmtpError) -> FailureReason {
    match e {
        SmtpError::Transient(response) => {
            let status = status_code(&response.code.to_string());
            let reason = FailureReason::new("transient", response.message.join(" "));
            let reason = match status {
                Some(code) => reason.with_status(code),
                None => reason,
            };
            if status == Some(421) {
                reason.broken()
            } else {
                reason
            }
        }
        SmtpError::Permanent(response) => {
            let reason = FailureReason::new("permanent", response.message.join(" "));
            match status_code(&response.code.to_string()) {
                Some(code) => reason.with_status(code),
                None => reason,
            }
        }
        other => FailureReason::new("client", other.to_string()).broken(),
    }
}

fn status_code(code: &str) -> Option<u16> {
    code.trim().parse::<u16>().ok()
}
