use tracing::{error, info, warn};

use super::{AlertMessage, AlertSession, AlertTransport, LoginStatus, SessionState, TransportError};

/// Health side channel sampled after every dispatch attempt.
pub trait ResourceMonitor: Send {
    fn sample(&mut self);
}

/// Monitor that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ResourceMonitor for NoopMonitor {
    fn sample(&mut self) {}
}

/// Result of one dispatch attempt.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The relay accepted the message. `reconnected` is set when a reused
    /// session had gone stale and was reopened first.
    Sent { reconnected: bool },
    /// No session could be opened; nothing was sent.
    ConnectFailed(TransportError),
    /// A session was open but the relay refused the message.
    SendFailed(TransportError),
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Owns the mail transport and the session it keeps open across cycles.
pub struct AlertDispatcher {
    transport: Box<dyn AlertTransport>,
    session: AlertSession,
    monitor: Box<dyn ResourceMonitor>,
}

impl AlertDispatcher {
    pub fn new(transport: Box<dyn AlertTransport>) -> Self {
        Self {
            transport,
            session: AlertSession::new(),
            monitor: Box::new(NoopMonitor),
        }
    }

    pub fn with_monitor(mut self, monitor: Box<dyn ResourceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn session(&self) -> &AlertSession {
        &self.session
    }

    /// Sends one alert, reusing the open session when there is one.
    ///
    /// A reused session that turns out to be broken is reopened once and the
    /// message resent once. There is no other retry; a failed dispatch waits
    /// for the next cycle.
    pub async fn dispatch(&mut self, message: &AlertMessage) -> DispatchOutcome {
        info!(recipient = %message.recipient_email, "Sending Email...");

        let outcome = self.dispatch_once(message).await;

        match &outcome {
            DispatchOutcome::Sent { reconnected } => {
                info!(reconnected, "Alert sent");
            }
            DispatchOutcome::ConnectFailed(e) | DispatchOutcome::SendFailed(e) => {
                log_failure(e);
            }
        }

        self.monitor.sample();
        outcome
    }

    async fn dispatch_once(&mut self, message: &AlertMessage) -> DispatchOutcome {
        let reused = self.session.is_ready();

        if !reused && let Err(e) = self.open_session().await {
            return DispatchOutcome::ConnectFailed(e);
        }

        match self.send(message).await {
            Ok(()) => DispatchOutcome::Sent { reconnected: false },
            Err(e) if reused && e.is_connection_broken() => {
                warn!("Reused mail session is gone, reconnecting once: {}", e);
                if let Err(e) = self.open_session().await {
                    return DispatchOutcome::ConnectFailed(e);
                }
                match self.send(message).await {
                    Ok(()) => DispatchOutcome::Sent { reconnected: true },
                    Err(e) => DispatchOutcome::SendFailed(e),
                }
            }
            Err(e) => DispatchOutcome::SendFailed(e),
        }
    }

    async fn open_session(&mut self) -> Result<(), TransportError> {
        self.session.transition(SessionState::Connecting);

        match self.transport.connect().await {
            Ok(LoginStatus::Authenticated) => {
                info!("Successfully logged in.");
                self.session.set_degraded(false);
                self.session.transition(SessionState::Authenticated);
                Ok(())
            }
            Ok(LoginStatus::NoAuth) => {
                warn!("Connected with no Auth.");
                self.session.set_degraded(true);
                self.session.transition(SessionState::Authenticated);
                Ok(())
            }
            Ok(LoginStatus::NotLoggedIn) => {
                self.transport.close().await;
                self.session.transition(SessionState::Disconnected);
                Err(TransportError::NotLoggedIn)
            }
            Err(e) => {
                self.session.transition(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn send(&mut self, message: &AlertMessage) -> Result<(), TransportError> {
        self.session.transition(SessionState::Sending);

        match self.transport.send(message).await {
            Ok(()) => {
                self.session.transition(SessionState::Sent);
                self.session.transition(SessionState::Authenticated);
                Ok(())
            }
            Err(e) => {
                self.session.transition(SessionState::SendFailed);
                if e.is_connection_broken() {
                    self.session.transition(SessionState::Disconnected);
                } else {
                    self.session.transition(SessionState::Authenticated);
                }
                Err(e)
            }
        }
    }

    /// Ends the session on shutdown.
    pub async fn close(&mut self) {
        if self.session.is_ready() {
            self.transport.close().await;
            self.session.transition(SessionState::Disconnected);
            info!("Mail session closed");
        }
    }
}

fn log_failure(e: &TransportError) {
    match e.reason() {
        Some(reason) => error!(
            status_code = reason.status_code,
            error_code = %reason.error_code,
            reason = %reason.reason,
            connection_broken = reason.connection_broken,
            "{}",
            e
        ),
        None => error!("Error, {}.", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{FailureReason, TransportResult};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedTransport {
        connects: VecDeque<TransportResult<LoginStatus>>,
        sends: VecDeque<TransportResult<()>>,
        connect_calls: usize,
        send_calls: usize,
    }

    #[async_trait::async_trait]
    impl AlertTransport for ScriptedTransport {
        async fn connect(&mut self) -> TransportResult<LoginStatus> {
            self.connect_calls += 1;
            self.connects.pop_front().unwrap_or(Ok(LoginStatus::Authenticated))
        }

        async fn send(&mut self, _message: &AlertMessage) -> TransportResult<()> {
            self.send_calls += 1;
            self.sends.pop_front().unwrap_or(Ok(()))
        }

        async fn close(&mut self) {}
    }

    struct CountingMonitor(Arc<AtomicUsize>);

    impl ResourceMonitor for CountingMonitor {
        fn sample(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn message() -> AlertMessage {
        AlertMessage {
            sender_name: "ESP Vehicle".to_string(),
            sender_email: "tracker@example.com".to_string(),
            recipient_email: "owner@example.com".to_string(),
            subject: "Change in coordinates".to_string(),
            body: "moved".to_string(),
        }
    }

    fn dispatcher(transport: ScriptedTransport) -> (AlertDispatcher, Arc<AtomicUsize>) {
        let samples = Arc::new(AtomicUsize::new(0));
        let dispatcher = AlertDispatcher::new(Box::new(transport))
            .with_monitor(Box::new(CountingMonitor(samples.clone())));
        (dispatcher, samples)
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let (mut dispatcher, samples) = dispatcher(ScriptedTransport::default());

        assert!(dispatcher.dispatch(&message()).await.is_sent());
        assert!(dispatcher.dispatch(&message()).await.is_sent());

        assert_eq!(dispatcher.session().connect_count(), 1);
        assert_eq!(dispatcher.session().send_count(), 2);
        assert_eq!(dispatcher.session().state(), SessionState::Authenticated);
        assert_eq!(samples.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_sends_nothing() {
        let transport = ScriptedTransport {
            connects: VecDeque::from([Err(TransportError::Connect(
                FailureReason::new("io", "refused").broken(),
            ))]),
            ..Default::default()
        };
        let (mut dispatcher, samples) = dispatcher(transport);

        let outcome = dispatcher.dispatch(&message()).await;

        assert!(matches!(outcome, DispatchOutcome::ConnectFailed(_)));
        assert_eq!(dispatcher.session().send_count(), 0);
        assert_eq!(dispatcher.session().state(), SessionState::Disconnected);
        assert_eq!(samples.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_auth_still_sends() {
        let transport = ScriptedTransport {
            connects: VecDeque::from([Ok(LoginStatus::NoAuth)]),
            ..Default::default()
        };
        let (mut dispatcher, _) = dispatcher(transport);

        assert!(dispatcher.dispatch(&message()).await.is_sent());
        assert!(dispatcher.session().is_degraded());
    }

    #[tokio::test]
    async fn test_not_logged_in_aborts() {
        let transport = ScriptedTransport {
            connects: VecDeque::from([Ok(LoginStatus::NotLoggedIn)]),
            ..Default::default()
        };
        let (mut dispatcher, _) = dispatcher(transport);

        let outcome = dispatcher.dispatch(&message()).await;

        assert!(matches!(
            outcome,
            DispatchOutcome::ConnectFailed(TransportError::NotLoggedIn)
        ));
        assert_eq!(dispatcher.session().send_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_session() {
        let transport = ScriptedTransport {
            sends: VecDeque::from([Err(TransportError::Send(
                FailureReason::new("transient", "try later").with_status(451),
            ))]),
            ..Default::default()
        };
        let (mut dispatcher, _) = dispatcher(transport);

        let first = dispatcher.dispatch(&message()).await;
        assert!(matches!(first, DispatchOutcome::SendFailed(_)));
        assert!(dispatcher.session().is_ready());

        assert!(dispatcher.dispatch(&message()).await.is_sent());
        assert_eq!(dispatcher.session().connect_count(), 1);
        assert_eq!(dispatcher.session().send_count(), 2);
    }

    #[tokio::test]
    async fn test_fresh_session_broken_is_not_retried() {
        let transport = ScriptedTransport {
            sends: VecDeque::from([Err(TransportError::Send(
                FailureReason::new("io", "reset").broken(),
            ))]),
            ..Default::default()
        };
        let (mut dispatcher, _) = dispatcher(transport);

        let outcome = dispatcher.dispatch(&message()).await;

        assert!(matches!(outcome, DispatchOutcome::SendFailed(_)));
        assert_eq!(dispatcher.session().connect_count(), 1);
        assert_eq!(dispatcher.session().send_count(), 1);
        assert_eq!(dispatcher.session().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_reused_session_reconnects_once() {
        let transport = ScriptedTransport {
            sends: VecDeque::from([
                Ok(()),
                Err(TransportError::Send(FailureReason::new("io", "eof").broken())),
                Err(TransportError::Send(FailureReason::new("io", "eof").broken())),
            ]),
            ..Default::default()
        };
        let (mut dispatcher, _) = dispatcher(transport);

        assert!(dispatcher.dispatch(&message()).await.is_sent());
        let outcome = dispatcher.dispatch(&message()).await;

        assert!(matches!(outcome, DispatchOutcome::SendFailed(_)));
        assert_eq!(dispatcher.session().connect_count(), 2);
        assert_eq!(dispatcher.session().send_count(), 3);
    }

    #[tokio::test]
    async fn test_stale_reused_session_recovers() {
        let transport = ScriptedTransport {
            sends: VecDeque::from([
                Ok(()),
                Err(TransportError::Send(FailureReason::new("io", "eof").broken())),
            ]),
            ..Default::default()
        };
        let (mut dispatcher, _) = dispatcher(transport);

        dispatcher.dispatch(&message()).await;
        let outcome = dispatcher.dispatch(&message()).await;

        assert!(matches!(outcome, DispatchOutcome::Sent { reconnected: true }));
        assert!(dispatcher.session().is_ready());
    }
}
