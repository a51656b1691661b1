//! Mock session transport for unit and integration testing.
//!
//! Lets tests drive the connection state machine by injecting
//! [`TransportEvent`]s without a running Roon Core.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::application::ports::{
    SessionTransport, TransportError, TransportEvent, TransportEventSender, TransportFactory,
};

#[derive(Debug, Default)]
struct MockLog {
    opened: Vec<(String, u16)>,
    senders: Vec<TransportEventSender>,
    auth_requests: Vec<Option<String>>,
    closed: usize,
    dropped: usize,
    fail_next_open: Option<String>,
    fail_auth_requests: bool,
}

/// A [`TransportFactory`] whose transports record calls into a shared log.
///
/// Clones share the log, so the test keeps one handle while the manager owns
/// the other.
#[derive(Debug, Clone, Default)]
pub struct MockTransportFactory {
    log: Arc<Mutex<MockLog>>,
}

impl MockTransportFactory {
    /// Creates a new mock factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` call fail with [`TransportError::Unreachable`].
    pub fn fail_next_open(&self, reason: &str) {
        self.lock().fail_next_open = Some(reason.to_string());
    }

    /// Makes every `send_auth_request` fail with [`TransportError::Closed`].
    pub fn fail_auth_requests(&self, fail: bool) {
        self.lock().fail_auth_requests = fail;
    }

    /// Delivers `event` on the most recently opened transport's channel.
    ///
    /// Returns `false` if the manager already released that transport.
    ///
    /// Panics if no transport was ever opened.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let sender = self
            .last_sender()
            .expect("MockTransportFactory::emit called before any open()");
        sender.send(event).is_ok()
    }

    /// The event sender handed to the most recent `open` call.
    pub fn last_sender(&self) -> Option<TransportEventSender> {
        self.lock().senders.last().cloned()
    }

    /// Every `(host, port)` passed to `open`, including failed attempts.
    pub fn opened(&self) -> Vec<(String, u16)> {
        self.lock().opened.clone()
    }

    /// The saved token passed to each `send_auth_request` call.
    pub fn auth_requests(&self) -> Vec<Option<String>> {
        self.lock().auth_requests.clone()
    }

    /// Number of times `close` was called on any transport.
    pub fn close_count(&self) -> usize {
        self.lock().closed
    }

    /// Transports created and not yet dropped.
    pub fn live_transports(&self) -> usize {
        let log = self.lock();
        log.senders.len() - log.dropped
    }

    fn lock(&self) -> MutexGuard<'_, MockLog> {
        self.log.lock().expect("lock poisoned")
    }
}

impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    fn open(
        &mut self,
        host: &str,
        port: u16,
        events: TransportEventSender,
    ) -> Result<MockTransport, TransportError> {
        let mut log = self.lock();
        log.opened.push((host.to_string(), port));
        if let Some(reason) = log.fail_next_open.take() {
            return Err(TransportError::Unreachable {
                endpoint: format!("{host}:{port}"),
                reason,
            });
        }
        log.senders.push(events);
        Ok(MockTransport {
            log: Arc::clone(&self.log),
            closed: false,
        })
    }
}

/// Transport handle produced by [`MockTransportFactory`].
#[derive(Debug)]
pub struct MockTransport {
    log: Arc<Mutex<MockLog>>,
    closed: bool,
}

impl SessionTransport for MockTransport {
    fn send_auth_request(&mut self, saved_token: Option<&str>) -> Result<(), TransportError> {
        let mut log = self.log.lock().expect("lock poisoned");
        log.auth_requests.push(saved_token.map(str::to_string));
        if self.closed || log.fail_auth_requests {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().expect("lock poisoned").closed += 1;
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_open_records_endpoint_and_keeps_sender() {
        // Arrange
        let mut factory = MockTransportFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        let _transport = factory.open("10.0.0.5", 9100, tx).expect("open");
        let delivered = factory.emit(TransportEvent::LinkEstablished);

        // Assert
        assert!(delivered);
        assert_eq!(factory.opened(), vec![("10.0.0.5".to_string(), 9100)]);
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::LinkEstablished);
    }

    #[test]
    fn test_fail_next_open_applies_once() {
        let mut factory = MockTransportFactory::new();
        factory.fail_next_open("unreachable");

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        assert!(factory.open("h", 1, tx1).is_err());
        assert!(factory.open("h", 1, tx2).is_ok());
    }

    #[test]
    fn test_close_then_drop_is_counted_once() {
        let mut factory = MockTransportFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = factory.open("h", 1, tx).unwrap();

        transport.close();
        transport.close();
        drop(transport);

        assert_eq!(factory.close_count(), 1);
        assert_eq!(factory.live_transports(), 0);
    }

    #[test]
    fn test_emit_after_receiver_dropped_returns_false() {
        let mut factory = MockTransportFactory::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let _transport = factory.open("h", 1, tx).unwrap();

        drop(rx);

        assert!(!factory.emit(TransportEvent::LinkLost));
    }
}
