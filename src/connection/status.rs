use tokio::sync::watch;

/// Lifecycle state published on a connection's status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    /// Ended normally.
    Closed,
    /// Ended abnormally (server gone, protocol error, ...).
    Failed,
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConnectionStatus::Open)
    }
}

/// Sender side of a connection status stream.
///
/// Starts `Open` and accepts exactly one terminal transition; later transitions are ignored.
/// Every receiver, including ones subscribed after the fact, observes that single terminal value.
#[derive(Debug)]
pub struct StatusSignal {
    tx: watch::Sender<ConnectionStatus>,
}

impl Default for StatusSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::Open);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    /// Move to a terminal status. Returns `false` if the stream had already ended.
    pub fn finish(&self, status: ConnectionStatus) -> bool {
        debug_assert!(status.is_terminal());
        self.tx.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = status;
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_status_is_sent_once_and_seen_by_late_subscribers() {
        let signal = StatusSignal::new();
        let mut early = signal.subscribe();

        assert!(signal.finish(ConnectionStatus::Failed));
        assert!(!signal.finish(ConnectionStatus::Closed));

        let mut late = signal.subscribe();
        let seen_early = *early.wait_for(|s| s.is_terminal()).await.unwrap();
        let seen_late = *late.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(seen_early, ConnectionStatus::Failed);
        assert_eq!(seen_late, ConnectionStatus::Failed);
        assert_eq!(signal.current(), ConnectionStatus::Failed);
    }
}
